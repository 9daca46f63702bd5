use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

use super::context::{Context, Scope};
use super::function::Function;
use super::value::Value;
use super::RuntimeError;

// Everything except HASH: header mutation and collection are not legal
// while the cache key is being computed.
const MUTATE: Scope = Scope::RECV
    .union(Scope::HIT)
    .union(Scope::MISS)
    .union(Scope::PASS)
    .union(Scope::FETCH)
    .union(Scope::ERROR)
    .union(Scope::DELIVER)
    .union(Scope::LOG);

fn builtin<F>(
    scope: Scope,
    can_statement_call: bool,
    ident_arguments: &'static [usize],
    func: F,
) -> Function
where
    F: Fn(&mut Context, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
{
    Function {
        scope,
        call: Arc::new(func),
        can_statement_call,
        ident_arguments,
    }
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, RuntimeError> {
    args.get(index).ok_or_else(|| {
        RuntimeError::Message(format!("{name} expects at least {} arguments", index + 1))
    })
}

fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String, RuntimeError> {
    Ok(arg(args, index, name)?.to_vcl_string())
}

fn integer_arg(args: &[Value], index: usize, name: &str) -> Result<i64, RuntimeError> {
    match arg(args, index, name)? {
        Value::Integer(value) => Ok(*value),
        other => Err(RuntimeError::Message(format!(
            "{name} expects an INTEGER argument, got {}",
            other.kind()
        ))),
    }
}

fn ident_arg(args: &[Value], index: usize, name: &str) -> Result<String, RuntimeError> {
    match arg(args, index, name)? {
        Value::Ident(value) => Ok(value.clone()),
        other => Err(RuntimeError::Message(format!(
            "{name} expects an identifier argument, got {}",
            other.kind()
        ))),
    }
}

fn time_arg(args: &[Value], index: usize, name: &str) -> Result<DateTime<Utc>, RuntimeError> {
    match arg(args, index, name)? {
        Value::Time(value) => Ok(*value),
        other => Err(RuntimeError::Message(format!(
            "{name} expects a TIME argument, got {}",
            other.kind()
        ))),
    }
}

// `\1`-style backreferences become `${1}` for the regex crate; a literal
// `$` must be doubled so it is not taken as a capture reference.
fn convert_replacement(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek() {
                Some(digit) if digit.is_ascii_digit() => {
                    out.push_str("${");
                    out.push(*digit);
                    out.push('}');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

fn compile_pattern(pattern: &str, name: &str) -> Result<Regex, RuntimeError> {
    Regex::new(pattern)
        .map_err(|err| RuntimeError::Message(format!("{name}: invalid pattern: {err}")))
}

/// The builtin function table injected into `Registry::with_builtins`.
pub(crate) fn builtin_functions() -> HashMap<String, Function> {
    let mut functions: HashMap<String, Function> = HashMap::new();

    functions.insert(
        "header.get".to_string(),
        builtin(Scope::ANY, false, &[0], |ctx, args| {
            let target = ident_arg(&args, 0, "header.get")?;
            let name = string_arg(&args, 1, "header.get")?;
            ctx.get_variable(ctx.scope, &format!("{target}.http.{name}"))
        }),
    );
    functions.insert(
        "header.set".to_string(),
        builtin(MUTATE, true, &[0], |ctx, mut args| {
            let target = ident_arg(&args, 0, "header.set")?;
            let name = string_arg(&args, 1, "header.set")?;
            let value = if args.len() > 2 {
                args.remove(2)
            } else {
                Value::Null
            };
            let scope = ctx.scope;
            ctx.set_variable(scope, &format!("{target}.http.{name}"), value)?;
            Ok(Value::Null)
        }),
    );
    functions.insert(
        "header.unset".to_string(),
        builtin(MUTATE, true, &[0], |ctx, args| {
            let target = ident_arg(&args, 0, "header.unset")?;
            let name = string_arg(&args, 1, "header.unset")?;
            let scope = ctx.scope;
            ctx.unset_variable(scope, &format!("{target}.http.{name}"))?;
            Ok(Value::Null)
        }),
    );
    functions.insert(
        "std.collect".to_string(),
        builtin(MUTATE, true, &[0], |ctx, args| {
            let path = ident_arg(&args, 0, "std.collect")?;
            let separator = match args.get(1) {
                Some(value) => value.to_vcl_string(),
                None => ", ".to_string(),
            };
            let scope = ctx.scope;
            let (headers, header) = ctx.header_target(scope, &path)?;
            let values: Vec<String> = headers
                .get_all(header)
                .into_iter()
                .map(str::to_string)
                .collect();
            if !values.is_empty() {
                let collected = values.join(&separator);
                headers.set(header, collected);
            }
            Ok(Value::Null)
        }),
    );

    functions.insert(
        "substr".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "substr")?;
            let offset = integer_arg(&args, 1, "substr")?;
            let chars: Vec<char> = input.chars().collect();
            let start = if offset < 0 {
                chars.len().saturating_sub(offset.unsigned_abs() as usize)
            } else {
                (offset as usize).min(chars.len())
            };
            let end = match args.get(2) {
                Some(Value::Integer(length)) if *length >= 0 => {
                    (start + *length as usize).min(chars.len())
                }
                Some(Value::Integer(_)) | None => chars.len(),
                Some(other) => {
                    return Err(RuntimeError::Message(format!(
                        "substr expects an INTEGER length, got {}",
                        other.kind()
                    )))
                }
            };
            Ok(Value::String(chars[start..end].iter().collect()))
        }),
    );
    functions.insert(
        "regsub".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "regsub")?;
            let pattern = string_arg(&args, 1, "regsub")?;
            let replacement = convert_replacement(&string_arg(&args, 2, "regsub")?);
            let regex = compile_pattern(&pattern, "regsub")?;
            Ok(Value::String(
                regex.replace(&input, replacement.as_str()).into_owned(),
            ))
        }),
    );
    functions.insert(
        "regsuball".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "regsuball")?;
            let pattern = string_arg(&args, 1, "regsuball")?;
            let replacement = convert_replacement(&string_arg(&args, 2, "regsuball")?);
            let regex = compile_pattern(&pattern, "regsuball")?;
            Ok(Value::String(
                regex.replace_all(&input, replacement.as_str()).into_owned(),
            ))
        }),
    );

    functions.insert(
        "std.atoi".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.atoi")?;
            Ok(Value::Integer(input.trim().parse().unwrap_or(0)))
        }),
    );
    functions.insert(
        "std.itoa".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let value = integer_arg(&args, 0, "std.itoa")?;
            Ok(Value::String(value.to_string()))
        }),
    );
    functions.insert(
        "std.strlen".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.strlen")?;
            Ok(Value::Integer(input.len() as i64))
        }),
    );
    functions.insert(
        "std.tolower".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.tolower")?;
            Ok(Value::String(input.to_lowercase()))
        }),
    );
    functions.insert(
        "std.toupper".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.toupper")?;
            Ok(Value::String(input.to_uppercase()))
        }),
    );
    functions.insert(
        "std.strstr".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let haystack = string_arg(&args, 0, "std.strstr")?;
            let needle = string_arg(&args, 1, "std.strstr")?;
            Ok(Value::String(match haystack.find(&needle) {
                Some(index) => haystack[index..].to_string(),
                None => String::new(),
            }))
        }),
    );
    functions.insert(
        "std.prefixof".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.prefixof")?;
            let prefix = string_arg(&args, 1, "std.prefixof")?;
            Ok(Value::Bool(input.starts_with(&prefix)))
        }),
    );
    functions.insert(
        "std.suffixof".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.suffixof")?;
            let suffix = string_arg(&args, 1, "std.suffixof")?;
            Ok(Value::Bool(input.ends_with(&suffix)))
        }),
    );
    functions.insert(
        "std.replace".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.replace")?;
            let target = string_arg(&args, 1, "std.replace")?;
            let replacement = string_arg(&args, 2, "std.replace")?;
            Ok(Value::String(input.replacen(&target, &replacement, 1)))
        }),
    );

    functions.insert(
        "std.time".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.time")?;
            let fallback = time_arg(&args, 1, "std.time")?;
            let parsed = DateTime::parse_from_rfc2822(&input)
                .map(|time| time.with_timezone(&Utc))
                .ok();
            Ok(Value::Time(parsed.unwrap_or(fallback)))
        }),
    );
    functions.insert(
        "std.integer2time".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let seconds = integer_arg(&args, 0, "std.integer2time")?;
            match Utc.timestamp_opt(seconds, 0).single() {
                Some(time) => Ok(Value::Time(time)),
                None => Err(RuntimeError::Message(format!(
                    "std.integer2time: {seconds} is out of range"
                ))),
            }
        }),
    );
    functions.insert(
        "std.ip".to_string(),
        builtin(Scope::ANY, false, &[], |_, args| {
            let input = string_arg(&args, 0, "std.ip")?;
            if let Ok(ip) = input.parse::<IpAddr>() {
                return Ok(Value::Ip(ip));
            }
            match arg(&args, 1, "std.ip")? {
                Value::Ip(fallback) => Ok(Value::Ip(*fallback)),
                other => Err(RuntimeError::Message(format!(
                    "std.ip expects an IP fallback, got {}",
                    other.kind()
                ))),
            }
        }),
    );

    functions.insert(
        "table.lookup".to_string(),
        builtin(Scope::ANY, false, &[0], |ctx, args| {
            let table = ident_arg(&args, 0, "table.lookup")?;
            let key = string_arg(&args, 1, "table.lookup")?;
            let Some(entries) = ctx.table(&table) else {
                return Err(RuntimeError::Message(format!(
                    "table {table} is not declared"
                )));
            };
            if let Some(value) = entries.get(&key) {
                return Ok(value.clone());
            }
            Ok(match args.get(2) {
                Some(default) => default.clone(),
                None => Value::Null,
            })
        }),
    );
    functions.insert(
        "table.contains".to_string(),
        builtin(Scope::ANY, false, &[0], |ctx, args| {
            let table = ident_arg(&args, 0, "table.contains")?;
            let key = string_arg(&args, 1, "table.contains")?;
            let Some(entries) = ctx.table(&table) else {
                return Err(RuntimeError::Message(format!(
                    "table {table} is not declared"
                )));
            };
            Ok(Value::Bool(entries.contains_key(&key)))
        }),
    );

    functions.insert(
        "randombool".to_string(),
        builtin(Scope::ANY, false, &[], |ctx, args| {
            let numerator = integer_arg(&args, 0, "randombool")?;
            let denominator = integer_arg(&args, 1, "randombool")?;
            if denominator <= 0 {
                return Err(RuntimeError::Message(
                    "randombool: denominator must be positive".to_string(),
                ));
            }
            let roll = (ctx.next_random() % denominator as u64) as i64;
            Ok(Value::Bool(roll < numerator))
        }),
    );

    functions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::http::Request;

    fn ctx() -> Context {
        Context::new(Request::get("http://localhost/"))
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let functions = builtin_functions();
        let function = functions.get(name).expect("builtin registered");
        (function.call)(&mut ctx(), args)
    }

    #[test]
    fn substr_handles_negative_offsets() {
        let got = call(
            "substr",
            vec![Value::String("abcdef".into()), Value::Integer(-2)],
        )
        .unwrap();
        assert_eq!(got, Value::String("ef".into()));
        let got = call(
            "substr",
            vec![
                Value::String("abcdef".into()),
                Value::Integer(1),
                Value::Integer(3),
            ],
        )
        .unwrap();
        assert_eq!(got, Value::String("bcd".into()));
    }

    #[test]
    fn regsub_translates_backreferences() {
        let got = call(
            "regsub",
            vec![
                Value::String("hello world".into()),
                Value::String("(hello) (world)".into()),
                Value::String(r"\2 \1".into()),
            ],
        )
        .unwrap();
        assert_eq!(got, Value::String("world hello".into()));
    }

    #[test]
    fn regsuball_replaces_every_match() {
        let got = call(
            "regsuball",
            vec![
                Value::String("a-b-c".into()),
                Value::String("-".into()),
                Value::String("/".into()),
            ],
        )
        .unwrap();
        assert_eq!(got, Value::String("a/b/c".into()));
    }

    #[test]
    fn atoi_defaults_to_zero() {
        assert_eq!(
            call("std.atoi", vec![Value::String("42".into())]).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            call("std.atoi", vec![Value::String("nope".into())]).unwrap(),
            Value::Integer(0)
        );
    }

    #[test]
    fn ident_argument_is_required() {
        let err = call(
            "table.lookup",
            vec![Value::String("routes".into()), Value::String("k".into())],
        )
        .unwrap_err();
        assert!(err.to_string().contains("identifier argument"));
    }
}
