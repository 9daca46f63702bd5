use crate::ast::{
    Expression, FunctionCallExpression, Ident, IfExpression, InfixExpression, PrefixExpression,
    SubroutineDecl,
};
use crate::diagnostics::Position;

use super::statement::Flow;
use super::value::{parse_rtime, Value};
use super::{Interpreter, RuntimeError};

impl Interpreter {
    /// Evaluates an expression eagerly, left to right; only `&&` and `||`
    /// short-circuit.
    pub(crate) fn eval_expression(&mut self, expr: &Expression) -> Result<Value, RuntimeError> {
        match expr {
            Expression::String(lit) => Ok(Value::String(lit.value.clone())),
            Expression::Integer(lit) => Ok(Value::Integer(lit.value)),
            Expression::Float(lit) => Ok(Value::Float(lit.value)),
            Expression::Bool(lit) => Ok(Value::Bool(lit.value)),
            Expression::RTime(lit) => parse_rtime(&lit.value).map(Value::RTime),
            Expression::Ident(ident) => self.resolve_ident(ident),
            Expression::Prefix(prefix) => self.eval_prefix(prefix),
            Expression::Infix(infix) => self.eval_infix(infix),
            Expression::Group(group) => self.eval_expression(&group.right),
            Expression::IfExpr(expr) => self.eval_if_expression(expr),
            Expression::FunctionCall(call) => self.eval_function_call(call),
        }
    }

    // Identifier resolution order: declared ACLs and backends shadow
    // nothing (their namespaces are disjoint from variables), then the
    // scoped variable store, which reads unknown names as Null.
    fn resolve_ident(&mut self, ident: &Ident) -> Result<Value, RuntimeError> {
        if let Some(acl) = self.ctx.acl(&ident.value) {
            return Ok(Value::Acl(acl));
        }
        if let Some(backend) = self.ctx.backend(&ident.value) {
            return Ok(Value::Backend(backend));
        }
        self.ctx.get_variable(self.ctx.scope, &ident.value)
    }

    fn eval_prefix(&mut self, prefix: &PrefixExpression) -> Result<Value, RuntimeError> {
        let position = prefix.meta.position();
        let value = self.eval_expression(&prefix.right)?;
        match prefix.operator.as_str() {
            "!" => match value {
                Value::Bool(v) => Ok(Value::Bool(!v)),
                other => Err(type_error("BOOL", &other, position)),
            },
            "-" => match value {
                Value::Integer(v) => Ok(Value::Integer(v.wrapping_neg())),
                Value::Float(v) => Ok(Value::Float(-v)),
                Value::RTime(v) => Ok(Value::RTime(-v)),
                other => Err(type_error("INTEGER", &other, position)),
            },
            other => Err(RuntimeError::Runtime {
                message: format!("unknown prefix operator {other}"),
                position,
            }),
        }
    }

    fn eval_infix(&mut self, infix: &InfixExpression) -> Result<Value, RuntimeError> {
        let position = infix.meta.position();
        match infix.operator.as_str() {
            "&&" => {
                let left = self.eval_expression(&infix.left)?;
                if !truthy(&left, position)? {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval_expression(&infix.right)?;
                Ok(Value::Bool(truthy(&right, position)?))
            }
            "||" => {
                let left = self.eval_expression(&infix.left)?;
                if truthy(&left, position)? {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expression(&infix.right)?;
                Ok(Value::Bool(truthy(&right, position)?))
            }
            "==" => {
                let left = self.eval_expression(&infix.left)?;
                let right = self.eval_expression(&infix.right)?;
                Ok(Value::Bool(values_equal(&left, &right)))
            }
            "!=" => {
                let left = self.eval_expression(&infix.left)?;
                let right = self.eval_expression(&infix.right)?;
                Ok(Value::Bool(!values_equal(&left, &right)))
            }
            op @ ("<" | "<=" | ">" | ">=") => {
                let left = self.eval_expression(&infix.left)?;
                let right = self.eval_expression(&infix.right)?;
                compare(op, &left, &right, position)
            }
            op @ ("~" | "!~") => {
                let left = self.eval_expression(&infix.left)?;
                let right = self.eval_expression(&infix.right)?;
                let matched = self.eval_match(&left, &right, position)?;
                Ok(Value::Bool(if op == "~" { matched } else { !matched }))
            }
            "+" => {
                let left = self.eval_expression(&infix.left)?;
                let right = self.eval_expression(&infix.right)?;
                concat_or_add(&left, &right, position)
            }
            other => Err(RuntimeError::Runtime {
                message: format!("unknown infix operator {other}"),
                position,
            }),
        }
    }

    /// `~` against an ACL is membership; against a string it is a regex
    /// match whose capture groups become `re.group.N`.
    fn eval_match(
        &mut self,
        left: &Value,
        right: &Value,
        position: Position,
    ) -> Result<bool, RuntimeError> {
        if let Value::Acl(acl) = right {
            let ip = match left {
                Value::Ip(ip) => *ip,
                Value::String(text) => text.parse().map_err(|_| RuntimeError::Runtime {
                    message: format!("{text:?} is not an IP address"),
                    position,
                })?,
                other => return Err(type_error("IP", other, position)),
            };
            return Ok(acl.contains(ip));
        }

        let input = match left {
            Value::String(text) => text.clone(),
            Value::Ip(ip) => ip.to_string(),
            Value::Null => String::new(),
            other => return Err(type_error("STRING", other, position)),
        };
        let Value::String(pattern) = right else {
            return Err(type_error("STRING", right, position));
        };
        let regex = regex::Regex::new(pattern).map_err(|err| RuntimeError::Runtime {
            message: format!("invalid regex pattern {pattern:?}: {err}"),
            position,
        })?;
        match regex.captures(&input) {
            Some(captures) => {
                let groups = captures
                    .iter()
                    .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                self.ctx.set_captures(groups);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn eval_if_expression(&mut self, expr: &IfExpression) -> Result<Value, RuntimeError> {
        let position = expr.meta.position();
        let condition = self.eval_expression(&expr.condition)?;
        if truthy(&condition, position)? {
            self.eval_expression(&expr.consequence)
        } else {
            self.eval_expression(&expr.alternative)
        }
    }

    fn eval_function_call(&mut self, call: &FunctionCallExpression) -> Result<Value, RuntimeError> {
        self.call_function(call, false)
    }

    /// Shared by expression and statement positions. Statement position
    /// additionally requires `can_statement_call` on the descriptor.
    pub(crate) fn call_function(
        &mut self,
        call: &FunctionCallExpression,
        statement_position: bool,
    ) -> Result<Value, RuntimeError> {
        let name = call.function.value.as_str();
        let position = call.meta.position();

        // Functional user subroutines are callable in expression position.
        if let Some(sub) = self.subroutine(name) {
            if sub.return_type.is_some() {
                if statement_position {
                    return Err(RuntimeError::Runtime {
                        message: format!("functional subroutine {name} cannot be a statement"),
                        position,
                    });
                }
                if !call.arguments.is_empty() {
                    return Err(RuntimeError::Runtime {
                        message: format!("subroutine {name} takes no arguments"),
                        position,
                    });
                }
                return self.call_functional_subroutine(&sub, position);
            }
        }

        let function = self.registry().exists(self.ctx.scope, name)?;
        if statement_position && !function.can_statement_call {
            return Err(RuntimeError::Runtime {
                message: format!("function {name} cannot be called as a statement"),
                position,
            });
        }

        // Identifier-argument positions are decided before evaluation:
        // those receive the bare name, everything else evaluates eagerly.
        let mut args = Vec::with_capacity(call.arguments.len());
        for (index, argument) in call.arguments.iter().enumerate() {
            if function.is_ident_argument(index) {
                let Expression::Ident(ident) = argument else {
                    return Err(type_error_at("ID", "expression", argument.position()));
                };
                args.push(Value::Ident(ident.value.clone()));
            } else {
                args.push(self.eval_expression(argument)?);
            }
        }
        (function.call)(&mut self.ctx, args)
    }

    fn call_functional_subroutine(
        &mut self,
        sub: &SubroutineDecl,
        position: Position,
    ) -> Result<Value, RuntimeError> {
        match self.exec_statements(&sub.block.statements)? {
            Flow::Return(value) => Ok(value),
            _ => Err(RuntimeError::Runtime {
                message: format!(
                    "subroutine {} finished without returning a value",
                    sub.name.value
                ),
                position,
            }),
        }
    }
}

fn type_error(expected: &'static str, got: &Value, position: Position) -> RuntimeError {
    RuntimeError::Type {
        expected,
        got: got.kind(),
        position,
    }
}

fn type_error_at(expected: &'static str, got: &'static str, position: Position) -> RuntimeError {
    RuntimeError::Type {
        expected,
        got,
        position,
    }
}

/// Condition truthiness: BOOL is itself, a string is "set and non-empty",
/// NULL is false. Anything else in condition position is a type error.
pub(crate) fn truthy(value: &Value, position: Position) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(v) => Ok(*v),
        Value::String(v) => Ok(!v.is_empty()),
        Value::Null => Ok(false),
        other => Err(type_error("BOOL", other, position)),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
            *a as f64 == *b
        }
        _ => left == right,
    }
}

fn compare(
    op: &str,
    left: &Value,
    right: &Value,
    position: Position,
) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering;
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Value::Integer(a), Value::Float(b)) => {
            (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Value::Float(a), Value::Integer(b)) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
        }
        (Value::RTime(a), Value::RTime(b)) => a.cmp(b),
        (Value::Time(a), Value::Time(b)) => a.cmp(b),
        (other, _) => return Err(type_error("INTEGER", other, position)),
    };
    let result = match op {
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

/// The `+` operator and juxtaposition concat share one rule: matching
/// numeric kinds add (integers wrap, an integer narrows to float next to
/// one), time arithmetic combines TIME and RTIME, and everything else
/// concatenates through the canonical string form.
fn concat_or_add(
    left: &Value,
    right: &Value,
    position: Position,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Integer(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Integer(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::RTime(a), Value::RTime(b)) => Ok(Value::RTime(*a + *b)),
        (Value::Time(a), Value::RTime(b)) => Ok(Value::Time(*a + *b)),
        (Value::RTime(a), Value::Time(b)) => Ok(Value::Time(*b + *a)),
        (Value::Time(_), Value::Time(_)) => Err(RuntimeError::Runtime {
            message: "cannot add TIME to TIME".to_string(),
            position,
        }),
        _ => {
            let mut text = left.to_vcl_string();
            text.push_str(&right.to_vcl_string());
            Ok(Value::String(text))
        }
    }
}
