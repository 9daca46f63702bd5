use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::RuntimeError;

/// Runtime value kinds of VCL. The enum is closed: every expression
/// evaluates to exactly one of these.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Time(DateTime<Utc>),
    RTime(Duration),
    Ip(IpAddr),
    Backend(Arc<BackendValue>),
    Acl(Arc<AclValue>),
    /// An unresolved name, produced for identifier-argument positions.
    Ident(String),
    Null,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::RTime(a), Value::RTime(b)) => a == b,
            (Value::Ip(a), Value::Ip(b)) => a == b,
            // Declared entities compare by name.
            (Value::Backend(a), Value::Backend(b)) => a.name == b.name,
            (Value::Acl(a), Value::Acl(b)) => a.name == b.name,
            (Value::Ident(a), Value::Ident(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "STRING",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Bool(_) => "BOOL",
            Value::Time(_) => "TIME",
            Value::RTime(_) => "RTIME",
            Value::Ip(_) => "IP",
            Value::Backend(_) => "BACKEND",
            Value::Acl(_) => "ACL",
            Value::Ident(_) => "ID",
            Value::Null => "NULL",
        }
    }

    /// The canonical textual form used by string concatenation and header
    /// assignment: integers in decimal, floats in their shortest form,
    /// times as RFC 1123, rtimes as seconds with a millisecond fraction,
    /// booleans as `1`/`0`, and null as the empty string.
    pub fn to_vcl_string(&self) -> String {
        match self {
            Value::String(v) => v.clone(),
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Value::Time(v) => v.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            Value::RTime(v) => format_rtime(*v),
            Value::Ip(v) => v.to_string(),
            Value::Backend(v) => v.name.clone(),
            Value::Acl(v) => v.name.clone(),
            Value::Ident(v) => v.clone(),
            Value::Null => String::new(),
        }
    }

    /// The zero value for a declared local of the given VCL type.
    pub fn default_for_type(type_name: &str) -> Option<Value> {
        let value = match type_name {
            "STRING" => Value::String(String::new()),
            "INTEGER" => Value::Integer(0),
            "FLOAT" => Value::Float(0.0),
            "BOOL" => Value::Bool(false),
            "TIME" => Value::Time(DateTime::<Utc>::UNIX_EPOCH),
            "RTIME" => Value::RTime(Duration::zero()),
            "IP" => Value::Ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            "BACKEND" | "ACL" => Value::Null,
            _ => return None,
        };
        Some(value)
    }

    /// Coerces an assigned value into the kind of the assignment target.
    /// Anything converts to STRING via its canonical form; numeric kinds
    /// narrow between each other; the rest must match exactly.
    pub fn coerce_to(&self, kind: &'static str) -> Result<Value, RuntimeError> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        let coerced = match (self, kind) {
            (_, "STRING") => Value::String(self.to_vcl_string()),
            (Value::Integer(v), "FLOAT") => Value::Float(*v as f64),
            (Value::Float(v), "INTEGER") => Value::Integer(*v as i64),
            (Value::String(v), "IP") => match v.parse::<IpAddr>() {
                Ok(ip) => Value::Ip(ip),
                Err(_) => {
                    return Err(RuntimeError::Message(format!(
                        "invalid IP address {v:?}"
                    )))
                }
            },
            (Value::Null, "BACKEND" | "ACL") => Value::Null,
            _ => {
                return Err(RuntimeError::Message(format!(
                    "cannot assign {} value to {} variable",
                    self.kind(),
                    kind
                )))
            }
        };
        Ok(coerced)
    }
}

fn format_float(value: f64) -> String {
    format!("{value}")
}

fn format_rtime(duration: Duration) -> String {
    let millis = duration.num_milliseconds();
    let secs = millis / 1000;
    let frac = (millis % 1000).abs();
    format!("{secs}.{frac:03}")
}

/// Parses an rtime literal such as `1s`, `10m`, `2.5h`, `100ms`, `30d`,
/// `1y` into a millisecond-granular duration.
pub fn parse_rtime(literal: &str) -> Result<Duration, RuntimeError> {
    let (number, unit) = if let Some(rest) = literal.strip_suffix("ms") {
        (rest, 1.0)
    } else if let Some(rest) = literal.strip_suffix('s') {
        (rest, 1_000.0)
    } else if let Some(rest) = literal.strip_suffix('m') {
        (rest, 60_000.0)
    } else if let Some(rest) = literal.strip_suffix('h') {
        (rest, 3_600_000.0)
    } else if let Some(rest) = literal.strip_suffix('d') {
        (rest, 86_400_000.0)
    } else if let Some(rest) = literal.strip_suffix('y') {
        (rest, 31_536_000_000.0)
    } else {
        return Err(RuntimeError::Message(format!(
            "invalid rtime literal {literal:?}"
        )));
    };
    let value: f64 = number
        .parse()
        .map_err(|_| RuntimeError::Message(format!("invalid rtime literal {literal:?}")))?;
    Ok(Duration::milliseconds((value * unit) as i64))
}

/// A declared backend: the name plus its evaluated scalar properties.
#[derive(Debug)]
pub struct BackendValue {
    pub name: String,
    pub properties: HashMap<String, String>,
}

impl BackendValue {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn host(&self) -> &str {
        self.property("host").unwrap_or("")
    }

    pub fn port(&self) -> &str {
        self.property("port").unwrap_or("80")
    }
}

/// A declared ACL with its parsed entries, in declaration order.
#[derive(Debug)]
pub struct AclValue {
    pub name: String,
    pub entries: Vec<AclEntryValue>,
}

#[derive(Debug)]
pub struct AclEntryValue {
    pub inverse: bool,
    pub address: IpAddr,
    pub mask: Option<u8>,
}

impl AclValue {
    /// First matching entry wins; a negated entry excludes the address.
    /// No match at all means the ACL does not contain the address.
    pub fn contains(&self, ip: IpAddr) -> bool {
        for entry in &self.entries {
            if ip_matches(ip, entry.address, entry.mask) {
                return !entry.inverse;
            }
        }
        false
    }
}

fn ip_matches(ip: IpAddr, base: IpAddr, mask: Option<u8>) -> bool {
    match (ip, base) {
        (IpAddr::V4(ip), IpAddr::V4(base)) => {
            let bits = mask.unwrap_or(32).min(32) as u32;
            if bits == 0 {
                return true;
            }
            let shift = 32 - bits;
            (u32::from(ip) >> shift) == (u32::from(base) >> shift)
        }
        (IpAddr::V6(ip), IpAddr::V6(base)) => {
            let bits = mask.unwrap_or(128).min(128) as u32;
            if bits == 0 {
                return true;
            }
            let shift = 128 - bits;
            (u128::from(ip) >> shift) == (u128::from(base) >> shift)
        }
        // A v4 address can match a v4-mapped v6 entry and vice versa.
        (IpAddr::V4(ip), IpAddr::V6(base)) => {
            ip_matches(IpAddr::V6(ip.to_ipv6_mapped()), IpAddr::V6(base), mask)
        }
        (IpAddr::V6(ip), IpAddr::V4(base)) => match ip.to_ipv4_mapped() {
            Some(ip) => ip_matches(IpAddr::V4(ip), IpAddr::V4(base), mask),
            None => false,
        },
    }
}
