use super::context::{Context, Scope};
use super::http::HeaderMap;
use super::value::Value;
use super::RuntimeError;

// Scopes in which each phase-specific view is reachable. `req` is visible
// everywhere; the backend pair only exists around the fetch, and the
// delivery views only once a response object exists.
const BEREQ_SCOPES: Scope = Scope::MISS.union(Scope::PASS).union(Scope::FETCH);
const BERESP_SCOPES: Scope = Scope::FETCH;
const RESP_SCOPES: Scope = Scope::ERROR.union(Scope::DELIVER).union(Scope::LOG);
const OBJ_SCOPES: Scope = Scope::HIT
    .union(Scope::ERROR)
    .union(Scope::DELIVER)
    .union(Scope::LOG);

fn not_accessible(name: &str, scope: Scope) -> RuntimeError {
    RuntimeError::Message(format!("variable {name} is not accessible in {scope} scope"))
}

fn read_only(name: &str) -> RuntimeError {
    RuntimeError::Message(format!("variable {name} is read-only"))
}

impl Context {
    /// Reads a VCL variable in the given scope. Undefined names inside a
    /// known namespace (headers, locals, capture groups) read as `Null`;
    /// reaching for a view outside its phase is an error.
    pub fn get_variable(&self, scope: Scope, name: &str) -> Result<Value, RuntimeError> {
        match name {
            "client.ip" => return Ok(Value::Ip(self.client_ip)),
            "server.ip" => return Ok(Value::Ip(self.server_ip)),
            "now" => return Ok(Value::Time(self.now)),
            "now.sec" => return Ok(Value::Integer(self.now.timestamp())),
            "req.method" => return Ok(Value::String(self.request.method.clone())),
            "req.url" => return Ok(Value::String(self.request.url.clone())),
            "req.proto" => return Ok(Value::String(self.request.proto.clone())),
            "req.restarts" => return Ok(Value::Integer(self.restarts)),
            "req.hash" => return Ok(Value::String(self.hash.clone())),
            "req.backend" => {
                return Ok(match &self.selected_backend {
                    Some(backend) => Value::Backend(backend.clone()),
                    None => Value::Null,
                })
            }
            _ => {}
        }

        if let Some(header) = name.strip_prefix("req.http.") {
            return Ok(header_value(&self.request.headers, header));
        }
        if let Some(rest) = name.strip_prefix("bereq.") {
            if !scope.intersects(BEREQ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(bereq) = &self.backend_request else {
                return Ok(Value::Null);
            };
            return Ok(match rest {
                "method" => Value::String(bereq.method.clone()),
                "url" => Value::String(bereq.url.clone()),
                "proto" => Value::String(bereq.proto.clone()),
                _ => match rest.strip_prefix("http.") {
                    Some(header) => header_value(&bereq.headers, header),
                    None => Value::Null,
                },
            });
        }
        if let Some(rest) = name.strip_prefix("beresp.") {
            if !scope.intersects(BERESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(beresp) = &self.backend_response else {
                return Ok(Value::Null);
            };
            return Ok(match rest {
                "status" => Value::Integer(beresp.status),
                "response" => Value::String(beresp.response.clone()),
                "proto" => Value::String(beresp.proto.clone()),
                "ttl" => Value::RTime(self.object_ttl),
                _ => match rest.strip_prefix("http.") {
                    Some(header) => header_value(&beresp.headers, header),
                    None => Value::Null,
                },
            });
        }
        if let Some(rest) = name.strip_prefix("resp.") {
            if !scope.intersects(RESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(resp) = &self.response else {
                return Ok(Value::Null);
            };
            return Ok(match rest {
                "status" => Value::Integer(resp.status),
                "response" => Value::String(resp.response.clone()),
                "proto" => Value::String(resp.proto.clone()),
                _ => match rest.strip_prefix("http.") {
                    Some(header) => header_value(&resp.headers, header),
                    None => Value::Null,
                },
            });
        }
        if let Some(rest) = name.strip_prefix("obj.") {
            if !scope.intersects(OBJ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(object) = &self.object else {
                return Ok(Value::Null);
            };
            return Ok(match rest {
                "status" => Value::Integer(object.status),
                "response" => Value::String(object.response.clone()),
                "proto" => Value::String(object.proto.clone()),
                "ttl" => Value::RTime(self.object_ttl),
                _ => match rest.strip_prefix("http.") {
                    Some(header) => header_value(&object.headers, header),
                    None => Value::Null,
                },
            });
        }
        if name.starts_with("var.") {
            return Ok(match self.locals.get(name) {
                Some((_, value)) => value.clone(),
                None => Value::Null,
            });
        }
        if let Some(index) = name.strip_prefix("re.group.") {
            let index: usize = index
                .parse()
                .map_err(|_| RuntimeError::Message(format!("invalid capture group {name}")))?;
            return Ok(match self.capture(index) {
                Some(text) => Value::String(text.to_string()),
                None => Value::Null,
            });
        }
        Ok(Value::Null)
    }

    /// Assigns a VCL variable, coercing the value into the target's kind.
    pub fn set_variable(
        &mut self,
        scope: Scope,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        match name {
            "client.ip" | "server.ip" | "now" | "now.sec" | "req.restarts" => {
                return Err(read_only(name))
            }
            "req.method" => {
                self.request.method = value.coerce_to("STRING")?.to_vcl_string();
                return Ok(());
            }
            "req.url" => {
                self.request.url = value.coerce_to("STRING")?.to_vcl_string();
                return Ok(());
            }
            "req.proto" => {
                self.request.proto = value.coerce_to("STRING")?.to_vcl_string();
                return Ok(());
            }
            "req.hash" => {
                if !scope.intersects(Scope::HASH) {
                    return Err(not_accessible(name, scope));
                }
                self.hash = value.coerce_to("STRING")?.to_vcl_string();
                return Ok(());
            }
            "req.backend" => {
                match value {
                    Value::Backend(backend) => self.selected_backend = Some(backend),
                    other => {
                        return Err(RuntimeError::Message(format!(
                            "req.backend expects a BACKEND value, got {}",
                            other.kind()
                        )))
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        if name.starts_with("re.group.") {
            return Err(read_only(name));
        }
        if name.starts_with("var.") {
            let Some((type_name, _)) = self.locals.get(name) else {
                return Err(RuntimeError::Message(format!(
                    "local variable {name} has not been declared"
                )));
            };
            let kind: &'static str = match type_name.as_str() {
                "STRING" => "STRING",
                "INTEGER" => "INTEGER",
                "FLOAT" => "FLOAT",
                "BOOL" => "BOOL",
                "TIME" => "TIME",
                "RTIME" => "RTIME",
                "IP" => "IP",
                "BACKEND" => "BACKEND",
                "ACL" => "ACL",
                other => {
                    return Err(RuntimeError::Message(format!(
                        "local variable {name} has unknown type {other}"
                    )))
                }
            };
            let coerced = value.coerce_to(kind)?;
            if let Some(slot) = self.locals.get_mut(name) {
                slot.1 = coerced;
            }
            return Ok(());
        }

        if let Some(rest) = name.strip_prefix("beresp.") {
            if !scope.intersects(BERESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            if rest == "ttl" {
                self.object_ttl = rtime_of(value.coerce_to("RTIME")?)?;
                return Ok(());
            }
            let Some(beresp) = self.backend_response.as_mut() else {
                return Err(RuntimeError::Message(
                    "beresp is not available yet".to_string(),
                ));
            };
            return set_response_field(beresp, name, rest, value);
        }
        if let Some(rest) = name.strip_prefix("resp.") {
            if !scope.intersects(RESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(resp) = self.response.as_mut() else {
                return Err(RuntimeError::Message(
                    "resp is not available yet".to_string(),
                ));
            };
            return set_response_field(resp, name, rest, value);
        }
        if let Some(rest) = name.strip_prefix("obj.") {
            if !scope.intersects(OBJ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            if rest == "ttl" {
                self.object_ttl = rtime_of(value.coerce_to("RTIME")?)?;
                return Ok(());
            }
            let object = self.object.get_or_insert_with(Default::default);
            return set_response_field(object, name, rest, value);
        }
        if let Some(header) = name.strip_prefix("req.http.") {
            let text = value.coerce_to("STRING")?.to_vcl_string();
            self.request.headers.set(header, text);
            return Ok(());
        }
        if let Some(rest) = name.strip_prefix("bereq.") {
            if !scope.intersects(BEREQ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let Some(bereq) = self.backend_request.as_mut() else {
                return Err(RuntimeError::Message(
                    "bereq is not available yet".to_string(),
                ));
            };
            let text = value.coerce_to("STRING")?.to_vcl_string();
            match rest {
                "method" => bereq.method = text,
                "url" => bereq.url = text,
                "proto" => bereq.proto = text,
                _ => match rest.strip_prefix("http.") {
                    Some(header) => bereq.headers.set(header, text),
                    None => {
                        return Err(RuntimeError::Message(format!(
                            "unknown variable {name}"
                        )))
                    }
                },
            }
            return Ok(());
        }
        Err(RuntimeError::Message(format!("unknown variable {name}")))
    }

    /// `add` semantics: appends one more value to a multi-value header.
    pub fn add_variable(
        &mut self,
        scope: Scope,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let text = value.coerce_to("STRING")?.to_vcl_string();
        let (headers, header) = self.header_target(scope, name)?;
        headers.append(header, text);
        Ok(())
    }

    /// `unset`/`remove` semantics: drops a header entirely.
    pub fn unset_variable(&mut self, scope: Scope, name: &str) -> Result<(), RuntimeError> {
        if name.starts_with("var.") {
            self.locals.remove(name);
            return Ok(());
        }
        let (headers, header) = self.header_target(scope, name)?;
        headers.remove(header);
        Ok(())
    }

    pub fn declare_local(&mut self, name: &str, type_name: &str) -> Result<(), RuntimeError> {
        if !name.starts_with("var.") {
            return Err(RuntimeError::Message(format!(
                "local variable {name} must be prefixed with var."
            )));
        }
        let Some(default) = Value::default_for_type(type_name) else {
            return Err(RuntimeError::Message(format!(
                "unknown local variable type {type_name}"
            )));
        };
        self.locals
            .insert(name.to_string(), (type_name.to_string(), default));
        Ok(())
    }

    pub(crate) fn header_target<'n>(
        &mut self,
        scope: Scope,
        name: &'n str,
    ) -> Result<(&mut HeaderMap, &'n str), RuntimeError> {
        if let Some(header) = name.strip_prefix("req.http.") {
            return Ok((&mut self.request.headers, header));
        }
        if let Some(header) = name.strip_prefix("bereq.http.") {
            if !scope.intersects(BEREQ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            return match self.backend_request.as_mut() {
                Some(bereq) => Ok((&mut bereq.headers, header)),
                None => Err(RuntimeError::Message(
                    "bereq is not available yet".to_string(),
                )),
            };
        }
        if let Some(header) = name.strip_prefix("beresp.http.") {
            if !scope.intersects(BERESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            return match self.backend_response.as_mut() {
                Some(beresp) => Ok((&mut beresp.headers, header)),
                None => Err(RuntimeError::Message(
                    "beresp is not available yet".to_string(),
                )),
            };
        }
        if let Some(header) = name.strip_prefix("resp.http.") {
            if !scope.intersects(RESP_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            return match self.response.as_mut() {
                Some(resp) => Ok((&mut resp.headers, header)),
                None => Err(RuntimeError::Message(
                    "resp is not available yet".to_string(),
                )),
            };
        }
        if let Some(header) = name.strip_prefix("obj.http.") {
            if !scope.intersects(OBJ_SCOPES) {
                return Err(not_accessible(name, scope));
            }
            let object = self.object.get_or_insert_with(Default::default);
            return Ok((&mut object.headers, header));
        }
        Err(RuntimeError::Message(format!(
            "{name} is not a header variable"
        )))
    }
}

fn rtime_of(value: Value) -> Result<chrono::Duration, RuntimeError> {
    match value {
        Value::RTime(ttl) => Ok(ttl),
        other => Err(RuntimeError::Message(format!(
            "ttl expects an RTIME, got {}",
            other.kind()
        ))),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Value {
    match headers.get(name) {
        Some(value) => Value::String(value.to_string()),
        None => Value::Null,
    }
}

fn set_response_field(
    response: &mut super::http::Response,
    name: &str,
    rest: &str,
    value: Value,
) -> Result<(), RuntimeError> {
    match rest {
        "status" => match value.coerce_to("INTEGER")? {
            Value::Integer(status) => response.status = status,
            other => {
                return Err(RuntimeError::Message(format!(
                    "{name} expects an INTEGER, got {}",
                    other.kind()
                )))
            }
        },
        "response" => response.response = value.coerce_to("STRING")?.to_vcl_string(),
        "proto" => response.proto = value.coerce_to("STRING")?.to_vcl_string(),
        _ => match rest.strip_prefix("http.") {
            Some(header) => {
                let text = value.coerce_to("STRING")?.to_vcl_string();
                response.headers.set(header, text);
            }
            None => {
                return Err(RuntimeError::Message(format!("unknown variable {name}")));
            }
        },
    }
    Ok(())
}
