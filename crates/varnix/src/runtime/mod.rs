pub(crate) mod builtins;
mod context;
mod expression;
mod function;
mod http;
mod statement;
mod value;
mod variables;

pub use context::{CancelToken, Context, Scope};
pub use function::{default_registry, BuiltinCall, Function, FunctionError, Registry};
pub use http::{HeaderMap, Request, Response};
pub use value::{parse_rtime, AclEntryValue, AclValue, BackendValue, Value};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::{
    AclDecl, BackendPropertyValue, Declaration, Expression, SubroutineDecl, Vcl,
};
use crate::diagnostics::Position;
use statement::Flow;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("type mismatch at {position}: expected {expected}, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
        position: Position,
    },
    #[error("{message} at {position}")]
    Runtime { message: String, position: Position },
    #[error("{0}")]
    Message(String),
    #[error("execution cancelled")]
    Cancelled,
    #[error(transparent)]
    Function(#[from] FunctionError),
}

/// State-machine transitions selected by `return` actions and by the
/// `error`/`restart` statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    Lookup,
    Pass,
    Hash,
    Error,
    Restart,
    Deliver,
    DeliverStale,
    Fetch,
}

impl State {
    pub(crate) fn from_action(name: &str) -> Option<State> {
        let state = match name {
            "lookup" => State::Lookup,
            "pass" => State::Pass,
            "hash" => State::Hash,
            "error" => State::Error,
            "restart" => State::Restart,
            "deliver" => State::Deliver,
            "deliver_stale" => State::DeliverStale,
            "fetch" => State::Fetch,
            "none" => State::None,
            _ => return None,
        };
        Some(state)
    }
}

/// Read-only variable inspection handle, usable after `process`.
pub struct Vars<'a> {
    ctx: &'a Context,
}

impl Vars<'_> {
    pub fn get(&self, scope: Scope, name: &str) -> Result<Value, RuntimeError> {
        self.ctx.get_variable(scope, name)
    }
}

struct CachedObject {
    response: Response,
    ttl: chrono::Duration,
}

const MAX_RESTARTS: i64 = 3;
const DEFAULT_TTL_SECONDS: i64 = 120;

/// Drives the Fastly VCL state machine over one simulated request:
/// recv → hash → hit|miss|pass → fetch → deliver → log, with error and
/// restart transitions.
pub struct Interpreter {
    vcl: Vcl,
    registry: Arc<Registry>,
    subroutines: HashMap<String, Arc<SubroutineDecl>>,
    pub(crate) ctx: Context,
    cache: HashMap<String, CachedObject>,
}

impl Interpreter {
    pub fn new(vcl: Vcl) -> Self {
        Self::with_registry(vcl, default_registry())
    }

    pub fn with_registry(vcl: Vcl, registry: Arc<Registry>) -> Self {
        let mut subroutines = HashMap::new();
        for decl in &vcl.declarations {
            if let Declaration::Subroutine(sub) = decl {
                subroutines.insert(sub.name.value.clone(), Arc::new(sub.clone()));
            }
        }
        Self {
            vcl,
            registry,
            subroutines,
            ctx: Context::new(Request::get("http://localhost/")),
            cache: HashMap::new(),
        }
    }

    pub(crate) fn subroutine(&self, name: &str) -> Option<Arc<SubroutineDecl>> {
        self.subroutines.get(name).cloned()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.ctx.cancel_token()
    }

    pub fn vars(&self) -> Vars<'_> {
        Vars { ctx: &self.ctx }
    }

    /// Runs the full state machine for `request`, leaving the delivered
    /// response in `writer`. Fatal faults abort the simulation.
    pub fn process(&mut self, writer: &mut Response, request: Request) -> Result<(), RuntimeError> {
        let cancel = self.ctx.cancel_token();
        self.ctx = Context::new(request);
        self.ctx.cancel = cancel;
        self.load_declarations()?;
        tracing::info!(
            method = %self.ctx.request.method,
            url = %self.ctx.request.url,
            "process request"
        );

        loop {
            match self.run_flow()? {
                State::Restart => {
                    if self.ctx.restarts >= MAX_RESTARTS {
                        return Err(RuntimeError::Message(format!(
                            "max restart count {MAX_RESTARTS} exceeded"
                        )));
                    }
                    self.ctx.restarts += 1;
                    self.reset_transaction();
                    tracing::debug!(restarts = self.ctx.restarts, "restart");
                }
                _ => break,
            }
        }

        if let Some(response) = self.ctx.response.clone() {
            *writer = response;
        }
        Ok(())
    }

    // One pass through the machine; yields Restart when any phase asked
    // for one, otherwise None after log.
    fn run_flow(&mut self) -> Result<State, RuntimeError> {
        let state = self.phase(Scope::RECV, State::Lookup)?;
        let state = match state {
            State::Restart => return Ok(State::Restart),
            State::Error => return self.error_flow(),
            State::None => State::Lookup,
            state => state,
        };

        match self.phase(Scope::HASH, State::Hash)? {
            State::Restart => return Ok(State::Restart),
            State::Error => return self.error_flow(),
            _ => {}
        }
        if self.ctx.hash.is_empty() {
            let host = self.ctx.request.headers.get("Host").unwrap_or_default();
            self.ctx.hash = format!("{host}{}", self.ctx.request.url);
        }
        tracing::debug!(hash = %self.ctx.hash, "cache key");

        let state = match state {
            State::Pass => match self.phase(Scope::PASS, State::Fetch)? {
                State::Restart => return Ok(State::Restart),
                State::Error => return self.error_flow(),
                _ => self.fetch_flow(false)?,
            },
            _ => {
                if let Some(object) = self.lookup_cache() {
                    tracing::debug!("cache hit");
                    self.ctx.object = Some(object);
                    match self.phase(Scope::HIT, State::Deliver)? {
                        State::Restart => return Ok(State::Restart),
                        State::Error => return self.error_flow(),
                        State::Pass => {
                            self.ctx.object = None;
                            self.fetch_flow(false)?
                        }
                        _ => State::Deliver,
                    }
                } else {
                    tracing::debug!("cache miss");
                    match self.phase(Scope::MISS, State::Fetch)? {
                        State::Restart => return Ok(State::Restart),
                        State::Error => return self.error_flow(),
                        State::Pass => self.fetch_flow(false)?,
                        _ => self.fetch_flow(true)?,
                    }
                }
            }
        };

        match state {
            State::Restart => Ok(State::Restart),
            State::Error => self.error_flow(),
            _ => self.deliver_flow(),
        }
    }

    fn phase(&mut self, scope: Scope, default: State) -> Result<State, RuntimeError> {
        self.ctx.scope = scope;
        tracing::debug!(phase = %scope, "enter phase");
        let Some(sub) = self.subroutine(scope.subroutine_name()) else {
            return Ok(default);
        };
        match self.exec_statements(&sub.block.statements)? {
            Flow::Continue | Flow::State(State::None) | Flow::Return(_) => Ok(default),
            Flow::State(state) => Ok(state),
        }
    }

    fn fetch_flow(&mut self, cacheable: bool) -> Result<State, RuntimeError> {
        self.ctx.backend_request = Some(self.ctx.request.clone());
        self.ctx.backend_response = Some(self.synthesize_backend_response());
        self.ctx.object_ttl = chrono::Duration::seconds(DEFAULT_TTL_SECONDS);

        let state = self.phase(Scope::FETCH, State::Deliver)?;

        if cacheable && self.ctx.object_ttl > chrono::Duration::zero() {
            if let Some(beresp) = &self.ctx.backend_response {
                self.cache.insert(
                    self.ctx.hash.clone(),
                    CachedObject {
                        response: beresp.clone(),
                        ttl: self.ctx.object_ttl,
                    },
                );
            }
        }
        Ok(match state {
            State::DeliverStale => State::Deliver,
            state => state,
        })
    }

    // No network transport exists: the backend response is synthesized
    // from the declared backend the request selected.
    fn synthesize_backend_response(&self) -> Response {
        let mut response = Response::new(200);
        response.headers.set("Server", "varnix");
        if let Some(backend) = &self.ctx.selected_backend {
            response.headers.set("X-Backend", backend.name.clone());
            response.headers.set("X-Backend-Host", backend.host());
            response.headers.set("X-Backend-Port", backend.port());
        }
        response.body = "OK".to_string();
        response
    }

    fn deliver_flow(&mut self) -> Result<State, RuntimeError> {
        let response = match (&self.ctx.object, &self.ctx.backend_response) {
            (Some(object), _) => object.clone(),
            (None, Some(beresp)) => beresp.clone(),
            (None, None) => Response::default(),
        };
        self.ctx.response = Some(response);

        match self.phase(Scope::DELIVER, State::Deliver)? {
            State::Restart => return Ok(State::Restart),
            _ => {}
        }
        self.phase(Scope::LOG, State::None)?;
        Ok(State::None)
    }

    fn error_flow(&mut self) -> Result<State, RuntimeError> {
        if self.ctx.object.is_none() {
            self.ctx.object = Some(Response::new(503));
        }
        match self.phase(Scope::ERROR, State::Deliver)? {
            State::Restart => Ok(State::Restart),
            _ => self.deliver_flow(),
        }
    }

    fn lookup_cache(&mut self) -> Option<Response> {
        let cached = self.cache.get(&self.ctx.hash)?;
        if cached.ttl <= chrono::Duration::zero() {
            return None;
        }
        self.ctx.object_ttl = cached.ttl;
        Some(cached.response.clone())
    }

    fn reset_transaction(&mut self) {
        self.ctx.scope = Scope::NONE;
        self.ctx.backend_request = None;
        self.ctx.backend_response = None;
        self.ctx.response = None;
        self.ctx.object = None;
        self.ctx.object_ttl = chrono::Duration::zero();
        self.ctx.hash.clear();
        self.ctx.set_captures(Vec::new());
    }

    fn load_declarations(&mut self) -> Result<(), RuntimeError> {
        let backends = load_backends(&self.vcl);
        let acls = load_acls(&self.vcl)?;
        let tables = load_tables(&self.vcl, &backends)?;
        self.ctx.selected_backend = first_backend(&self.vcl, &backends);
        self.ctx.backends = backends;
        self.ctx.acls = acls;
        self.ctx.tables = tables;
        Ok(())
    }
}

fn first_backend(
    vcl: &Vcl,
    backends: &HashMap<String, Arc<BackendValue>>,
) -> Option<Arc<BackendValue>> {
    vcl.declarations.iter().find_map(|decl| match decl {
        Declaration::Backend(backend) => backends.get(&backend.name.value).cloned(),
        _ => None,
    })
}

fn load_backends(vcl: &Vcl) -> HashMap<String, Arc<BackendValue>> {
    let mut backends = HashMap::new();
    for decl in &vcl.declarations {
        let Declaration::Backend(backend) = decl else {
            continue;
        };
        let mut properties = HashMap::new();
        collect_backend_properties(&backend.properties, "", &mut properties);
        backends.insert(
            backend.name.value.clone(),
            Arc::new(BackendValue {
                name: backend.name.value.clone(),
                properties,
            }),
        );
    }
    backends
}

fn collect_backend_properties(
    declared: &[crate::ast::BackendProperty],
    prefix: &str,
    out: &mut HashMap<String, String>,
) {
    for property in declared {
        let key = if prefix.is_empty() {
            property.key.value.clone()
        } else {
            format!("{prefix}.{}", property.key.value)
        };
        match &property.value {
            BackendPropertyValue::Expression(expr) => {
                if let Ok(value) = literal_value(expr, &HashMap::new()) {
                    out.insert(key, value.to_vcl_string());
                }
            }
            BackendPropertyValue::Object(nested) => {
                collect_backend_properties(nested, &key, out);
            }
        }
    }
}

fn load_acls(vcl: &Vcl) -> Result<HashMap<String, Arc<AclValue>>, RuntimeError> {
    let mut acls = HashMap::new();
    for decl in &vcl.declarations {
        let Declaration::Acl(acl) = decl else {
            continue;
        };
        acls.insert(acl.name.value.clone(), Arc::new(load_acl(acl)?));
    }
    Ok(acls)
}

fn load_acl(acl: &AclDecl) -> Result<AclValue, RuntimeError> {
    let mut entries = Vec::with_capacity(acl.entries.len());
    for entry in &acl.entries {
        let address = entry
            .address
            .value
            .parse()
            .map_err(|_| RuntimeError::Runtime {
                message: format!(
                    "acl {}: invalid address {:?}",
                    acl.name.value, entry.address.value
                ),
                position: entry.meta.position(),
            })?;
        let mask = match &entry.mask {
            Some(mask) => {
                let bits = u8::try_from(mask.value).map_err(|_| RuntimeError::Runtime {
                    message: format!("acl {}: invalid mask {}", acl.name.value, mask.value),
                    position: mask.meta.position(),
                })?;
                Some(bits)
            }
            None => None,
        };
        entries.push(AclEntryValue {
            inverse: entry.inverse,
            address,
            mask,
        });
    }
    Ok(AclValue {
        name: acl.name.value.clone(),
        entries,
    })
}

fn load_tables(
    vcl: &Vcl,
    backends: &HashMap<String, Arc<BackendValue>>,
) -> Result<HashMap<String, HashMap<String, Value>>, RuntimeError> {
    let mut tables = HashMap::new();
    for decl in &vcl.declarations {
        let Declaration::Table(table) = decl else {
            continue;
        };
        let mut entries = HashMap::new();
        for entry in &table.entries {
            let value = literal_value(&entry.value, backends)?;
            entries.insert(entry.key.value.clone(), value);
        }
        tables.insert(table.name.value.clone(), entries);
    }
    Ok(tables)
}

// Declaration bodies only hold constants (plus backend references in
// tables); anything else is rejected at load time.
fn literal_value(
    expr: &Expression,
    backends: &HashMap<String, Arc<BackendValue>>,
) -> Result<Value, RuntimeError> {
    match expr {
        Expression::String(lit) => Ok(Value::String(lit.value.clone())),
        Expression::Integer(lit) => Ok(Value::Integer(lit.value)),
        Expression::Float(lit) => Ok(Value::Float(lit.value)),
        Expression::Bool(lit) => Ok(Value::Bool(lit.value)),
        Expression::RTime(lit) => parse_rtime(&lit.value).map(Value::RTime),
        Expression::Group(group) => literal_value(&group.right, backends),
        Expression::Prefix(prefix) if prefix.operator == "-" => {
            match literal_value(&prefix.right, backends)? {
                Value::Integer(v) => Ok(Value::Integer(v.wrapping_neg())),
                Value::Float(v) => Ok(Value::Float(-v)),
                Value::RTime(v) => Ok(Value::RTime(-v)),
                other => Err(RuntimeError::Runtime {
                    message: format!("cannot negate {} in a declaration", other.kind()),
                    position: prefix.meta.position(),
                }),
            }
        }
        Expression::Ident(ident) => match backends.get(&ident.value) {
            Some(backend) => Ok(Value::Backend(backend.clone())),
            None => Err(RuntimeError::Runtime {
                message: format!("unknown identifier {} in a declaration", ident.value),
                position: ident.meta.position(),
            }),
        },
        other => Err(RuntimeError::Runtime {
            message: "declaration values must be literals".to_string(),
            position: other.position(),
        }),
    }
}
