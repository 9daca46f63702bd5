use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::http::{Request, Response};
use super::value::{AclValue, BackendValue, Value};

/// Bitfield over the VCL subroutine phases. Stored as an integer so the
/// legality check for a builtin call is a single AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope(u16);

impl Scope {
    pub const NONE: Scope = Scope(0);
    pub const RECV: Scope = Scope(1 << 0);
    pub const HASH: Scope = Scope(1 << 1);
    pub const HIT: Scope = Scope(1 << 2);
    pub const MISS: Scope = Scope(1 << 3);
    pub const PASS: Scope = Scope(1 << 4);
    pub const FETCH: Scope = Scope(1 << 5);
    pub const ERROR: Scope = Scope(1 << 6);
    pub const DELIVER: Scope = Scope(1 << 7);
    pub const LOG: Scope = Scope(1 << 8);
    pub const ANY: Scope = Scope(0x1ff);

    pub fn intersects(self, other: Scope) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Scope) -> Scope {
        Scope(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The well-known subroutine name the state machine binds for this
    /// phase, e.g. `vcl_recv` for `RECV`.
    pub fn subroutine_name(self) -> &'static str {
        match self {
            Scope::RECV => "vcl_recv",
            Scope::HASH => "vcl_hash",
            Scope::HIT => "vcl_hit",
            Scope::MISS => "vcl_miss",
            Scope::PASS => "vcl_pass",
            Scope::FETCH => "vcl_fetch",
            Scope::ERROR => "vcl_error",
            Scope::DELIVER => "vcl_deliver",
            Scope::LOG => "vcl_log",
            _ => "",
        }
    }
}

impl std::ops::BitOr for Scope {
    type Output = Scope;

    fn bitor(self, rhs: Scope) -> Scope {
        Scope(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = [
            (Scope::RECV, "RECV"),
            (Scope::HASH, "HASH"),
            (Scope::HIT, "HIT"),
            (Scope::MISS, "MISS"),
            (Scope::PASS, "PASS"),
            (Scope::FETCH, "FETCH"),
            (Scope::ERROR, "ERROR"),
            (Scope::DELIVER, "DELIVER"),
            (Scope::LOG, "LOG"),
        ]
        .iter()
        .filter(|(scope, _)| self.intersects(*scope))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            return write!(f, "NONE");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Cooperative cancellation, checked at statement boundaries.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Everything a single request simulation owns: the request/response
/// views for each phase, declared entities, locals, and regex captures.
pub struct Context {
    pub scope: Scope,
    pub request: Request,
    pub backend_request: Option<Request>,
    pub backend_response: Option<Response>,
    pub response: Option<Response>,
    pub object: Option<Response>,
    pub client_ip: IpAddr,
    pub server_ip: IpAddr,
    pub now: DateTime<Utc>,
    pub restarts: i64,
    pub hash: String,
    pub object_ttl: chrono::Duration,
    pub selected_backend: Option<Arc<BackendValue>>,
    pub(crate) backends: HashMap<String, Arc<BackendValue>>,
    pub(crate) acls: HashMap<String, Arc<AclValue>>,
    pub(crate) tables: HashMap<String, HashMap<String, Value>>,
    pub(crate) locals: HashMap<String, (String, Value)>,
    pub(crate) captures: Vec<String>,
    pub(crate) cancel: Arc<CancelToken>,
    rng_state: u64,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            scope: Scope::NONE,
            request,
            backend_request: None,
            backend_response: None,
            response: None,
            object: None,
            client_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            now: Utc::now(),
            restarts: 0,
            hash: String::new(),
            object_ttl: chrono::Duration::zero(),
            selected_backend: None,
            backends: HashMap::new(),
            acls: HashMap::new(),
            tables: HashMap::new(),
            locals: HashMap::new(),
            captures: Vec::new(),
            cancel: CancelToken::new(),
            rng_state: 0x9e3779b97f4a7c15,
        }
    }

    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    pub fn acl(&self, name: &str) -> Option<Arc<AclValue>> {
        self.acls.get(name).cloned()
    }

    pub fn backend(&self, name: &str) -> Option<Arc<BackendValue>> {
        self.backends.get(name).cloned()
    }

    pub fn table(&self, name: &str) -> Option<&HashMap<String, Value>> {
        self.tables.get(name)
    }

    /// Stores the capture groups of the latest successful regex match;
    /// read back through `re.group.N`.
    pub(crate) fn set_captures(&mut self, captures: Vec<String>) {
        self.captures = captures;
    }

    pub(crate) fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }

    // xorshift64*; deterministic per context, which keeps randombool
    // reproducible inside one simulation.
    pub(crate) fn next_random(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        x.wrapping_mul(0x2545f4914f6cdd1d)
    }
}
