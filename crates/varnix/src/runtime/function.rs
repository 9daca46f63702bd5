use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use thiserror::Error;

use super::context::{Context, Scope};
use super::value::Value;
use super::RuntimeError;

pub type BuiltinCall =
    Arc<dyn Fn(&mut Context, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync>;

/// Descriptor of one builtin: the callable, the scopes it may run in,
/// whether it can stand alone as a statement, and which argument
/// positions receive a bare identifier instead of an evaluated value.
#[derive(Clone)]
pub struct Function {
    pub scope: Scope,
    pub call: BuiltinCall,
    pub can_statement_call: bool,
    pub ident_arguments: &'static [usize],
}

impl Function {
    pub fn is_ident_argument(&self, index: usize) -> bool {
        self.ident_arguments.contains(&index)
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("scope", &self.scope)
            .field("can_statement_call", &self.can_statement_call)
            .field("ident_arguments", &self.ident_arguments)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("function {0} is not defined")]
    NotDefined(String),
    #[error("function {name} cannot be called in {scope} scope")]
    WrongScope { name: String, scope: Scope },
    #[error("function {0} is already defined and cannot be overridden")]
    AlreadyDefined(String),
}

/// Name → descriptor map. The process-wide instance is populated once at
/// startup and read-only afterwards ("inject then freeze"); tests build
/// isolated instances instead of mutating the shared one.
pub struct Registry {
    functions: RwLock<HashMap<String, Function>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        {
            let mut map = registry.functions.write();
            for (name, function) in super::builtins::builtin_functions() {
                map.insert(name, function);
            }
        }
        registry
    }

    /// Returns the descriptor iff the name is registered and its scope
    /// mask intersects the current scope. The two failure modes stay
    /// distinct so callers can report them differently.
    pub fn exists(&self, scope: Scope, name: &str) -> Result<Function, FunctionError> {
        let map = self.functions.read();
        let Some(function) = map.get(name) else {
            return Err(FunctionError::NotDefined(name.to_string()));
        };
        if !function.scope.intersects(scope) {
            return Err(FunctionError::WrongScope {
                name: name.to_string(),
                scope,
            });
        }
        Ok(function.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Adds every entry or none: a collision on any name fails with
    /// `AlreadyDefined` and leaves the registry untouched.
    pub fn inject(&self, entries: HashMap<String, Function>) -> Result<(), FunctionError> {
        let mut map = self.functions.write();
        for name in entries.keys() {
            if map.contains_key(name) {
                return Err(FunctionError::AlreadyDefined(name.clone()));
            }
        }
        for (name, function) in entries {
            map.insert(name, function);
        }
        Ok(())
    }
}

/// The shared registry every interpreter uses unless given its own.
pub fn default_registry() -> Arc<Registry> {
    static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Arc::new(Registry::with_builtins()))
        .clone()
}
