//! VCL (Varnish/Fastly configuration language) toolchain: a trivia-aware
//! lexer, a Pratt parser producing a typed AST, and a scope-aware
//! interpreter that runs the edge state machine over a simulated
//! request/response pair.

pub mod ast;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod token;

pub use ast::Vcl;
pub use lexer::Lexer;
pub use parser::{parse, parse_snippet, ParseError, Parser};
pub use runtime::{
    default_registry, CancelToken, Function, FunctionError, HeaderMap, Interpreter, Registry,
    Request, Response, RuntimeError, Scope, Value, Vars,
};
