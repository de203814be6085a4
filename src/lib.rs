//! Quill - a compiled template engine
//!
//! # Overview
//!
//! Quill compiles parsed text/HTML templates into a compact bytecode and
//! renders them on a small stack machine. Compilation resolves every
//! function, precomputes constant pipelines into static text, removes
//! redundant escaping and inlines calls to templates that are only static
//! text, so rendering does as little work as possible.
//!
//! # Quick Start
//!
//! ```
//! use quill::{Engine, EngineOptions, TemplateSet, Value, VarMap};
//! use quill::syntax::{Arg, Node, Tree};
//!
//! let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
//!
//! // {{range .Items}}<li>{{.}}</li>{{end}}
//! let tree = Tree::new("list", vec![Node::range(
//!     Arg::field("Items"),
//!     vec![Node::text("<li>"), Node::action(Arg::dot()), Node::text("</li>")],
//!     None,
//! )]);
//! let program = engine.compile(&TemplateSet::new(tree)).unwrap();
//!
//! let data = Value::map([("Items", Value::seq([Value::str("a"), Value::str("b")]))]);
//! let out = program.render_to_string("list", &data, &VarMap::new()).unwrap();
//! assert_eq!(out, "<li>a</li><li>b</li>");
//! ```
//!
//! # Host Functions
//!
//! Functions are registered when the engine is created. Marking a function
//! [`pure`](Function::pure) lets the compiler evaluate calls with constant
//! arguments ahead of time.
//!
//! ```
//! use quill::{Engine, EngineOptions, Function, ParamType, Signature, TemplateSet, Value, VarMap};
//! use quill::syntax::{Arg, Node, Tree};
//!
//! let engine = Engine::new(EngineOptions::default(), |funcs| {
//!     funcs.bind(
//!         Function::new("add", Signature::new([ParamType::Int, ParamType::Int]).returns(ParamType::Int), |args| {
//!             Ok(Value::Int(args[0].as_int().unwrap_or(0) + args[1].as_int().unwrap_or(0)))
//!         })
//!         .pure(),
//!     )
//! });
//!
//! // {{add 40 .N}}
//! let tree = Tree::new("sum", vec![Node::action(vec![Arg::ident("add"), Arg::int(40), Arg::field("N")])]);
//! let program = engine.compile(&TemplateSet::new(tree)).unwrap();
//! let out = program.render_to_string("sum", &Value::map([("N", Value::Int(2))]), &VarMap::new()).unwrap();
//! assert_eq!(out, "42");
//! ```

pub mod error_renderer;
pub use error_renderer::{CharSet, RenderConfig, render_error, render_error_to};

// Re-export public API from quill_core
pub use quill_core::api::{
    CompileOptions, CompileOptionsOverride, Diagnostic, Engine, EngineOptions, Error, FuncMap,
    RunOptions, RunOptionsOverride, Severity, TemplateSet, VarMap,
};

pub use quill_core::compiler::{
    BOTTOM_ASSETS, CompileError, CompileErrorKind, NAMESPACE_SEPARATOR, TOP_ASSETS,
};
pub use quill_core::syntax;
pub use quill_core::values::{
    self, Function, FunctionError, ParamType, Receiver, Signature, TypeDescriptor, Value,
};
pub use quill_core::vm::{ExecutionError, Location, Program, RuntimeError};
