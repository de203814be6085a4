//! Public API for the Quill template engine.
//!
//! Templates go through two steps:
//!
//! 1. **Compile**: an [`Engine`] turns a [`TemplateSet`] of parsed trees into
//!    an immutable [`Program`](crate::vm::Program).
//! 2. **Render**: the program is rendered any number of times, from any
//!    number of threads, against a data value and a [`VarMap`].
//!
//! # Example
//!
//! ```
//! use quill_core::api::{Engine, EngineOptions, TemplateSet, VarMap};
//! use quill_core::syntax::{Arg, Node, Tree};
//! use quill_core::values::Value;
//!
//! let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
//!
//! // Hello {{.Name}}!
//! let tree = Tree::new("hello", vec![
//!     Node::text("Hello "),
//!     Node::action(Arg::field("Name")),
//!     Node::text("!"),
//! ]);
//! let program = engine.compile(&TemplateSet::new(tree)).unwrap();
//!
//! let data = Value::map([("Name", Value::str("World"))]);
//! let out = program.render_to_string("hello", &data, &VarMap::new()).unwrap();
//! assert_eq!(out, "Hello World!");
//! ```

pub mod engine;
pub mod error;
pub mod options;
mod render;
pub mod template_set;
pub mod vars;

pub use crate::values::FuncMap;
pub use engine::Engine;
pub use error::{Diagnostic, Error, Severity};
pub use options::{
    CompileOptions, CompileOptionsOverride, EngineOptions, RunOptions, RunOptionsOverride,
};
pub use template_set::TemplateSet;
pub use vars::VarMap;
