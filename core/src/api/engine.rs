//! The Quill compilation engine.

use super::{CompileOptionsOverride, EngineOptions, Error, TemplateSet};
use crate::compiler::BytecodeCompiler;
use crate::stdlib::register_stdlib;
use crate::values::FuncMap;
use crate::vm::Program;

/// Compiles template sets against a fixed function registry.
///
/// The engine holds:
/// - the functions templates can call (the standard library plus whatever
///   the host registers)
/// - the default compile and run options
///
/// # Example
///
/// ```
/// use quill_core::api::{Engine, EngineOptions, TemplateSet, VarMap};
/// use quill_core::syntax::{Arg, Node, Tree};
/// use quill_core::values::{Function, ParamType, Signature, Value};
///
/// let engine = Engine::new(EngineOptions::default(), |funcs| {
///     funcs.bind(Function::new(
///         "shout",
///         Signature::new([ParamType::Str]).returns(ParamType::Str),
///         |args| Ok(Value::str(format!("{}!", args[0].as_str().unwrap_or_default()))),
///     ))
/// });
///
/// // {{ shout .Name }}
/// let tree = Tree::new("main", vec![Node::action(vec![Arg::ident("shout"), Arg::field("Name")])]);
/// let program = engine.compile(&TemplateSet::new(tree)).unwrap();
///
/// let data = Value::map([("Name", Value::str("hey"))]);
/// let out = program.render_to_string("main", &data, &VarMap::new()).unwrap();
/// assert_eq!(out, "hey!");
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    funcs: FuncMap,
    options: EngineOptions,
}

impl Engine {
    /// Create a new engine.
    ///
    /// The initialization closure receives the function map with the standard
    /// library already registered and returns it with the host's functions
    /// added.
    pub fn new(options: EngineOptions, init: impl FnOnce(FuncMap) -> FuncMap) -> Self {
        let funcs = init(register_stdlib(FuncMap::new()));
        tracing::debug!(functions = funcs.len(), "Engine created");
        Self { funcs, options }
    }

    /// Access the function registry.
    pub fn funcs(&self) -> &FuncMap {
        &self.funcs
    }

    /// Access the engine options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a template set with the default options.
    pub fn compile(&self, set: &TemplateSet) -> Result<Program, Error> {
        self.compile_with(CompileOptionsOverride::default(), set)
    }

    /// Compile a template set, overriding some of the default options.
    pub fn compile_with(
        &self,
        options_override: CompileOptionsOverride,
        set: &TemplateSet,
    ) -> Result<Program, Error> {
        let mut options = self.options.default_compile_options;
        options.override_with(&options_override);

        BytecodeCompiler::compile(set, &self.funcs, &options, self.options.default_run_options)
            .map_err(|error| {
                let source = set
                    .get(&error.location.template)
                    .and_then(|tree| tree.source.clone());
                Error::Compilation { error, source }
            })
    }
}
