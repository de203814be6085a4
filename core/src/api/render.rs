//! Rendering entry points on [`Program`].

use std::io::Write;

use super::{Error, RunOptionsOverride, VarMap};
use crate::values::Value;
use crate::vm::{ExecutionError, Program};

impl Program {
    /// Render template `name` into `w`, with `data` as the dot and `vars` as
    /// `$Vars`.
    ///
    /// Output is written as it's produced: when rendering fails, whatever was
    /// written before the failing instruction stays in `w`.
    pub fn render(
        &self,
        w: &mut impl Write,
        name: &str,
        data: &Value,
        vars: &VarMap,
    ) -> Result<(), Error> {
        self.render_with(RunOptionsOverride::default(), w, name, data, vars)
    }

    pub fn render_with(
        &self,
        options_override: RunOptionsOverride,
        w: &mut impl Write,
        name: &str,
        data: &Value,
        vars: &VarMap,
    ) -> Result<(), Error> {
        if !self.has_template(name) {
            return Err(Error::Api(format!("no such template {name:?}")));
        }
        let mut options = self.run_options;
        options.override_with(&options_override);

        let mut state = self.checkout(options.pool_states);
        let result = state.run(self, w, name, data.clone(), vars.to_value());
        self.checkin(state, options.pool_states);
        result.map_err(|error| self.runtime_error(error))
    }

    /// Render into a string. Invalid UTF-8 from static byte chunks is
    /// replaced.
    pub fn render_to_string(&self, name: &str, data: &Value, vars: &VarMap) -> Result<String, Error> {
        let mut out = Vec::new();
        self.render(&mut out, name, data, vars)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Render the root template.
    pub fn render_root(&self, w: &mut impl Write, data: &Value, vars: &VarMap) -> Result<(), Error> {
        self.render(w, self.root(), data, vars)
    }

    fn runtime_error(&self, error: ExecutionError) -> Error {
        let source = error
            .location
            .as_ref()
            .and_then(|location| self.templates.get(location.template.as_str()))
            .and_then(|template| template.source.clone());
        Error::Runtime { error, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Engine, EngineOptions, TemplateSet};
    use crate::syntax::{Arg, Node, Tree};

    #[test]
    fn test_unknown_template_is_api_error() {
        let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
        let program = engine
            .compile(&TemplateSet::new(Tree::new("main", vec![Node::text("x")])))
            .unwrap();
        let err = program
            .render_to_string("nope", &Value::Nil, &VarMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(err.to_string(), "API error: no such template \"nope\"");
    }

    #[test]
    fn test_pooled_and_unpooled_renders_agree() {
        let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
        let tree = Tree::new("main", vec![Node::action(Arg::dot())]);
        let program = engine.compile(&TemplateSet::new(tree)).unwrap();

        let mut pooled = Vec::new();
        let mut fresh = Vec::new();
        for i in 0..3 {
            program
                .render(&mut pooled, "main", &Value::Int(i), &VarMap::new())
                .unwrap();
            program
                .render_with(
                    RunOptionsOverride {
                        pool_states: Some(false),
                    },
                    &mut fresh,
                    "main",
                    &Value::Int(i),
                    &VarMap::new(),
                )
                .unwrap();
        }
        assert_eq!(pooled, b"012");
        assert_eq!(pooled, fresh);
    }

    #[test]
    fn test_runtime_error_carries_source() {
        let engine = Engine::new(EngineOptions::default(), |funcs| funcs);
        let tree = Tree::new(
            "main",
            vec![Node::text("ab"), Node::action(Arg::field("X.Y").at(4)).at(2)],
        )
        .with_source("ab{{.X.Y}}");
        let program = engine.compile(&TemplateSet::new(tree)).unwrap();

        let mut out = Vec::new();
        let err = program
            .render(&mut out, "main", &Value::Int(1), &VarMap::new())
            .unwrap_err();
        assert_eq!(out, b"ab");
        assert_eq!(err.source_text(), Some("ab{{.X.Y}}"));
        assert_eq!(
            err.to_string(),
            "Runtime error: main:1:4: can't evaluate field \"X\" on type int"
        );
    }
}
