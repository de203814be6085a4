//! Engine, compile and render options.
//!
//! Every options struct has an `*Override` twin whose fields are all
//! `Option`s. Overrides are applied on top of the engine defaults for a single
//! call, so callers only spell out what they want changed.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Evaluate pipelines made only of literals and pure functions at compile
    /// time.
    pub fold_constants: bool,
    /// Inline calls to templates whose body is a single static chunk.
    pub stitch: bool,
    /// Run the HTML comment escaper instead of eliding it, dropping comment
    /// contents from the output.
    pub drop_comments: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            fold_constants: true,
            stitch: true,
            drop_comments: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptionsOverride {
    pub fold_constants: Option<bool>,
    pub stitch: Option<bool>,
    pub drop_comments: Option<bool>,
}

impl CompileOptions {
    pub fn override_with(&mut self, o: &CompileOptionsOverride) {
        if let Some(fold_constants) = o.fold_constants {
            self.fold_constants = fold_constants;
        }
        if let Some(stitch) = o.stitch {
            self.stitch = stitch;
        }
        if let Some(drop_comments) = o.drop_comments {
            self.drop_comments = drop_comments;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Reuse execution states between renders of the same program.
    pub pool_states: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { pool_states: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptionsOverride {
    pub pool_states: Option<bool>,
}

impl RunOptions {
    pub fn override_with(&mut self, o: &RunOptionsOverride) {
        if let Some(pool_states) = o.pool_states {
            self.pool_states = pool_states;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub default_compile_options: CompileOptions,
    /// Copied into every compiled program.
    pub default_run_options: RunOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_only_touches_set_fields() {
        let mut options = CompileOptions::default();
        options.override_with(&CompileOptionsOverride {
            stitch: Some(false),
            ..Default::default()
        });
        assert_eq!(
            options,
            CompileOptions {
                fold_constants: true,
                stitch: false,
                drop_comments: false,
            }
        );

        let mut run = RunOptions::default();
        run.override_with(&RunOptionsOverride::default());
        assert!(run.pool_states);
        run.override_with(&RunOptionsOverride {
            pool_states: Some(false),
        });
        assert!(!run.pool_states);
    }
}
