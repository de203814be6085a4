//! Runtime errors raised while rendering.

use core::fmt;
use std::io;

use super::location::Location;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("undefined variable: \"${name}\"")]
    UndefinedVariable { name: String },

    #[error("{name:?} is not a field of struct type {type_name}")]
    FieldNotFound { name: String, type_name: String },

    #[error("can't evaluate field {name:?} on type {type_name}")]
    NotEvaluable { name: String, type_name: String },

    #[error("method {name:?} requires pointer receiver (*{type_name})")]
    RequiresPointerReceiver { name: String, type_name: String },

    #[error("function {name:?} requires {} {expected} arguments, {given} given", arity_word(.variadic))]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        given: usize,
        variadic: bool,
    },

    #[error("can't call {name:?} with {found} as argument {index}, need {expected}")]
    ArgumentTypeMismatch {
        name: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("{name:?} returned an error: {message}")]
    FunctionReturnedError { name: String, message: String },

    #[error("can't range over {type_name}")]
    UnsupportedIterationType { type_name: String },

    #[error("can't print value of type {type_name}")]
    NotPrintable { type_name: String },

    #[error("invalid bytecode: {0}")]
    InvalidOpcode(&'static str),

    #[error("undefined template {0:?}")]
    UndefinedTemplate(String),

    #[error(transparent)]
    Write(#[from] io::Error),
}

fn arity_word(variadic: &bool) -> &'static str {
    if *variadic { "at least" } else { "exactly" }
}

/// A runtime error annotated with where it happened.
#[derive(Debug, thiserror::Error)]
pub struct ExecutionError {
    pub kind: RuntimeError,
    pub location: Option<Location>,
}

impl ExecutionError {
    pub fn new(kind: RuntimeError, location: Option<Location>) -> Self {
        Self { kind, location }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
