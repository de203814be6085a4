//! Public error types for the Quill API.
//!
//! Compiler and VM errors are wrapped into [`Error`] at the API boundary,
//! together with the source text of the template they point into when the
//! host supplied it. [`Error::to_diagnostic`] gives a uniform view used by
//! the error renderer.

use core::fmt;
use std::sync::Arc;

use crate::compiler::{CompileError, CompileErrorKind};
use crate::vm::{ExecutionError, Location, RuntimeError};

/// Public error type for all Quill operations.
#[derive(Debug)]
pub enum Error {
    /// Invalid API usage, e.g. rendering a template that doesn't exist.
    Api(String),

    /// The template set could not be compiled.
    Compilation {
        error: CompileError,
        source: Option<Arc<str>>,
    },

    /// A render failed. Output written before the failure stays in the sink.
    Runtime {
        error: ExecutionError,
        source: Option<Arc<str>>,
    },
}

impl Error {
    /// Where the error happened, if known.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Error::Api(_) => None,
            Error::Compilation { error, .. } => Some(&error.location),
            Error::Runtime { error, .. } => error.location.as_ref(),
        }
    }

    /// Source text of the template the error points into.
    pub fn source_text(&self) -> Option<&str> {
        match self {
            Error::Api(_) => None,
            Error::Compilation { source, .. } | Error::Runtime { source, .. } => {
                source.as_deref()
            }
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Error::Api(msg) => Diagnostic {
                severity: Severity::Error,
                message: msg.clone(),
                location: None,
                help: Vec::new(),
                code: None,
            },
            Error::Compilation { error, .. } => Diagnostic {
                severity: Severity::Error,
                message: error.kind.to_string(),
                location: Some(error.location.clone()),
                help: compile_help(&error.kind),
                code: None,
            },
            Error::Runtime { error, .. } => Diagnostic {
                severity: Severity::Error,
                message: error.kind.to_string(),
                location: error.location.clone(),
                help: runtime_help(&error.kind),
                code: None,
            },
        }
    }
}

fn compile_help(kind: &CompileErrorKind) -> Vec<String> {
    match kind {
        CompileErrorKind::UndefinedFunction(name) => {
            vec![format!("register `{name}` in the engine's function map")]
        }
        CompileErrorKind::Unbalanced(_) => {
            vec!["this is a compiler bug, please report it".to_string()]
        }
        _ => Vec::new(),
    }
}

fn runtime_help(kind: &RuntimeError) -> Vec<String> {
    match kind {
        RuntimeError::RequiresPointerReceiver { type_name, .. } => {
            vec![format!("pass a pointer to the {type_name} instead of a copy")]
        }
        _ => Vec::new(),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Api(msg) => write!(f, "API error: {}", msg),
            Error::Compilation { error, .. } => write!(f, "Compilation error: {}", error),
            Error::Runtime { error, .. } => write!(f, "Runtime error: {}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Api(_) => None,
            Error::Compilation { error, .. } => Some(error),
            Error::Runtime { error, .. } => Some(error),
        }
    }
}

/// A message with an optional source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,

    /// Primary diagnostic message, without the location prefix.
    pub message: String,

    pub location: Option<Location>,

    /// Help messages suggesting how to fix the issue.
    pub help: Vec<String>,

    /// Optional error code for documentation lookup.
    pub code: Option<String>,
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}
