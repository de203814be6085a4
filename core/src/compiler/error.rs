use crate::vm::Location;

/// Reasons compilation can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("undefined function {0:?}")]
    UndefinedFunction(String),

    #[error("no such template {0:?}")]
    UndefinedTemplate(String),

    #[error("can't compile node {0}")]
    UnsupportedNode(&'static str),

    #[error("invalid number node {0:?}")]
    InvalidNumber(String),

    #[error("identifier {0:?} outside of command")]
    IdentifierOutsideCommand(String),

    /// The compiled code pops more values than it pushes. Always a compiler
    /// bug.
    #[error("can't pop more than was pushed ({0})")]
    Unbalanced(i64),

    #[error("too many entries in the {0} table")]
    TableOverflow(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub location: Location,
}
