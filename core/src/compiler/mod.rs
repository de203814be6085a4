//! Compilation of template syntax trees into bytecode.
//!
//! [`BytecodeCompiler`] walks every tree of a template set, then the
//! stitcher inlines calls to templates that are nothing but static text.

mod bytecode;
mod emitter;
mod error;
mod stitch;

pub(crate) use bytecode::BytecodeCompiler;
pub use bytecode::{BOTTOM_ASSETS, NAMESPACE_SEPARATOR, TOP_ASSETS};
pub use error::{CompileError, CompileErrorKind};
