//! Bytecode definitions and the virtual machine executing them.

mod call;
mod error;
mod instruction_set;
mod iter;
mod location;
mod program;
mod state;

pub use error::{ExecutionError, RuntimeError};
pub use instruction_set::{Instruction, Opcode};
pub use location::Location;
pub use program::Program;

pub(crate) use program::{CompiledTemplate, Context};
pub(crate) use state::{State, print_value};
