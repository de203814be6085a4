//! Runtime values.
//!
//! [`Value`] is the dynamically typed data a template renders. Records are
//! described by a [`TypeDescriptor`] registered by the host, and callables by
//! a [`Function`] with a declared [`Signature`].

pub mod descriptor;
pub mod dynamic;
pub mod func_map;
pub mod function;

pub use descriptor::{Method, Receiver, TypeDescriptor, TypeDescriptorBuilder};
pub use dynamic::{Key, KeyKind, MapValue, RecordRef, Stream, Value};
pub use func_map::FuncMap;
pub use function::{FastFn, Function, FunctionError, NativeFn, ParamType, Signature};
