//! Function values callable from templates.
//!
//! Every function carries a [`Signature`] describing its fixed parameters, an
//! optional variadic tail and its declared return type. The VM uses the
//! signature for arity checks and argument coercion; the compiler uses the
//! return type to specialize escaping helpers.

use core::fmt;
use std::sync::Arc;

use ecow::EcoString;

use super::descriptor::TypeDescriptor;
use super::dynamic::{KeyKind, MapValue, Value};

// ============================================================================
// Parameter types
// ============================================================================

/// Declared type of a parameter or return value.
#[derive(Clone)]
pub enum ParamType {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Html,
    Js,
    Seq,
    Map,
    /// A record of the given type, by value.
    Record(Arc<TypeDescriptor>),
    /// A pointer to a record of the given type.
    Ptr(Arc<TypeDescriptor>),
    Stream,
    Func,
}

impl ParamType {
    /// Whether `value` can be passed as-is.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ParamType::Any, _) => true,
            (ParamType::Bool, Value::Bool(_))
            | (ParamType::Int, Value::Int(_))
            | (ParamType::Float, Value::Float(_))
            | (ParamType::Str, Value::Str(_))
            | (ParamType::Html, Value::Html(_))
            | (ParamType::Js, Value::Js(_))
            | (ParamType::Seq, Value::Seq(_))
            | (ParamType::Map, Value::Map(_))
            | (ParamType::Stream, Value::Stream(_))
            | (ParamType::Func, Value::Func(_)) => true,
            (ParamType::Record(ty), Value::Record(r)) => Arc::ptr_eq(ty, r.ty()),
            (ParamType::Ptr(_), Value::Ptr(None)) => true,
            (ParamType::Ptr(ty), Value::Ptr(Some(inner))) => {
                matches!(inner.as_ref(), Value::Record(r) if Arc::ptr_eq(ty, r.ty()))
            }
            _ => false,
        }
    }

    /// Zero value passed when a nil argument is given. Streams and functions
    /// have no zero value and receive nil.
    pub fn zero(&self) -> Value {
        match self {
            ParamType::Any | ParamType::Stream | ParamType::Func => Value::Nil,
            ParamType::Bool => Value::Bool(false),
            ParamType::Int => Value::Int(0),
            ParamType::Float => Value::Float(0.0),
            ParamType::Str => Value::str(""),
            ParamType::Html => Value::html(""),
            ParamType::Js => Value::js(""),
            ParamType::Seq => Value::seq([]),
            ParamType::Map => Value::Map(Arc::new(MapValue::new(KeyKind::Str))),
            ParamType::Record(ty) => Value::record(ty, Vec::new()),
            ParamType::Ptr(_) => Value::Ptr(None),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Any => write!(f, "any"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::Int => write!(f, "int"),
            ParamType::Float => write!(f, "float"),
            ParamType::Str => write!(f, "string"),
            ParamType::Html => write!(f, "html"),
            ParamType::Js => write!(f, "js"),
            ParamType::Seq => write!(f, "seq"),
            ParamType::Map => write!(f, "map"),
            ParamType::Record(ty) => write!(f, "{}", ty.name()),
            ParamType::Ptr(ty) => write!(f, "*{}", ty.name()),
            ParamType::Stream => write!(f, "stream"),
            ParamType::Func => write!(f, "func"),
        }
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct Signature {
    params: Vec<ParamType>,
    variadic: Option<ParamType>,
    returns: ParamType,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = ParamType>) -> Self {
        Self {
            params: params.into_iter().collect(),
            variadic: None,
            returns: ParamType::Any,
        }
    }

    pub fn variadic(mut self, ty: ParamType) -> Self {
        self.variadic = Some(ty);
        self
    }

    pub fn returns(mut self, ty: ParamType) -> Self {
        self.returns = ty;
        self
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn variadic_type(&self) -> Option<&ParamType> {
        self.variadic.as_ref()
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic.is_some()
    }

    pub fn return_type(&self) -> &ParamType {
        &self.returns
    }

    /// Declared type of the argument at `index`.
    pub fn param(&self, index: usize) -> Option<&ParamType> {
        self.params.get(index).or(self.variadic.as_ref())
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Error returned by a host function. Reported to the template author as a
/// runtime error naming the function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct FunctionError {
    message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signature for native functions. Variadic arguments arrive packed in a
/// single trailing [`Value::Seq`].
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// Optional direct entry point for functions whose variadic tail is `Any`.
/// Receives the fixed arguments and the unpacked tail separately.
pub type FastFn = Arc<dyn Fn(&[Value], &[Value]) -> Result<Value, FunctionError> + Send + Sync>;

pub struct Function {
    name: EcoString,
    sig: Signature,
    pure: bool,
    call: NativeFn,
    fast: Option<FastFn>,
}

impl Function {
    pub fn new(
        name: impl Into<EcoString>,
        sig: Signature,
        call: impl Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            sig,
            pure: false,
            call: Arc::new(call),
            fast: None,
        }
    }

    /// Mark the function as pure: same arguments, same result, no side
    /// effects. Pipelines made only of literals and pure calls are evaluated
    /// at compile time.
    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    /// Attach a fast path. Only used when the variadic tail is `Any`; it must
    /// behave exactly like the regular entry point.
    pub fn with_fast_path(
        mut self,
        fast: impl Fn(&[Value], &[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        self.fast = Some(Arc::new(fast));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn fast_path(&self) -> Option<&FastFn> {
        self.fast.as_ref()
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, FunctionError> {
        (self.call)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("sig", &self.sig)
            .field("pure", &self.pure)
            .field("fast", &self.fast.is_some())
            .finish()
    }
}
