//! Per-type descriptors for record values.
//!
//! A descriptor is built once, when the host registers a record type, and
//! lists the type's fields and methods. Field and method resolution at render
//! time is a hash lookup on the descriptor instead of per-call reflection.

use core::fmt;
use std::sync::Arc;

use ecow::EcoString;
use hashbrown::HashMap;

use crate::values::{
    dynamic::Value,
    function::{FunctionError, Signature},
};

/// Callable backing a method. Receives the receiver and the already coerced
/// arguments.
pub type MethodFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// Custom textual form used when printing a record.
pub type StringerFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// How a method binds its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Callable on values and pointers alike.
    Value,
    /// Callable only through a pointer or an addressable record.
    Pointer,
}

pub struct Method {
    name: EcoString,
    receiver: Receiver,
    sig: Signature,
    call: MethodFn,
}

impl Method {
    pub fn new(
        name: impl Into<EcoString>,
        receiver: Receiver,
        sig: Signature,
        call: impl Fn(&Value, &[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            receiver,
            sig,
            call: Arc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    pub fn invoke(&self, receiver: &Value, args: &[Value]) -> Result<Value, FunctionError> {
        (self.call)(receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .field("sig", &self.sig)
            .finish()
    }
}

pub struct TypeDescriptor {
    name: EcoString,
    fields: Vec<EcoString>,
    field_index: HashMap<EcoString, usize>,
    methods: HashMap<EcoString, Method>,
    stringer: Option<StringerFn>,
}

impl TypeDescriptor {
    pub fn builder(name: impl Into<EcoString>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
            stringer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_names(&self) -> &[EcoString] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn stringer(&self) -> Option<&StringerFn> {
        self.stringer.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`TypeDescriptor`].
///
/// ```
/// use quill_core::values::{Receiver, Signature, ParamType, TypeDescriptor, Value};
///
/// let user = TypeDescriptor::builder("User")
///     .field("Name")
///     .method("Greeting", Receiver::Value, Signature::new([]).returns(ParamType::Str), |recv, _| {
///         let name = recv.as_record().and_then(|r| r.field("Name")).unwrap_or_default();
///         Ok(Value::str(format!("Hello {name}")))
///     })
///     .build();
/// assert_eq!(user.field_index("Name"), Some(0));
/// assert!(user.method("Greeting").is_some());
/// ```
pub struct TypeDescriptorBuilder {
    name: EcoString,
    fields: Vec<EcoString>,
    methods: Vec<Method>,
    stringer: Option<StringerFn>,
}

impl TypeDescriptorBuilder {
    pub fn field(mut self, name: impl Into<EcoString>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn method(
        mut self,
        name: impl Into<EcoString>,
        receiver: Receiver,
        sig: Signature,
        call: impl Fn(&Value, &[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        self.methods.push(Method::new(name, receiver, sig, call));
        self
    }

    pub fn stringer(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.stringer = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        let field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let methods = self
            .methods
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
        Arc::new(TypeDescriptor {
            name: self.name,
            fields: self.fields,
            field_index,
            methods,
            stringer: self.stringer,
        })
    }
}
