use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, mpsc};

use ecow::EcoString;
use hashbrown::HashMap;

use crate::values::{descriptor::TypeDescriptor, function::Function};

/// A dynamically typed template value.
///
/// All payloads are reference counted, so cloning a `Value` is cheap and
/// values can be shared freely between renders running on different threads.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
    /// Markup that is already safe to emit.
    Html(EcoString),
    /// Script source that is already safe to emit.
    Js(EcoString),
    Seq(Arc<[Value]>),
    Map(Arc<MapValue>),
    Record(RecordRef),
    /// Nullable pointer.
    Ptr(Option<Arc<Value>>),
    /// Nullable box holding a value of any type.
    Dyn(Option<Arc<Value>>),
    Func(Arc<Function>),
    Stream(Stream),
}

impl Value {
    pub fn str(s: impl Into<EcoString>) -> Self {
        Value::Str(s.into())
    }

    pub fn html(s: impl Into<EcoString>) -> Self {
        Value::Html(s.into())
    }

    pub fn js(s: impl Into<EcoString>) -> Self {
        Value::Js(s.into())
    }

    pub fn seq(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Seq(items.into_iter().collect())
    }

    /// Build a map. The key kind is taken from the first key, string if empty.
    pub fn map<K: Into<Key>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(MapValue::from_entries(entries)))
    }

    pub fn ptr(value: Value) -> Self {
        Value::Ptr(Some(Arc::new(value)))
    }

    pub fn nil_ptr() -> Self {
        Value::Ptr(None)
    }

    pub fn boxed(value: Value) -> Self {
        Value::Dyn(Some(Arc::new(value)))
    }

    pub fn record(ty: &Arc<TypeDescriptor>, fields: Vec<Value>) -> Self {
        Value::Record(RecordRef::new(ty, fields))
    }

    pub fn func(function: Function) -> Self {
        Value::Func(Arc::new(function))
    }

    pub fn stream(rx: mpsc::Receiver<Value>) -> Self {
        Value::Stream(Stream::new(rx))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil | Value::Ptr(None) | Value::Dyn(None))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text content of any of the string-typed variants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Html(s) | Value::Js(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Length of strings, sequences and maps.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) | Value::Html(s) | Value::Js(s) => Some(s.len()),
            Value::Seq(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Template truthiness: zero values and empty containers are false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) | Value::Html(s) | Value::Js(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Ptr(p) | Value::Dyn(p) => p.is_some(),
            Value::Record(_) | Value::Func(_) | Value::Stream(_) => true,
        }
    }

    /// Follow one pointer or dynamic box. Records reached through a pointer
    /// become addressable.
    pub fn deref_once(&self) -> Option<Value> {
        match self {
            Value::Ptr(Some(inner)) => Some(inner.as_ref().clone().addressed()),
            Value::Dyn(Some(inner)) => Some(inner.as_ref().clone()),
            _ => None,
        }
    }

    /// Unwrap a non-nil dynamic box, leaving everything else untouched.
    pub fn stackable(self) -> Value {
        match self {
            Value::Dyn(Some(inner)) => inner.as_ref().clone(),
            other => other,
        }
    }

    /// Whether a pointer to this value can be taken.
    pub fn is_addressable(&self) -> bool {
        matches!(self, Value::Record(r) if r.addressable)
    }

    pub(crate) fn addressed(self) -> Value {
        match self {
            Value::Record(r) => Value::Record(r.with_addressable(true)),
            other => other,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Html(_) => "html".to_string(),
            Value::Js(_) => "js".to_string(),
            Value::Seq(_) => "seq".to_string(),
            Value::Map(map) => format!("map[{}]", map.key_kind()),
            Value::Record(r) => r.ty().name().to_string(),
            Value::Ptr(Some(inner)) => format!("*{}", inner.type_name()),
            Value::Ptr(None) => "*nil".to_string(),
            Value::Dyn(_) => "dyn".to_string(),
            Value::Func(_) => "func".to_string(),
            Value::Stream(_) => "stream".to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::seq(items.into_iter().map(Into::into))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Html(a), Value::Html(b)) => a == b,
            (Value::Js(a), Value::Js(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a.entries == b.entries,
            (Value::Record(a), Value::Record(b)) => {
                Arc::ptr_eq(&a.data.ty, &b.data.ty) && a.data.fields == b.data.fields
            }
            (Value::Ptr(a), Value::Ptr(b)) | (Value::Dyn(a), Value::Dyn(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            (Value::Stream(a), Value::Stream(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Html(s) => write!(f, "Html({s:?})"),
            Value::Js(s) => write!(f, "Js({s:?})"),
            Value::Seq(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Map(map) => f
                .debug_map()
                .entries(map.sorted_entries().map(|(k, v)| (k, v)))
                .finish(),
            Value::Record(r) => {
                let mut s = f.debug_struct(r.ty().name());
                for (name, value) in r.ty().field_names().iter().zip(r.data.fields.iter()) {
                    s.field(name, value);
                }
                s.finish()
            }
            Value::Ptr(Some(inner)) => write!(f, "Ptr({inner:?})"),
            Value::Ptr(None) => write!(f, "Ptr(nil)"),
            Value::Dyn(Some(inner)) => write!(f, "Dyn({inner:?})"),
            Value::Dyn(None) => write!(f, "Dyn(nil)"),
            Value::Func(func) => write!(f, "Func({})", func.name()),
            Value::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// The default textual form used when printing a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) | Value::Html(s) | Value::Js(s) => write!(f, "{s}"),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "map[")?;
                for (i, (k, v)) in map.sorted_entries().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "]")
            }
            Value::Record(r) => {
                if let Some(stringer) = r.ty().stringer() {
                    return write!(f, "{}", stringer(self));
                }
                write!(f, "{{")?;
                for (i, field) in r.data.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, "}}")
            }
            Value::Ptr(Some(inner)) => match inner.as_ref() {
                Value::Record(r) if r.ty().stringer().is_none() => write!(f, "&{inner}"),
                _ => write!(f, "{inner}"),
            },
            Value::Ptr(None) | Value::Dyn(None) => write!(f, "<nil>"),
            Value::Dyn(Some(inner)) => write!(f, "{inner}"),
            Value::Func(func) => write!(f, "<func {}>", func.name()),
            Value::Stream(_) => write!(f, "<stream>"),
        }
    }
}

/// Shortest representation, switching to exponent form below 1e-4 and at or
/// above 1e6 (`1e+06`, `2.5e-05`).
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let sci = format!("{x:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if (-4..6).contains(&exp) {
        return format!("{x}");
    }
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

// ============================================================================
// Map keys
// ============================================================================

/// Kind of the keys a map holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyKind {
    Bool,
    Int,
    Float,
    Str,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Bool => write!(f, "bool"),
            KeyKind::Int => write!(f, "int"),
            KeyKind::Float => write!(f, "float"),
            KeyKind::Str => write!(f, "string"),
        }
    }
}

/// A map key. Keys are totally ordered: bools, then ints, then floats, then
/// strings.
#[derive(Debug, Clone)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(EcoString),
}

impl Key {
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Bool(_) => KeyKind::Bool,
            Key::Int(_) => KeyKind::Int,
            Key::Float(_) => KeyKind::Float,
            Key::Str(_) => KeyKind::Str,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(f) => Value::Float(*f),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Key::Bool(b) => b.hash(state),
            Key::Int(i) => i.hash(state),
            Key::Float(f) => f.to_bits().hash(state),
            Key::Str(s) => s.hash(state),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Float(a), Key::Float(b)) => a.total_cmp(b),
            (Key::Str(a), Key::Str(b)) => a.cmp(b),
            _ => self.kind().cmp(&other.kind()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

impl From<EcoString> for Key {
    fn from(s: EcoString) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<f64> for Key {
    fn from(f: f64) -> Self {
        Key::Float(f)
    }
}

// ============================================================================
// Maps
// ============================================================================

#[derive(Debug, Clone)]
pub struct MapValue {
    key_kind: KeyKind,
    entries: HashMap<Key, Value>,
}

impl MapValue {
    pub fn new(key_kind: KeyKind) -> Self {
        Self {
            key_kind,
            entries: HashMap::new(),
        }
    }

    fn from_entries<K: Into<Key>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let mut map: Option<MapValue> = None;
        for (k, v) in entries {
            let k = k.into();
            map.get_or_insert_with(|| MapValue::new(k.kind()))
                .entries
                .insert(k, v);
        }
        map.unwrap_or_else(|| MapValue::new(KeyKind::Str))
    }

    /// Insert an entry. Keys of a different kind than the map's are ignored.
    pub fn insert(&mut self, key: impl Into<Key>, value: Value) -> bool {
        let key = key.into();
        if key.kind() != self.key_kind {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries.get(&Key::Str(key.into()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sorted_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn sorted_entries(&self) -> impl Iterator<Item = (&Key, &Value)> + Clone {
        let mut entries: Vec<(&Key, &Value)> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug)]
pub struct Record {
    ty: Arc<TypeDescriptor>,
    fields: Vec<Value>,
}

/// Shared handle to a record instance.
#[derive(Debug, Clone)]
pub struct RecordRef {
    data: Arc<Record>,
    addressable: bool,
}

impl RecordRef {
    /// Missing trailing fields are filled with nil, extra ones are dropped.
    pub fn new(ty: &Arc<TypeDescriptor>, mut fields: Vec<Value>) -> Self {
        fields.resize(ty.field_names().len(), Value::Nil);
        Self {
            data: Arc::new(Record {
                ty: Arc::clone(ty),
                fields,
            }),
            addressable: false,
        }
    }

    pub fn ty(&self) -> &Arc<TypeDescriptor> {
        &self.data.ty
    }

    pub fn fields(&self) -> &[Value] {
        &self.data.fields
    }

    /// Look up a field by name. Fields of addressable records are addressable.
    pub fn field(&self, name: &str) -> Option<Value> {
        let index = self.data.ty.field_index(name)?;
        let value = self.data.fields[index].clone();
        Some(if self.addressable {
            value.addressed()
        } else {
            value
        })
    }

    pub fn is_addressable(&self) -> bool {
        self.addressable
    }

    pub(crate) fn with_addressable(self, addressable: bool) -> Self {
        Self {
            data: self.data,
            addressable,
        }
    }
}

// ============================================================================
// Streams
// ============================================================================

/// The receiving end of a channel. Iterating a stream blocks until the
/// sender yields a value or hangs up.
#[derive(Clone)]
pub struct Stream(Arc<Mutex<mpsc::Receiver<Value>>>);

impl Stream {
    pub fn new(rx: mpsc::Receiver<Value>) -> Self {
        Self(Arc::new(Mutex::new(rx)))
    }

    /// Blocks for the next value. `None` once the sender is gone.
    pub fn recv(&self) -> Option<Value> {
        let rx = self.0.lock().ok()?;
        rx.recv().ok()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream")
    }
}

#[cfg(test)]
#[path = "dynamic_test.rs"]
mod dynamic_test;
