//! Dynamic values traversed by the codecs.

use std::collections::BTreeMap;

/// A value of any encodable type.
///
/// The variant must agree with the [`TypeDef`](crate::TypeDef) the value is
/// encoded as; a disagreement fails with
/// [`Error::TypeMismatch`](crate::Error::TypeMismatch).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Byte slices and byte arrays.
    Bytes(Vec<u8>),
    /// Arrays and slices of anything but bytes. An empty slice is
    /// `List(Vec::new())`, which does not allocate.
    List(Vec<Value>),
    Struct(StructValue),
    /// `None` is the nil interface.
    Interface(Option<Box<Concrete>>),
    /// `None` is the nil pointer.
    Pointer(Option<Box<Value>>),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Int(_) => "int",
            Value::Uint8(_) => "uint8",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Uint(_) => "uint",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
            Value::Interface(_) => "interface",
            Value::Pointer(_) => "pointer",
        }
    }

    /// Wraps a concrete value into an interface value.
    pub fn interface(type_name: impl Into<String>, value: Value) -> Self {
        Value::Interface(Some(Box::new(Concrete::new(type_name, value))))
    }

    /// The nil interface.
    pub fn nil_interface() -> Self {
        Value::Interface(None)
    }

    /// A non-nil pointer to `value`.
    pub fn pointer(value: Value) -> Self {
        Value::Pointer(Some(Box::new(value)))
    }

    /// The nil pointer.
    pub fn nil_pointer() -> Self {
        Value::Pointer(None)
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_concrete(&self) -> Option<&Concrete> {
        match self {
            Value::Interface(Some(c)) => Some(c),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(v) => Some(*v as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) | Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint8(v) => Some(*v as u64),
            Value::Uint16(v) => Some(*v as u64),
            Value::Uint32(v) => Some(*v as u64),
            Value::Uint64(v) | Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A struct value keyed by declared field name.
///
/// Field order is irrelevant here; the codecs traverse fields in declaration
/// order taken from the type descriptor. A field missing from the map is
/// treated as holding its zero value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructValue {
    fields: BTreeMap<String, Value>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, builder style.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Removes and returns a field.
    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// The concrete value held by a non-nil interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Concrete {
    /// Declared name of the concrete type (not its registered name).
    pub type_name: String,
    pub value: Value,
}

impl Concrete {
    pub fn new(type_name: impl Into<String>, value: Value) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }
}
