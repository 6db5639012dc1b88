//! Type expressions and named type declarations.
//!
//! A [`TypeDef`] is the static shape of a value. Named types (structs,
//! interfaces, and named wrappers over other types) are introduced by a
//! [`TypeDecl`] and referenced with [`TypeDef::Named`].

use std::fmt;
use std::sync::Arc;

use crate::hooks::{ReprCodec, WellKnownCodec};

/// A type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDef {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Platform-independent generic signed integer, always 64 bits wide.
    Int,
    /// Also used as the byte type.
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// Platform-independent generic unsigned integer, always 64 bits wide.
    Uint,
    Float32,
    Float64,
    String,
    /// Fixed-size array.
    Array(Box<TypeDef>, usize),
    /// Variable-length sequence.
    Slice(Box<TypeDef>),
    /// Nullable reference.
    Pointer(Box<TypeDef>),
    /// Reference to a declared type.
    Named(String),
    /// Has no wire representation.
    Map(Box<TypeDef>, Box<TypeDef>),
    /// Has no wire representation.
    Func,
    /// Has no wire representation.
    Chan(Box<TypeDef>),
}

impl TypeDef {
    /// `[]byte`
    pub fn bytes() -> Self {
        TypeDef::Slice(Box::new(TypeDef::Uint8))
    }

    /// `[len]byte`
    pub fn byte_array(len: usize) -> Self {
        TypeDef::Array(Box::new(TypeDef::Uint8), len)
    }

    /// `[]elem`
    pub fn slice(elem: TypeDef) -> Self {
        TypeDef::Slice(Box::new(elem))
    }

    /// `[len]elem`
    pub fn array(elem: TypeDef, len: usize) -> Self {
        TypeDef::Array(Box::new(elem), len)
    }

    /// `*elem`
    pub fn pointer(elem: TypeDef) -> Self {
        TypeDef::Pointer(Box::new(elem))
    }

    /// Reference to the declared type `name`.
    pub fn named(name: impl Into<String>) -> Self {
        TypeDef::Named(name.into())
    }

    /// Returns true for the byte type.
    pub fn is_byte(&self) -> bool {
        matches!(self, TypeDef::Uint8)
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDef::Bool => f.write_str("bool"),
            TypeDef::Int8 => f.write_str("int8"),
            TypeDef::Int16 => f.write_str("int16"),
            TypeDef::Int32 => f.write_str("int32"),
            TypeDef::Int64 => f.write_str("int64"),
            TypeDef::Int => f.write_str("int"),
            TypeDef::Uint8 => f.write_str("uint8"),
            TypeDef::Uint16 => f.write_str("uint16"),
            TypeDef::Uint32 => f.write_str("uint32"),
            TypeDef::Uint64 => f.write_str("uint64"),
            TypeDef::Uint => f.write_str("uint"),
            TypeDef::Float32 => f.write_str("float32"),
            TypeDef::Float64 => f.write_str("float64"),
            TypeDef::String => f.write_str("string"),
            TypeDef::Array(elem, len) => write!(f, "[{}]{}", len, elem),
            TypeDef::Slice(elem) => write!(f, "[]{}", elem),
            TypeDef::Pointer(elem) => write!(f, "*{}", elem),
            TypeDef::Named(name) => f.write_str(name),
            TypeDef::Map(k, v) => write!(f, "map[{}]{}", k, v),
            TypeDef::Func => f.write_str("func"),
            TypeDef::Chan(elem) => write!(f, "chan {}", elem),
        }
    }
}

/// Fixed-width binary encoding for an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinFixed {
    Fixed32,
    Fixed64,
}

/// Per-field encoding options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldOptions {
    /// JSON key; defaults to the field name.
    pub json_name: Option<String>,
    /// Skip zero values on JSON encode; leave absent keys untouched on decode.
    pub omit_empty: bool,
    /// Permit floating-point values, whose encoding is not deterministic
    /// across implementations.
    pub unsafe_: bool,
    /// Explicit binary field number; defaults to the 1-based field index.
    pub bin_field_num: Option<u32>,
    /// Fixed-width binary encoding for 32/64-bit integers.
    pub bin_fixed: Option<BinFixed>,
    /// Emit the field on the binary path even when it holds a zero value.
    pub write_empty: bool,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json_name(mut self, name: impl Into<String>) -> Self {
        self.json_name = Some(name.into());
        self
    }

    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    pub fn allow_unsafe(mut self) -> Self {
        self.unsafe_ = true;
        self
    }

    pub fn bin_field_num(mut self, num: u32) -> Self {
        self.bin_field_num = Some(num);
        self
    }

    pub fn fixed32(mut self) -> Self {
        self.bin_fixed = Some(BinFixed::Fixed32);
        self
    }

    pub fn fixed64(mut self) -> Self {
        self.bin_fixed = Some(BinFixed::Fixed64);
        self
    }

    pub fn write_empty(mut self) -> Self {
        self.write_empty = true;
        self
    }
}

/// A struct field declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeDef,
    pub options: FieldOptions,
}

/// Body of a named declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclBody {
    /// Ordered fields.
    Struct(Vec<FieldDef>),
    /// Polymorphic slot filled by registered concrete types.
    Interface,
    /// A named type over another type, e.g. `Height` over `Int64`.
    Defined(TypeDef),
}

/// A named type declaration.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub body: DeclBody,
    pub(crate) repr: Option<Arc<dyn ReprCodec>>,
    pub(crate) well_known: Option<Arc<dyn WellKnownCodec>>,
}

impl TypeDecl {
    /// Declares an empty struct; add fields with [`field`](Self::field).
    pub fn new_struct(name: impl Into<String>) -> Self {
        Self::with_body(name, DeclBody::Struct(Vec::new()))
    }

    /// Declares a named type over `underlying`.
    pub fn defined(name: impl Into<String>, underlying: TypeDef) -> Self {
        Self::with_body(name, DeclBody::Defined(underlying))
    }

    /// Declares an interface.
    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_body(name, DeclBody::Interface)
    }

    fn with_body(name: impl Into<String>, body: DeclBody) -> Self {
        Self {
            name: name.into(),
            body,
            repr: None,
            well_known: None,
        }
    }

    /// Appends a field with default options.
    ///
    /// # Panics
    ///
    /// Panics if the declaration is not a struct.
    pub fn field(self, name: impl Into<String>, ty: TypeDef) -> Self {
        self.field_with(name, ty, FieldOptions::default())
    }

    /// Appends a field with explicit options.
    ///
    /// # Panics
    ///
    /// Panics if the declaration is not a struct.
    pub fn field_with(mut self, name: impl Into<String>, ty: TypeDef, options: FieldOptions) -> Self {
        match &mut self.body {
            DeclBody::Struct(fields) => fields.push(FieldDef {
                name: name.into(),
                ty,
                options,
            }),
            _ => panic!("field added to non-struct declaration {}", self.name),
        }
        self
    }

    /// Attaches a custom representation hook.
    pub fn with_repr(mut self, repr: Arc<dyn ReprCodec>) -> Self {
        self.repr = Some(repr);
        self
    }

    /// Attaches a well-known type hook.
    pub fn with_well_known(mut self, well_known: Arc<dyn WellKnownCodec>) -> Self {
        self.well_known = Some(well_known);
        self
    }

    /// Returns the struct fields, if this declares a struct.
    pub fn fields(&self) -> Option<&[FieldDef]> {
        match &self.body {
            DeclBody::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.body, DeclBody::Interface)
    }

    pub fn repr(&self) -> Option<&Arc<dyn ReprCodec>> {
        self.repr.as_ref()
    }

    pub fn well_known(&self) -> Option<&Arc<dyn WellKnownCodec>> {
        self.well_known.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display() {
        assert_eq!(TypeDef::bytes().to_string(), "[]uint8");
        assert_eq!(TypeDef::byte_array(32).to_string(), "[32]uint8");
        assert_eq!(
            TypeDef::pointer(TypeDef::named("pkg.Msg")).to_string(),
            "*pkg.Msg"
        );
        assert_eq!(
            TypeDef::Map(Box::new(TypeDef::String), Box::new(TypeDef::Int)).to_string(),
            "map[string]int"
        );
    }

    #[test]
    fn test_struct_builder() {
        let decl = TypeDecl::new_struct("Msg")
            .field("A", TypeDef::Int64)
            .field_with("B", TypeDef::String, FieldOptions::new().json_name("b").omit_empty());
        let fields = decl.fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].options.json_name.as_deref(), Some("b"));
        assert!(fields[1].options.omit_empty);
        assert!(!decl.is_interface());
    }

    #[test]
    #[should_panic(expected = "non-struct")]
    fn test_field_on_interface_panics() {
        let _ = TypeDecl::interface("Iface").field("A", TypeDef::Bool);
    }
}
