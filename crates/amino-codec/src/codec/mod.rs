//! Codec façade and the binary/JSON engines.
//!
//! A [`Codec`] owns the type registry, the descriptor cache and the decoding
//! limits. Registration happens first; the first encode or decode call seals
//! the registry so that no registration can race a decode.

pub mod binary;
pub mod json;
pub mod primitives;

#[cfg(test)]
pub(crate) mod fixtures;

use std::sync::Arc;

use log::warn;

use crate::descriptor::{DescriptorStore, FieldDescriptor, Kind, PrimitiveKind, TypeDescriptor};
use crate::error::{Error, Result};
use crate::limits::CodecOptions;
use crate::model::{Amino, BinFixed, StructValue, TypeDecl, TypeDef, Value};
use crate::registry::{ConcreteEntry, ConcreteOptions, InterfaceOptions, Registry};
use crate::wellknown;

pub use primitives::{Reader, WireType, Writer};

/// Field options that reach leaf values, list elements included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LeafOptions {
    pub unsafe_: bool,
    pub fixed: Option<BinFixed>,
}

impl From<&FieldDescriptor> for LeafOptions {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            unsafe_: field.unsafe_,
            fixed: field.bin_fixed,
        }
    }
}

/// A codec instance: registry, descriptor cache and options.
#[derive(Debug)]
pub struct Codec {
    registry: Registry,
    descriptors: DescriptorStore,
    options: CodecOptions,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Creates a codec with default options and the well-known types
    /// declared.
    pub fn new() -> Self {
        Self::with_options(CodecOptions::default())
    }

    pub fn with_options(options: CodecOptions) -> Self {
        Self {
            registry: Registry::with_declarations(wellknown::declarations()),
            descriptors: DescriptorStore::new(),
            options,
        }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Declares a named type that is not registered as a concrete type.
    pub fn declare(&self, decl: TypeDecl) -> Result<()> {
        self.registry.declare(decl)
    }

    /// Registers an interface.
    pub fn register_interface(&self, name: &str, options: InterfaceOptions) -> Result<()> {
        self.registry.register_interface(name, options)
    }

    /// Registers a concrete type under `name`.
    pub fn register_concrete(
        &self,
        decl: TypeDecl,
        name: &str,
        options: ConcreteOptions,
    ) -> Result<Arc<ConcreteEntry>> {
        self.registry.register_concrete(decl, name, options)
    }

    /// Seals the registry. Further registrations fail with
    /// [`Error::RegistrySealed`].
    pub fn seal(&self) {
        self.registry.seal();
    }

    pub fn is_sealed(&self) -> bool {
        self.registry.is_sealed()
    }

    /// Seals on first use.
    pub(crate) fn ensure_sealed(&self) {
        if !self.registry.is_sealed() {
            warn!("sealing type registry on first encode/decode");
            self.registry.seal();
        }
    }

    // =========================================================================
    // DESCRIPTORS
    // =========================================================================

    /// Returns the descriptor of `ty`.
    pub fn describe(&self, ty: &TypeDef) -> Result<Arc<TypeDescriptor>> {
        self.descriptors.describe(ty, &self.registry)
    }

    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.options.max_depth {
            return Err(Error::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        Ok(())
    }

    /// Returns the zero value of `ty`.
    pub fn zero_value(&self, ty: &TypeDef) -> Result<Value> {
        let desc = self.describe(ty)?;
        self.zero_of(&desc, 0)
    }

    pub(crate) fn zero_of(&self, desc: &TypeDescriptor, depth: usize) -> Result<Value> {
        self.check_depth(depth)?;
        Ok(match &desc.kind {
            Kind::Primitive(prim) => zero_primitive(*prim),
            Kind::ByteArray(len) => Value::Bytes(vec![0; *len]),
            Kind::ByteSlice => Value::Bytes(Vec::new()),
            Kind::Array { elem, len } => {
                let elem = self.describe(elem)?;
                let zero = self.zero_of(&elem, depth + 1)?;
                Value::List(vec![zero; *len])
            }
            Kind::Slice { .. } => Value::List(Vec::new()),
            Kind::Struct(fields) => {
                let mut sv = StructValue::new();
                for field in fields {
                    let fdesc = self.describe(&field.ty)?;
                    sv.set(field.name.clone(), self.zero_of(&fdesc, depth + 1)?);
                }
                Value::Struct(sv)
            }
            Kind::Interface => Value::Interface(None),
            Kind::Pointer(_) => Value::Pointer(None),
        })
    }

    /// Returns true when `value` is the zero value of its type.
    ///
    /// Values whose shape does not match the descriptor are never zero, so
    /// the encoder reports the mismatch.
    pub(crate) fn is_zero(&self, desc: &TypeDescriptor, value: &Value, depth: usize) -> Result<bool> {
        self.check_depth(depth)?;
        Ok(match (&desc.kind, value) {
            (Kind::Primitive(_), v) => is_zero_primitive(v),
            (Kind::ByteArray(_), Value::Bytes(b)) => b.iter().all(|x| *x == 0),
            (Kind::ByteSlice, Value::Bytes(b)) => b.is_empty(),
            (Kind::Array { elem, .. }, Value::List(items)) => {
                let elem = self.describe(elem)?;
                for item in items {
                    if !self.is_zero(&elem, item, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Kind::Slice { .. }, Value::List(items)) => items.is_empty(),
            (Kind::Struct(fields), Value::Struct(sv)) => {
                for field in fields {
                    if let Some(v) = sv.get(&field.name) {
                        let fdesc = self.describe(&field.ty)?;
                        if !self.is_zero(&fdesc, v, depth + 1)? {
                            return Ok(false);
                        }
                    }
                }
                true
            }
            (Kind::Interface, Value::Interface(c)) => c.is_none(),
            (Kind::Pointer(_), Value::Pointer(p)) => p.is_none(),
            _ => false,
        })
    }

    /// Follows pointer descriptors down to the pointee.
    pub(crate) fn strip_pointers(
        &self,
        desc: Arc<TypeDescriptor>,
    ) -> Result<(Arc<TypeDescriptor>, usize)> {
        let mut desc = desc;
        let mut depth = 0;
        while let Kind::Pointer(inner) = &desc.kind {
            desc = self.describe(inner)?;
            depth += 1;
            self.check_depth(depth)?;
        }
        Ok((desc, depth))
    }

    /// Returns the concrete entry of a named descriptor, if registered.
    pub(crate) fn concrete_entry(&self, desc: &TypeDescriptor) -> Option<Arc<ConcreteEntry>> {
        match (&desc.name, &desc.kind) {
            (Some(name), kind) if !matches!(kind, Kind::Interface) => {
                self.registry.concrete_by_type(name)
            }
            _ => None,
        }
    }

    /// Resolves the concrete type held by an interface value.
    pub(crate) fn interface_entry(
        &self,
        iface: &TypeDescriptor,
        type_name: &str,
    ) -> Result<Arc<ConcreteEntry>> {
        let entry = self.registry.concrete_by_type(type_name).ok_or_else(|| {
            Error::UnknownType(format!("{} is not a registered concrete type", type_name))
        })?;
        if let Some(iface_name) = iface.interface_name() {
            if !entry.implements(iface_name) {
                return Err(Error::UnknownType(format!(
                    "{} does not implement {}",
                    entry.name, iface_name
                )));
            }
        }
        Ok(entry)
    }

    // =========================================================================
    // TYPED HELPERS
    // =========================================================================

    /// Encodes a native value in the bare binary form.
    pub fn encode_binary<T: Amino>(&self, value: &T) -> Result<Vec<u8>> {
        self.marshal_binary_bare(&T::type_def(), &value.to_value())
    }

    /// Encodes a native value in the length-prefixed binary form.
    pub fn encode_binary_length_prefixed<T: Amino>(&self, value: &T) -> Result<Vec<u8>> {
        self.marshal_binary_length_prefixed(&T::type_def(), &value.to_value())
    }

    /// Decodes a native value from the bare binary form.
    pub fn decode_binary<T: Amino>(&self, bz: &[u8]) -> Result<T> {
        T::from_value(self.unmarshal_binary_bare(bz, &T::type_def())?)
    }

    /// Decodes a native value from the length-prefixed binary form.
    pub fn decode_binary_length_prefixed<T: Amino>(&self, bz: &[u8]) -> Result<T> {
        T::from_value(self.unmarshal_binary_length_prefixed(bz, &T::type_def())?)
    }

    /// Encodes a native value as JSON.
    pub fn encode_json<T: Amino>(&self, value: &T) -> Result<Vec<u8>> {
        self.marshal_json(&T::type_def(), &value.to_value())
    }

    /// Decodes a native value from JSON.
    pub fn decode_json<T: Amino>(&self, bz: &[u8]) -> Result<T> {
        T::from_value(self.unmarshal_json(bz, &T::type_def())?)
    }

    /// Decodes JSON into an existing native value.
    pub fn decode_json_into<T: Amino>(&self, bz: &[u8], dest: &mut T) -> Result<()> {
        let mut value = dest.to_value();
        self.unmarshal_json_into(bz, &T::type_def(), &mut value)?;
        *dest = T::from_value(value)?;
        Ok(())
    }
}

fn zero_primitive(prim: PrimitiveKind) -> Value {
    match prim {
        PrimitiveKind::Bool => Value::Bool(false),
        PrimitiveKind::Int8 => Value::Int8(0),
        PrimitiveKind::Int16 => Value::Int16(0),
        PrimitiveKind::Int32 => Value::Int32(0),
        PrimitiveKind::Int64 => Value::Int64(0),
        PrimitiveKind::Int => Value::Int(0),
        PrimitiveKind::Uint8 => Value::Uint8(0),
        PrimitiveKind::Uint16 => Value::Uint16(0),
        PrimitiveKind::Uint32 => Value::Uint32(0),
        PrimitiveKind::Uint64 => Value::Uint64(0),
        PrimitiveKind::Uint => Value::Uint(0),
        PrimitiveKind::Float32 => Value::Float32(0.0),
        PrimitiveKind::Float64 => Value::Float64(0.0),
        PrimitiveKind::String => Value::String(String::new()),
    }
}

fn is_zero_primitive(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Int8(v) => *v == 0,
        Value::Int16(v) => *v == 0,
        Value::Int32(v) => *v == 0,
        Value::Int64(v) | Value::Int(v) => *v == 0,
        Value::Uint8(v) => *v == 0,
        Value::Uint16(v) => *v == 0,
        Value::Uint32(v) => *v == 0,
        Value::Uint64(v) | Value::Uint(v) => *v == 0,
        Value::Float32(v) => *v == 0.0,
        Value::Float64(v) => *v == 0.0,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Returns a type-mismatch error for `value` against `desc`.
pub(crate) fn type_mismatch(desc: &TypeDescriptor, value: &Value) -> Error {
    Error::TypeMismatch {
        expected: desc.type_def.to_string(),
        found: value.kind_name(),
    }
}
