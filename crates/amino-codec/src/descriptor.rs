//! Type descriptors.
//!
//! A [`TypeDescriptor`] is the resolved, validated shape of a [`TypeDef`]:
//! its kind, struct field layout and hooks. Descriptors are built on first
//! use, cached for the life of the codec and never mutated.
//!
//! Element and field types are not described eagerly. The codecs describe
//! them as the traversal reaches them, which is what makes recursive types
//! through pointers and interfaces possible.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::hooks::{ReprCodec, WellKnownCodec};
use crate::model::{BinFixed, DeclBody, FieldDef, TypeDef};
use crate::registry::Registry;

/// Largest valid proto3 field number.
pub const MAX_FIELD_NUM: u32 = (1 << 29) - 1;

/// Longest chain of defined types followed before giving up.
const MAX_DEFINED_HOPS: usize = 32;

/// Scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint,
    Float32,
    Float64,
    String,
}

impl PrimitiveKind {
    fn from_type_def(ty: &TypeDef) -> Option<Self> {
        Some(match ty {
            TypeDef::Bool => PrimitiveKind::Bool,
            TypeDef::Int8 => PrimitiveKind::Int8,
            TypeDef::Int16 => PrimitiveKind::Int16,
            TypeDef::Int32 => PrimitiveKind::Int32,
            TypeDef::Int64 => PrimitiveKind::Int64,
            TypeDef::Int => PrimitiveKind::Int,
            TypeDef::Uint8 => PrimitiveKind::Uint8,
            TypeDef::Uint16 => PrimitiveKind::Uint16,
            TypeDef::Uint32 => PrimitiveKind::Uint32,
            TypeDef::Uint64 => PrimitiveKind::Uint64,
            TypeDef::Uint => PrimitiveKind::Uint,
            TypeDef::Float32 => PrimitiveKind::Float32,
            TypeDef::Float64 => PrimitiveKind::Float64,
            TypeDef::String => PrimitiveKind::String,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Int32 => "int32",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Uint8 => "uint8",
            PrimitiveKind::Uint16 => "uint16",
            PrimitiveKind::Uint32 => "uint32",
            PrimitiveKind::Uint64 => "uint64",
            PrimitiveKind::Uint => "uint",
            PrimitiveKind::Float32 => "float32",
            PrimitiveKind::Float64 => "float64",
            PrimitiveKind::String => "string",
        }
    }

    /// Integers carried as quoted strings in JSON.
    pub fn is_wide_int(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int64 | PrimitiveKind::Int | PrimitiveKind::Uint64 | PrimitiveKind::Uint
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveKind::Float32 | PrimitiveKind::Float64)
    }

    /// True when list elements of this kind are packed on the binary path.
    pub fn is_packable(&self) -> bool {
        !matches!(self, PrimitiveKind::String)
    }
}

/// Resolved kind of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Primitive(PrimitiveKind),
    /// `[len]byte`
    ByteArray(usize),
    /// `[]byte`
    ByteSlice,
    Array { elem: TypeDef, len: usize },
    Slice { elem: TypeDef },
    Struct(Vec<FieldDescriptor>),
    Interface,
    Pointer(TypeDef),
}

/// Resolved struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDef,
    pub bin_field_num: u32,
    pub json_name: String,
    pub omit_empty: bool,
    pub unsafe_: bool,
    pub bin_fixed: Option<BinFixed>,
    pub write_empty: bool,
}

/// Resolved, validated description of a type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub type_def: TypeDef,
    /// Declared name, for named types.
    pub name: Option<String>,
    pub kind: Kind,
    pub well_known: Option<Arc<dyn WellKnownCodec>>,
    pub repr: Option<Arc<dyn ReprCodec>>,
    pub repr_type: Option<TypeDef>,
}

impl TypeDescriptor {
    /// Struct fields in declaration order; empty for non-structs.
    pub fn fields(&self) -> &[FieldDescriptor] {
        match &self.kind {
            Kind::Struct(fields) => fields,
            _ => &[],
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, Kind::Struct(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, Kind::Interface)
    }

    /// Name of the interface this descriptor describes.
    pub fn interface_name(&self) -> Option<&str> {
        match self.kind {
            Kind::Interface => self.name.as_deref(),
            _ => None,
        }
    }
}

/// Thread-safe cache of descriptors keyed by type expression.
#[derive(Debug, Default)]
pub struct DescriptorStore {
    cache: RwLock<FxHashMap<TypeDef, Arc<TypeDescriptor>>>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `ty`, building it on first use.
    ///
    /// Failed builds are not cached.
    pub fn describe(&self, ty: &TypeDef, registry: &Registry) -> Result<Arc<TypeDescriptor>> {
        if let Some(desc) = self.cache.read().get(ty) {
            return Ok(desc.clone());
        }
        let mut cache = self.cache.write();
        if let Some(desc) = cache.get(ty) {
            return Ok(desc.clone());
        }
        let desc = Arc::new(build_descriptor(ty, registry)?);
        cache.insert(ty.clone(), desc.clone());
        Ok(desc)
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

fn build_descriptor(ty: &TypeDef, registry: &Registry) -> Result<TypeDescriptor> {
    if let TypeDef::Named(name) = ty {
        let decl = registry
            .decl(name)
            .ok_or_else(|| Error::UnknownType(format!("type {} is not declared", name)))?;
        let kind = match &decl.body {
            DeclBody::Struct(fields) => Kind::Struct(build_fields(name, fields, registry)?),
            DeclBody::Interface => Kind::Interface,
            DeclBody::Defined(underlying) => build_kind(underlying, registry, 1)?,
        };
        let repr_type = decl.repr.as_ref().map(|r| r.repr_type());
        if let Some(repr_type) = &repr_type {
            check_type_expr(repr_type, registry)?;
        }
        return Ok(TypeDescriptor {
            type_def: ty.clone(),
            name: Some(name.clone()),
            kind,
            well_known: decl.well_known.clone(),
            repr: decl.repr.clone(),
            repr_type,
        });
    }

    Ok(TypeDescriptor {
        type_def: ty.clone(),
        name: None,
        kind: build_kind(ty, registry, 0)?,
        well_known: None,
        repr: None,
        repr_type: None,
    })
}

/// Kind of `ty`, following defined types. Hooks are not inherited.
fn build_kind(ty: &TypeDef, registry: &Registry, hops: usize) -> Result<Kind> {
    if let Some(prim) = PrimitiveKind::from_type_def(ty) {
        return Ok(Kind::Primitive(prim));
    }
    match ty {
        TypeDef::Array(elem, len) => {
            check_list_elem(ty, elem, registry)?;
            if elem.is_byte() {
                Ok(Kind::ByteArray(*len))
            } else {
                Ok(Kind::Array {
                    elem: (**elem).clone(),
                    len: *len,
                })
            }
        }
        TypeDef::Slice(elem) => {
            check_list_elem(ty, elem, registry)?;
            if elem.is_byte() {
                Ok(Kind::ByteSlice)
            } else {
                Ok(Kind::Slice {
                    elem: (**elem).clone(),
                })
            }
        }
        TypeDef::Pointer(elem) => {
            check_type_expr(elem, registry)?;
            Ok(Kind::Pointer((**elem).clone()))
        }
        TypeDef::Named(name) => {
            if hops > MAX_DEFINED_HOPS {
                return Err(Error::unsupported(name, "cyclic type definition"));
            }
            let decl = registry
                .decl(name)
                .ok_or_else(|| Error::UnknownType(format!("type {} is not declared", name)))?;
            match &decl.body {
                DeclBody::Struct(fields) => Ok(Kind::Struct(build_fields(name, fields, registry)?)),
                DeclBody::Interface => Ok(Kind::Interface),
                DeclBody::Defined(underlying) => build_kind(underlying, registry, hops + 1),
            }
        }
        TypeDef::Map(..) | TypeDef::Func | TypeDef::Chan(_) => {
            Err(Error::unsupported(ty, "type has no wire representation"))
        }
        _ => Err(Error::unsupported(ty, "unrecognized primitive")),
    }
}

/// Validates a type expression without describing named types.
fn check_type_expr(ty: &TypeDef, registry: &Registry) -> Result<()> {
    match ty {
        TypeDef::Array(elem, _) | TypeDef::Slice(elem) => {
            check_list_elem(ty, elem, registry)?;
            check_type_expr(elem, registry)
        }
        TypeDef::Pointer(elem) => check_type_expr(elem, registry),
        TypeDef::Named(name) => {
            if registry.decl(name).is_none() {
                return Err(Error::UnknownType(format!("type {} is not declared", name)));
            }
            Ok(())
        }
        TypeDef::Map(..) | TypeDef::Func | TypeDef::Chan(_) => {
            Err(Error::unsupported(ty, "type has no wire representation"))
        }
        _ => Ok(()),
    }
}

/// Lists of lists are only encodable when the inner list holds bytes.
fn check_list_elem(list: &TypeDef, elem: &TypeDef, registry: &Registry) -> Result<()> {
    // Pointers add no wire framing, so `[]*[]T` nests like `[][]T`.
    let mut inner = underlying_shape(elem, registry)?;
    while let TypeDef::Pointer(pointee) = inner {
        inner = underlying_shape(&pointee, registry)?;
    }
    match &inner {
        TypeDef::Array(inner_elem, _) | TypeDef::Slice(inner_elem) if !inner_elem.is_byte() => {
            Err(Error::unsupported(list, "nested lists are only supported for byte lists"))
        }
        TypeDef::Map(..) | TypeDef::Func | TypeDef::Chan(_) => {
            Err(Error::unsupported(list, "element type has no wire representation"))
        }
        _ => Ok(()),
    }
}

/// Follows defined types down to the first non-defined type expression.
fn underlying_shape(ty: &TypeDef, registry: &Registry) -> Result<TypeDef> {
    let mut current = ty.clone();
    for _ in 0..=MAX_DEFINED_HOPS {
        let TypeDef::Named(name) = &current else {
            return Ok(current);
        };
        let decl = registry
            .decl(name)
            .ok_or_else(|| Error::UnknownType(format!("type {} is not declared", name)))?;
        match &decl.body {
            DeclBody::Defined(underlying) => current = underlying.clone(),
            _ => return Ok(current),
        }
    }
    Err(Error::unsupported(ty, "cyclic type definition"))
}

fn build_fields(
    struct_name: &str,
    fields: &[FieldDef],
    registry: &Registry,
) -> Result<Vec<FieldDescriptor>> {
    let mut out: Vec<FieldDescriptor> = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        check_type_expr(&field.ty, registry)?;

        let bin_field_num = match field.options.bin_field_num {
            Some(num) => num,
            None => u32::try_from(index + 1)
                .map_err(|_| Error::unsupported(struct_name, "too many fields"))?,
        };
        if bin_field_num == 0 || bin_field_num > MAX_FIELD_NUM {
            return Err(Error::unsupported(
                struct_name,
                format!("field {} has invalid binary field number {}", field.name, bin_field_num),
            ));
        }
        let json_name = field
            .options
            .json_name
            .clone()
            .unwrap_or_else(|| field.name.clone());

        if let Some(prev) = out.last() {
            if bin_field_num <= prev.bin_field_num {
                return Err(Error::unsupported(
                    struct_name,
                    format!(
                        "field {} number {} must be greater than {}",
                        field.name, bin_field_num, prev.bin_field_num
                    ),
                ));
            }
        }
        if out.iter().any(|f| f.name == field.name) {
            return Err(Error::unsupported(
                struct_name,
                format!("duplicate field name {}", field.name),
            ));
        }
        if out.iter().any(|f| f.json_name == json_name) {
            return Err(Error::unsupported(
                struct_name,
                format!("duplicate JSON name {}", json_name),
            ));
        }
        if let Some(fixed) = field.options.bin_fixed {
            check_fixed(struct_name, field, fixed, registry)?;
        }

        out.push(FieldDescriptor {
            name: field.name.clone(),
            ty: field.ty.clone(),
            bin_field_num,
            json_name,
            omit_empty: field.options.omit_empty,
            unsafe_: field.options.unsafe_,
            bin_fixed: field.options.bin_fixed,
            write_empty: field.options.write_empty,
        });
    }
    Ok(out)
}

/// Fixed-width encoding applies to integers of matching width, possibly
/// behind pointers or inside lists.
fn check_fixed(
    struct_name: &str,
    field: &FieldDef,
    fixed: BinFixed,
    registry: &Registry,
) -> Result<()> {
    let mut ty = underlying_shape(&field.ty, registry)?;
    loop {
        match ty {
            TypeDef::Pointer(elem) | TypeDef::Slice(elem) | TypeDef::Array(elem, _) => {
                ty = underlying_shape(&elem, registry)?;
            }
            _ => break,
        }
    }
    let ok = match fixed {
        BinFixed::Fixed32 => matches!(ty, TypeDef::Int32 | TypeDef::Uint32),
        BinFixed::Fixed64 => {
            matches!(ty, TypeDef::Int64 | TypeDef::Uint64 | TypeDef::Int | TypeDef::Uint)
        }
    };
    if !ok {
        return Err(Error::unsupported(
            struct_name,
            format!("field {} of type {} cannot be {:?}", field.name, field.ty, fixed),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldOptions, TypeDecl};

    fn registry_with(decls: Vec<TypeDecl>) -> Registry {
        let reg = Registry::new();
        for decl in decls {
            reg.declare(decl).unwrap();
        }
        reg
    }

    #[test]
    fn test_describe_primitives_and_bytes() {
        let reg = Registry::new();
        let store = DescriptorStore::new();
        assert_eq!(
            store.describe(&TypeDef::Int32, &reg).unwrap().kind,
            Kind::Primitive(PrimitiveKind::Int32)
        );
        assert_eq!(store.describe(&TypeDef::bytes(), &reg).unwrap().kind, Kind::ByteSlice);
        assert_eq!(
            store.describe(&TypeDef::byte_array(32), &reg).unwrap().kind,
            Kind::ByteArray(32)
        );
        assert_eq!(
            store.describe(&TypeDef::slice(TypeDef::bytes()), &reg).unwrap().kind,
            Kind::Slice { elem: TypeDef::bytes() }
        );
    }

    #[test]
    fn test_describe_is_cached() {
        let reg = Registry::new();
        let store = DescriptorStore::new();
        let a = store.describe(&TypeDef::String, &reg).unwrap();
        let b = store.describe(&TypeDef::String, &reg).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unsupported_kinds() {
        let reg = Registry::new();
        let store = DescriptorStore::new();
        let map = TypeDef::Map(Box::new(TypeDef::String), Box::new(TypeDef::Int));
        assert!(matches!(
            store.describe(&map, &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.describe(&TypeDef::Func, &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.describe(&TypeDef::slice(TypeDef::Chan(Box::new(TypeDef::Int))), &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_nested_lists_rejected() {
        let reg = registry_with(vec![TypeDecl::defined("Ints", TypeDef::slice(TypeDef::Int64))]);
        let store = DescriptorStore::new();
        assert!(matches!(
            store.describe(&TypeDef::slice(TypeDef::slice(TypeDef::Int64)), &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.describe(&TypeDef::array(TypeDef::named("Ints"), 2), &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.describe(
                &TypeDef::slice(TypeDef::pointer(TypeDef::slice(TypeDef::Int32))),
                &reg
            ),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.describe(&TypeDef::slice(TypeDef::pointer(TypeDef::named("Ints"))), &reg),
            Err(Error::UnsupportedType { .. })
        ));
        assert!(store
            .describe(&TypeDef::array(TypeDef::byte_array(4), 2), &reg)
            .is_ok());
        assert!(store
            .describe(&TypeDef::slice(TypeDef::pointer(TypeDef::bytes())), &reg)
            .is_ok());
    }

    #[test]
    fn test_unknown_named_type() {
        let reg = Registry::new();
        let store = DescriptorStore::new();
        assert!(matches!(
            store.describe(&TypeDef::named("Missing"), &reg),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_struct_layout() {
        let reg = registry_with(vec![TypeDecl::new_struct("Msg")
            .field("A", TypeDef::Int64)
            .field_with("B", TypeDef::String, FieldOptions::new().json_name("b"))
            .field_with("C", TypeDef::Bool, FieldOptions::new().bin_field_num(9))]);
        let store = DescriptorStore::new();
        let desc = store.describe(&TypeDef::named("Msg"), &reg).unwrap();
        let fields = desc.fields();
        assert_eq!(
            fields.iter().map(|f| f.bin_field_num).collect::<Vec<_>>(),
            vec![1, 2, 9]
        );
        assert_eq!(fields[0].json_name, "A");
        assert_eq!(fields[1].json_name, "b");
        assert_eq!(desc.name.as_deref(), Some("Msg"));
    }

    #[test]
    fn test_field_numbers_must_increase() {
        let reg = registry_with(vec![TypeDecl::new_struct("Msg")
            .field_with("A", TypeDef::Int64, FieldOptions::new().bin_field_num(5))
            .field("B", TypeDef::Int64)]);
        let store = DescriptorStore::new();
        // B defaults to 2, which is not greater than 5.
        assert!(matches!(
            store.describe(&TypeDef::named("Msg"), &reg),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_duplicate_json_name() {
        let reg = registry_with(vec![TypeDecl::new_struct("Msg")
            .field_with("A", TypeDef::Int64, FieldOptions::new().json_name("x"))
            .field_with("B", TypeDef::Int64, FieldOptions::new().json_name("x"))]);
        let store = DescriptorStore::new();
        assert!(matches!(
            store.describe(&TypeDef::named("Msg"), &reg),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_fixed_requires_matching_width() {
        let reg = registry_with(vec![
            TypeDecl::new_struct("Ok")
                .field_with("A", TypeDef::Int32, FieldOptions::new().fixed32())
                .field_with("B", TypeDef::slice(TypeDef::Uint64), FieldOptions::new().fixed64()),
            TypeDecl::new_struct("Bad").field_with("A", TypeDef::Int8, FieldOptions::new().fixed32()),
        ]);
        let store = DescriptorStore::new();
        assert!(store.describe(&TypeDef::named("Ok"), &reg).is_ok());
        assert!(matches!(
            store.describe(&TypeDef::named("Bad"), &reg),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_defined_type_copies_kind() {
        let reg = registry_with(vec![
            TypeDecl::defined("Height", TypeDef::Int64),
            TypeDecl::defined("Alias", TypeDef::named("Height")),
        ]);
        let store = DescriptorStore::new();
        let desc = store.describe(&TypeDef::named("Alias"), &reg).unwrap();
        assert_eq!(desc.kind, Kind::Primitive(PrimitiveKind::Int64));
        assert!(desc.repr.is_none());
    }

    #[test]
    fn test_cyclic_definition_rejected() {
        let reg = registry_with(vec![
            TypeDecl::defined("A", TypeDef::named("B")),
            TypeDecl::defined("B", TypeDef::named("A")),
        ]);
        let store = DescriptorStore::new();
        assert!(matches!(
            store.describe(&TypeDef::named("A"), &reg),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_recursive_struct_through_pointer() {
        let reg = registry_with(vec![TypeDecl::new_struct("Node")
            .field("Value", TypeDef::Int32)
            .field("Next", TypeDef::pointer(TypeDef::named("Node")))]);
        let store = DescriptorStore::new();
        let desc = store.describe(&TypeDef::named("Node"), &reg).unwrap();
        assert_eq!(desc.fields()[1].ty, TypeDef::pointer(TypeDef::named("Node")));
    }
}
