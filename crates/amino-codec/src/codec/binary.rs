//! Binary codec.
//!
//! The wire format is proto3-compatible:
//!
//! - Structs are messages. Fields are written in declaration order as
//!   `(num << 3) | wire_type` keys followed by their payload; zero values are
//!   omitted unless the field is `write_empty`.
//! - Integers are varints (two's complement, sign-extended to 64 bits, no
//!   zig-zag) or little-endian fixed32/fixed64 when the field asks for it.
//!   Floats are always fixed-width and require the `unsafe` field option.
//! - Lists of numbers are packed; the decoder also accepts them unpacked.
//!   Lists of length-delimited values repeat the field key per element.
//! - An interface value is a length-delimited body made of the concrete
//!   type's identity followed by the concrete value's bare encoding.
//! - A non-struct value standing alone (at top level or as an interface's
//!   concrete value) is encoded as field 1 of an implicit struct.

use std::borrow::Cow;
use std::sync::Arc;

use log::trace;

use crate::codec::primitives::{Reader, WireType, Writer};
use crate::codec::{type_mismatch, Codec, LeafOptions};
use crate::descriptor::{FieldDescriptor, Kind, PrimitiveKind, TypeDescriptor};
use crate::error::{Error, Result};
use crate::model::{BinFixed, StructValue, TypeDef, Value};
use crate::registry::WireIdentity;

/// Name of the single field of the implicit struct.
const IMPLICIT_FIELD: &str = "Value";

impl Codec {
    /// Encodes `value` as `ty` without a length prefix.
    ///
    /// A registered concrete type is preceded by its 4-byte prefix. A nil
    /// pointer encodes to no bytes.
    pub fn marshal_binary_bare(&self, ty: &TypeDef, value: &Value) -> Result<Vec<u8>> {
        self.ensure_sealed();
        Encoder { codec: self }.top(ty, value)
    }

    /// Encodes `value` as `ty`, preceded by the byte length as a varint.
    pub fn marshal_binary_length_prefixed(&self, ty: &TypeDef, value: &Value) -> Result<Vec<u8>> {
        let bare = self.marshal_binary_bare(ty, value)?;
        let mut writer = Writer::with_capacity(bare.len() + 4);
        writer.write_bytes_prefixed(&bare);
        Ok(writer.into_bytes())
    }

    /// Decodes a bare encoding of `ty`. The whole input must be consumed.
    pub fn unmarshal_binary_bare(&self, bz: &[u8], ty: &TypeDef) -> Result<Value> {
        self.ensure_sealed();
        Decoder { codec: self }.top(bz, ty)
    }

    /// Decodes a length-prefixed encoding of `ty`. The prefix must cover
    /// exactly the rest of the input.
    pub fn unmarshal_binary_length_prefixed(&self, bz: &[u8], ty: &TypeDef) -> Result<Value> {
        let mut reader = Reader::new(bz);
        let len = reader.read_varint("length prefix")?;
        let actual = reader.remaining_len();
        if len != actual as u64 {
            return Err(Error::LengthMismatch {
                expected: usize::try_from(len).unwrap_or(usize::MAX),
                actual,
            });
        }
        self.unmarshal_binary_bare(reader.remaining(), ty)
    }
}

fn implicit_field(ty: TypeDef, write_empty: bool) -> FieldDescriptor {
    FieldDescriptor {
        name: IMPLICIT_FIELD.to_string(),
        ty,
        bin_field_num: 1,
        json_name: IMPLICIT_FIELD.to_string(),
        omit_empty: false,
        unsafe_: false,
        bin_fixed: None,
        write_empty,
    }
}

fn wrap_pointers(mut value: Value, depth: usize) -> Value {
    for _ in 0..depth {
        value = Value::pointer(value);
    }
    value
}

/// Element type of a list descriptor without hooks.
fn plain_list_elem(desc: &TypeDescriptor) -> Option<&TypeDef> {
    if desc.well_known.is_some() || desc.repr.is_some() {
        return None;
    }
    match &desc.kind {
        Kind::Array { elem, .. } | Kind::Slice { elem } => Some(elem),
        _ => None,
    }
}

fn leaf_wire_type(prim: PrimitiveKind, leaf: LeafOptions) -> WireType {
    match (prim, leaf.fixed) {
        (PrimitiveKind::Float32, _) => WireType::Fixed32,
        (PrimitiveKind::Float64, _) => WireType::Fixed64,
        (PrimitiveKind::String, _) => WireType::ByteLength,
        (PrimitiveKind::Int32 | PrimitiveKind::Uint32, Some(BinFixed::Fixed32)) => WireType::Fixed32,
        (
            PrimitiveKind::Int64 | PrimitiveKind::Int | PrimitiveKind::Uint64 | PrimitiveKind::Uint,
            Some(BinFixed::Fixed64),
        ) => WireType::Fixed64,
        _ => WireType::Varint,
    }
}

fn check_unsafe(prim: PrimitiveKind, leaf: LeafOptions) -> Result<()> {
    if prim.is_float() && !leaf.unsafe_ {
        return Err(Error::UnsafeType { ty: prim.name() });
    }
    Ok(())
}

// =============================================================================
// ENCODING
// =============================================================================

/// One encoded value before a field key is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Unit {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Delimited(Vec<u8>),
}

impl Unit {
    fn wire_type(&self) -> WireType {
        match self {
            Unit::Varint(_) => WireType::Varint,
            Unit::Fixed32(_) => WireType::Fixed32,
            Unit::Fixed64(_) => WireType::Fixed64,
            Unit::Delimited(_) => WireType::ByteLength,
        }
    }

    fn is_numeric(&self) -> bool {
        !matches!(self, Unit::Delimited(_))
    }

    fn write_to(&self, writer: &mut Writer) {
        match self {
            Unit::Varint(v) => writer.write_varint(*v),
            Unit::Fixed32(v) => writer.write_fixed32(*v),
            Unit::Fixed64(v) => writer.write_fixed64(*v),
            Unit::Delimited(bz) => writer.write_bytes_prefixed(bz),
        }
    }
}

/// A value after custom hooks have been applied.
enum Lowered<'v> {
    /// Bare body produced by a well-known hook.
    Body(Vec<u8>),
    Value(Arc<TypeDescriptor>, Cow<'v, Value>),
}

struct Encoder<'c> {
    codec: &'c Codec,
}

impl Encoder<'_> {
    fn top(&self, ty: &TypeDef, value: &Value) -> Result<Vec<u8>> {
        let mut desc = self.codec.describe(ty)?;
        let mut value = value;
        let mut via_pointer = false;
        loop {
            let inner = match &desc.kind {
                Kind::Pointer(inner) => inner.clone(),
                _ => break,
            };
            match value {
                Value::Pointer(None) => return Ok(Vec::new()),
                Value::Pointer(Some(v)) => value = &**v,
                other => return Err(type_mismatch(&desc, other)),
            }
            desc = self.codec.describe(&inner)?;
            via_pointer = true;
        }

        let mut writer = Writer::new();
        if let Some(entry) = self.codec.concrete_entry(&desc) {
            writer.write_bytes(entry.identity.prefix_bytes());
        }
        if desc.is_interface() {
            self.interface_body(&mut writer, &desc, value, 0)?;
        } else {
            self.concrete_body(&mut writer, desc, value, via_pointer, 0)?;
        }
        Ok(writer.into_bytes())
    }

    /// Applies well-known and repr hooks until a plain descriptor remains.
    fn lower<'v>(
        &self,
        desc: Arc<TypeDescriptor>,
        value: Cow<'v, Value>,
        depth: usize,
    ) -> Result<Lowered<'v>> {
        let mut desc = desc;
        let mut value = value;
        let mut hops = 0;
        loop {
            if let Some(well_known) = &desc.well_known {
                if let Some(bz) = well_known.encode_binary(&value)? {
                    return Ok(Lowered::Body(bz));
                }
            }
            let (Some(repr), Some(repr_type)) = (desc.repr.clone(), desc.repr_type.clone()) else {
                return Ok(Lowered::Value(desc, value));
            };
            value = Cow::Owned(repr.marshal_repr(&value)?);
            desc = self.codec.describe(&repr_type)?;
            hops += 1;
            self.codec.check_depth(depth + hops)?;
        }
    }

    /// Bare encoding of a value standing on its own.
    fn concrete_body(
        &self,
        writer: &mut Writer,
        desc: Arc<TypeDescriptor>,
        value: &Value,
        write_empty: bool,
        depth: usize,
    ) -> Result<()> {
        self.codec.check_depth(depth)?;
        let (desc, value) = match self.lower(desc, Cow::Borrowed(value), depth)? {
            Lowered::Body(bz) => {
                writer.write_bytes(&bz);
                return Ok(());
            }
            Lowered::Value(desc, value) => (desc, value),
        };
        match &desc.kind {
            Kind::Struct(_) => self.struct_body(writer, &desc, &value, depth),
            Kind::Interface => self.interface_body(writer, &desc, &value, depth),
            _ => {
                let field = implicit_field(desc.type_def.clone(), write_empty);
                self.encode_field(writer, &field, Some(&*value), depth + 1)
            }
        }
    }

    fn struct_body(
        &self,
        writer: &mut Writer,
        desc: &TypeDescriptor,
        value: &Value,
        depth: usize,
    ) -> Result<()> {
        let Value::Struct(sv) = value else {
            return Err(type_mismatch(desc, value));
        };
        for field in desc.fields() {
            self.encode_field(writer, field, sv.get(&field.name), depth + 1)?;
        }
        Ok(())
    }

    fn interface_body(
        &self,
        writer: &mut Writer,
        desc: &TypeDescriptor,
        value: &Value,
        depth: usize,
    ) -> Result<()> {
        let concrete = match value {
            Value::Interface(None) => return Ok(()),
            Value::Interface(Some(concrete)) => concrete,
            other => return Err(type_mismatch(desc, other)),
        };
        let entry = self.codec.interface_entry(desc, &concrete.type_name)?;
        let disambiguate = desc
            .interface_name()
            .is_some_and(|iface| self.codec.registry().needs_disambiguation(iface, &entry));
        if disambiguate {
            writer.write_bytes(&entry.identity.disfix_bytes());
        } else {
            writer.write_bytes(entry.identity.prefix_bytes());
        }
        let cdesc = self.codec.describe(&TypeDef::named(concrete.type_name.as_str()))?;
        self.concrete_body(writer, cdesc, &concrete.value, false, depth + 1)
    }

    /// Writes one struct field. `None` stands for a field absent from the
    /// struct value, which holds the zero value.
    fn encode_field(
        &self,
        writer: &mut Writer,
        field: &FieldDescriptor,
        value: Option<&Value>,
        depth: usize,
    ) -> Result<()> {
        self.codec.check_depth(depth)?;
        let mut desc = self.codec.describe(&field.ty)?;
        let zero;
        let mut value = match value {
            Some(v) => v,
            None if field.write_empty => {
                zero = self.codec.zero_of(&desc, depth)?;
                &zero
            }
            None => return Ok(()),
        };

        // A non-nil pointer is written even when it points at a zero value.
        let mut present = field.write_empty;
        loop {
            let inner = match &desc.kind {
                Kind::Pointer(inner) => inner.clone(),
                _ => break,
            };
            match value {
                Value::Pointer(None) => return Ok(()),
                Value::Pointer(Some(v)) => value = &**v,
                other => return Err(type_mismatch(&desc, other)),
            }
            desc = self.codec.describe(&inner)?;
            present = true;
        }
        if !present && self.codec.is_zero(&desc, value, depth)? {
            return Ok(());
        }

        let leaf = LeafOptions::from(field);
        if let Some(elem) = plain_list_elem(&desc) {
            let Value::List(items) = value else {
                return Err(type_mismatch(&desc, value));
            };
            if let Kind::Array { len, .. } = &desc.kind {
                if items.len() != *len {
                    return Err(Error::LengthMismatch {
                        expected: *len,
                        actual: items.len(),
                    });
                }
            }
            return self.repeated(writer, field.bin_field_num, elem, items, leaf, depth);
        }

        let unit = self.unit(desc, value, leaf, depth + 1)?;
        writer.write_field_key(field.bin_field_num, unit.wire_type());
        unit.write_to(writer);
        Ok(())
    }

    fn repeated(
        &self,
        writer: &mut Writer,
        num: u32,
        elem: &TypeDef,
        items: &[Value],
        leaf: LeafOptions,
        depth: usize,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let (pointee, ptr_depth) = self.codec.strip_pointers(self.codec.describe(elem)?)?;
        let mut units = Vec::with_capacity(items.len());
        for item in items {
            // Nil elements are written as the pointee's zero value.
            let unit = match deref_pointers(item, ptr_depth, &pointee)? {
                Some(v) => self.unit(pointee.clone(), v, leaf, depth + 1)?,
                None => {
                    let zero = self.codec.zero_of(&pointee, depth + 1)?;
                    self.unit(pointee.clone(), &zero, leaf, depth + 1)?
                }
            };
            units.push(unit);
        }

        if units.iter().all(Unit::is_numeric) {
            let mut packed = Writer::with_capacity(units.len() * 2);
            for unit in &units {
                unit.write_to(&mut packed);
            }
            writer.write_field_key(num, WireType::ByteLength);
            writer.write_bytes_prefixed(packed.as_bytes());
        } else {
            for unit in &units {
                writer.write_field_key(num, unit.wire_type());
                unit.write_to(writer);
            }
        }
        Ok(())
    }

    /// Encodes a single field payload.
    fn unit(
        &self,
        desc: Arc<TypeDescriptor>,
        value: &Value,
        leaf: LeafOptions,
        depth: usize,
    ) -> Result<Unit> {
        self.codec.check_depth(depth)?;
        let (desc, value) = match self.lower(desc, Cow::Borrowed(value), depth)? {
            Lowered::Body(bz) => return Ok(Unit::Delimited(bz)),
            Lowered::Value(desc, value) => (desc, value),
        };
        let value: &Value = &value;
        Ok(match &desc.kind {
            Kind::Primitive(prim) => primitive_unit(&desc, *prim, value, leaf)?,
            Kind::ByteArray(len) => match value {
                Value::Bytes(bz) if bz.len() == *len => Unit::Delimited(bz.clone()),
                Value::Bytes(bz) => {
                    return Err(Error::LengthMismatch {
                        expected: *len,
                        actual: bz.len(),
                    });
                }
                other => return Err(type_mismatch(&desc, other)),
            },
            Kind::ByteSlice => match value {
                Value::Bytes(bz) => Unit::Delimited(bz.clone()),
                other => return Err(type_mismatch(&desc, other)),
            },
            Kind::Struct(_) => {
                let mut body = Writer::new();
                self.struct_body(&mut body, &desc, value, depth)?;
                Unit::Delimited(body.into_bytes())
            }
            Kind::Interface => {
                let mut body = Writer::new();
                self.interface_body(&mut body, &desc, value, depth)?;
                Unit::Delimited(body.into_bytes())
            }
            Kind::Pointer(inner) => {
                let inner = self.codec.describe(inner)?;
                match value {
                    Value::Pointer(Some(v)) => self.unit(inner, v, leaf, depth + 1)?,
                    Value::Pointer(None) => {
                        let zero = self.codec.zero_of(&inner, depth + 1)?;
                        self.unit(inner, &zero, leaf, depth + 1)?
                    }
                    other => return Err(type_mismatch(&desc, other)),
                }
            }
            Kind::Array { .. } | Kind::Slice { .. } => {
                let mut body = Writer::new();
                let field = implicit_field(desc.type_def.clone(), false);
                self.encode_field(&mut body, &field, Some(value), depth + 1)?;
                Unit::Delimited(body.into_bytes())
            }
        })
    }
}

/// Follows `count` pointer layers of `value`. Returns `None` at a nil pointer.
fn deref_pointers<'v>(
    value: &'v Value,
    count: usize,
    desc: &TypeDescriptor,
) -> Result<Option<&'v Value>> {
    let mut value = value;
    for _ in 0..count {
        match value {
            Value::Pointer(Some(v)) => value = &**v,
            Value::Pointer(None) => return Ok(None),
            other => {
                return Err(Error::TypeMismatch {
                    expected: format!("*{}", desc.type_def),
                    found: other.kind_name(),
                });
            }
        }
    }
    Ok(Some(value))
}

fn primitive_unit(
    desc: &TypeDescriptor,
    prim: PrimitiveKind,
    value: &Value,
    leaf: LeafOptions,
) -> Result<Unit> {
    check_unsafe(prim, leaf)?;
    let fixed = leaf_wire_type(prim, leaf);
    Ok(match (prim, value) {
        (PrimitiveKind::Bool, Value::Bool(b)) => Unit::Varint(u64::from(*b)),
        (PrimitiveKind::Int8, Value::Int8(v)) => Unit::Varint(i64::from(*v) as u64),
        (PrimitiveKind::Int16, Value::Int16(v)) => Unit::Varint(i64::from(*v) as u64),
        (PrimitiveKind::Int32, Value::Int32(v)) => match fixed {
            WireType::Fixed32 => Unit::Fixed32(*v as u32),
            _ => Unit::Varint(i64::from(*v) as u64),
        },
        (PrimitiveKind::Int64, Value::Int64(v)) | (PrimitiveKind::Int, Value::Int(v)) => {
            match fixed {
                WireType::Fixed64 => Unit::Fixed64(*v as u64),
                _ => Unit::Varint(*v as u64),
            }
        }
        (PrimitiveKind::Uint8, Value::Uint8(v)) => Unit::Varint(u64::from(*v)),
        (PrimitiveKind::Uint16, Value::Uint16(v)) => Unit::Varint(u64::from(*v)),
        (PrimitiveKind::Uint32, Value::Uint32(v)) => match fixed {
            WireType::Fixed32 => Unit::Fixed32(*v),
            _ => Unit::Varint(u64::from(*v)),
        },
        (PrimitiveKind::Uint64, Value::Uint64(v)) | (PrimitiveKind::Uint, Value::Uint(v)) => {
            match fixed {
                WireType::Fixed64 => Unit::Fixed64(*v),
                _ => Unit::Varint(*v),
            }
        }
        (PrimitiveKind::Float32, Value::Float32(v)) => Unit::Fixed32(v.to_bits()),
        (PrimitiveKind::Float64, Value::Float64(v)) => Unit::Fixed64(v.to_bits()),
        (PrimitiveKind::String, Value::String(s)) => Unit::Delimited(s.as_bytes().to_vec()),
        (_, other) => return Err(type_mismatch(desc, other)),
    })
}

// =============================================================================
// DECODING
// =============================================================================

/// Field payload as read off the wire.
#[derive(Debug, Clone, Copy)]
enum Raw<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(&'a [u8]),
}

impl Raw<'_> {
    fn wire_type(&self) -> WireType {
        match self {
            Raw::Varint(_) => WireType::Varint,
            Raw::Fixed32(_) => WireType::Fixed32,
            Raw::Fixed64(_) => WireType::Fixed64,
            Raw::Bytes(_) => WireType::ByteLength,
        }
    }
}

fn read_raw<'a>(reader: &mut Reader<'a>, wire_type: WireType, max_len: usize) -> Result<Raw<'a>> {
    Ok(match wire_type {
        WireType::Varint => Raw::Varint(reader.read_varint("field varint")?),
        WireType::Fixed32 => Raw::Fixed32(reader.read_fixed32("field fixed32")?),
        WireType::Fixed64 => Raw::Fixed64(reader.read_fixed64("field fixed64")?),
        WireType::ByteLength => Raw::Bytes(reader.read_bytes_prefixed(max_len, "field bytes")?),
    })
}

fn expect_bytes<'a>(raw: Raw<'a>, desc: &TypeDescriptor) -> Result<&'a [u8]> {
    match raw {
        Raw::Bytes(bz) => Ok(bz),
        other => Err(Error::invalid(format!(
            "wire type {:?} cannot hold {}",
            other.wire_type(),
            desc.type_def
        ))),
    }
}

fn overflow(ty: &'static str, value: impl std::fmt::Display) -> Error {
    Error::Overflow {
        ty,
        value: value.to_string(),
    }
}

struct Decoder<'c> {
    codec: &'c Codec,
}

impl Decoder<'_> {
    fn top(&self, bz: &[u8], ty: &TypeDef) -> Result<Value> {
        let (desc, ptr_depth) = self.codec.strip_pointers(self.codec.describe(ty)?)?;
        if ptr_depth > 0 && bz.is_empty() {
            return Ok(Value::Pointer(None));
        }

        let mut body = bz;
        if let Some(entry) = self.codec.concrete_entry(&desc) {
            let (wire, n) = WireIdentity::parse(bz)?;
            let disamb_ok = wire.disamb.is_none_or(|d| d == entry.identity.disamb);
            if wire.prefix != entry.identity.prefix || !disamb_ok {
                return Err(Error::UnknownType(format!(
                    "expected prefix {:02X?} of {}, got {:02X?}",
                    entry.identity.prefix, entry.name, wire.prefix
                )));
            }
            body = &bz[n..];
        }

        let value = if desc.is_interface() {
            self.interface_body(&desc, body, 0)?
        } else {
            self.concrete_body(&desc, body, 0)?
        };
        Ok(wrap_pointers(value, ptr_depth))
    }

    fn concrete_body(&self, desc: &TypeDescriptor, bz: &[u8], depth: usize) -> Result<Value> {
        self.codec.check_depth(depth)?;
        if let Some(well_known) = &desc.well_known {
            if let Some(value) = well_known.decode_binary(bz)? {
                return Ok(value);
            }
        }
        if let (Some(repr), Some(repr_type)) = (&desc.repr, &desc.repr_type) {
            let rdesc = self.codec.describe(repr_type)?;
            let repr_value = self.concrete_body(&rdesc, bz, depth + 1)?;
            return repr.unmarshal_repr(repr_value);
        }
        match &desc.kind {
            Kind::Struct(_) => self.struct_body(desc, bz, depth),
            Kind::Interface => self.interface_body(desc, bz, depth),
            _ => self.implicit_body(desc, bz, depth),
        }
    }

    fn implicit_body(&self, desc: &TypeDescriptor, bz: &[u8], depth: usize) -> Result<Value> {
        let field = implicit_field(desc.type_def.clone(), false);
        let mut sv = StructValue::new().with(IMPLICIT_FIELD, self.codec.zero_of(desc, depth)?);
        self.fields_into(std::slice::from_ref(&field), &mut sv, bz, depth)?;
        sv.take(IMPLICIT_FIELD)
            .ok_or_else(|| Error::invalid(format!("no value decoded for {}", desc.type_def)))
    }

    fn struct_body(&self, desc: &TypeDescriptor, bz: &[u8], depth: usize) -> Result<Value> {
        match self.codec.zero_of(desc, depth)? {
            Value::Struct(mut sv) => {
                self.fields_into(desc.fields(), &mut sv, bz, depth)?;
                Ok(Value::Struct(sv))
            }
            other => Err(type_mismatch(desc, &other)),
        }
    }

    fn interface_body(&self, desc: &TypeDescriptor, bz: &[u8], depth: usize) -> Result<Value> {
        if bz.is_empty() {
            return Ok(Value::Interface(None));
        }
        let (wire, n) = WireIdentity::parse(bz)?;
        let entry = self.codec.registry().resolve_by_binary_identity(
            desc.interface_name(),
            wire.prefix,
            wire.disamb,
        )?;
        trace!(
            "decoding {} as {} inside {}",
            entry.name,
            entry.type_name,
            desc.type_def
        );
        let cdesc = self.codec.describe(&TypeDef::named(entry.type_name.as_str()))?;
        let value = self.concrete_body(&cdesc, &bz[n..], depth + 1)?;
        Ok(Value::interface(entry.type_name.clone(), value))
    }

    /// Reads fields into `sv`, which starts out holding zero values.
    fn fields_into(
        &self,
        fields: &[FieldDescriptor],
        sv: &mut StructValue,
        bz: &[u8],
        depth: usize,
    ) -> Result<()> {
        self.codec.check_depth(depth)?;
        let max_len = self.codec.options().max_bytes_len;
        let mut lists: Vec<Option<Vec<Value>>> = vec![None; fields.len()];
        let mut reader = Reader::new(bz);

        while !reader.is_empty() {
            let (num, wire_type) = reader.read_field_key()?;
            let Some(idx) = fields.iter().position(|f| f.bin_field_num == num) else {
                reader.skip_field(wire_type)?;
                continue;
            };
            let field = &fields[idx];
            let (desc, ptr_depth) = self.codec.strip_pointers(self.codec.describe(&field.ty)?)?;
            let leaf = LeafOptions::from(field);

            if let Some(elem) = plain_list_elem(&desc) {
                let items = lists[idx].get_or_insert_with(Vec::new);
                self.list_items(&mut reader, wire_type, elem, leaf, items, depth + 1)?;
                continue;
            }

            // The last occurrence of a scalar field wins.
            let raw = read_raw(&mut reader, wire_type, max_len)?;
            let value = self.unit(&desc, raw, leaf, depth + 1)?;
            sv.set(field.name.clone(), wrap_pointers(value, ptr_depth));
        }

        for (field, items) in fields.iter().zip(lists) {
            let Some(items) = items else { continue };
            let (desc, ptr_depth) = self.codec.strip_pointers(self.codec.describe(&field.ty)?)?;
            if let Kind::Array { len, .. } = &desc.kind {
                if items.len() != *len {
                    return Err(Error::LengthMismatch {
                        expected: *len,
                        actual: items.len(),
                    });
                }
            }
            sv.set(field.name.clone(), wrap_pointers(Value::List(items), ptr_depth));
        }
        Ok(())
    }

    /// Reads one occurrence of a repeated field, packed or not.
    fn list_items(
        &self,
        reader: &mut Reader<'_>,
        wire_type: WireType,
        elem: &TypeDef,
        leaf: LeafOptions,
        items: &mut Vec<Value>,
        depth: usize,
    ) -> Result<()> {
        let options = self.codec.options();
        let (pointee, ptr_depth) = self.codec.strip_pointers(self.codec.describe(elem)?)?;

        let packed = match wire_type {
            WireType::ByteLength => self.packed_wire_type(&pointee, leaf)?,
            _ => None,
        };
        match packed {
            Some(elem_wire_type) => {
                let block = reader.read_bytes_prefixed(options.max_bytes_len, "packed list")?;
                let mut block_reader = Reader::new(block);
                while !block_reader.is_empty() {
                    let raw = read_raw(&mut block_reader, elem_wire_type, options.max_bytes_len)?;
                    let value = self.unit(&pointee, raw, leaf, depth)?;
                    items.push(wrap_pointers(value, ptr_depth));
                    if items.len() > options.max_list_len {
                        break;
                    }
                }
            }
            None => {
                let raw = read_raw(reader, wire_type, options.max_bytes_len)?;
                let value = self.unit(&pointee, raw, leaf, depth)?;
                items.push(wrap_pointers(value, ptr_depth));
            }
        }
        if items.len() > options.max_list_len {
            return Err(Error::LengthExceedsLimit {
                context: "list",
                len: items.len(),
                max: options.max_list_len,
            });
        }
        Ok(())
    }

    /// Wire type of packed elements, or `None` when elements are not packed.
    fn packed_wire_type(
        &self,
        desc: &Arc<TypeDescriptor>,
        leaf: LeafOptions,
    ) -> Result<Option<WireType>> {
        let mut desc = desc.clone();
        let mut hops = 0;
        loop {
            if desc.well_known.is_some() {
                return Ok(None);
            }
            if let Some(repr_type) = &desc.repr_type {
                desc = self.codec.describe(repr_type)?;
            } else if let Kind::Pointer(inner) = &desc.kind {
                desc = self.codec.describe(inner)?;
            } else {
                break;
            }
            hops += 1;
            self.codec.check_depth(hops)?;
        }
        Ok(match &desc.kind {
            Kind::Primitive(prim) if prim.is_packable() => Some(leaf_wire_type(*prim, leaf)),
            _ => None,
        })
    }

    /// Decodes a single field payload.
    fn unit(&self, desc: &TypeDescriptor, raw: Raw<'_>, leaf: LeafOptions, depth: usize) -> Result<Value> {
        self.codec.check_depth(depth)?;
        if let (Some(well_known), Raw::Bytes(bz)) = (&desc.well_known, raw) {
            if let Some(value) = well_known.decode_binary(bz)? {
                return Ok(value);
            }
        }
        if let (Some(repr), Some(repr_type)) = (&desc.repr, &desc.repr_type) {
            let rdesc = self.codec.describe(repr_type)?;
            let repr_value = self.unit(&rdesc, raw, leaf, depth + 1)?;
            return repr.unmarshal_repr(repr_value);
        }

        match &desc.kind {
            Kind::Primitive(prim) => decode_primitive(*prim, raw, leaf),
            Kind::ByteArray(len) => {
                let bz = expect_bytes(raw, desc)?;
                if bz.len() != *len {
                    return Err(Error::LengthMismatch {
                        expected: *len,
                        actual: bz.len(),
                    });
                }
                Ok(Value::Bytes(bz.to_vec()))
            }
            Kind::ByteSlice => Ok(Value::Bytes(expect_bytes(raw, desc)?.to_vec())),
            Kind::Struct(_) => self.struct_body(desc, expect_bytes(raw, desc)?, depth),
            Kind::Interface => self.interface_body(desc, expect_bytes(raw, desc)?, depth),
            Kind::Pointer(inner) => {
                let inner = self.codec.describe(inner)?;
                Ok(Value::pointer(self.unit(&inner, raw, leaf, depth + 1)?))
            }
            Kind::Array { .. } | Kind::Slice { .. } => {
                self.implicit_body(desc, expect_bytes(raw, desc)?, depth)
            }
        }
    }
}

fn decode_primitive(prim: PrimitiveKind, raw: Raw<'_>, leaf: LeafOptions) -> Result<Value> {
    check_unsafe(prim, leaf)?;
    Ok(match (prim, raw) {
        (PrimitiveKind::Bool, Raw::Varint(0)) => Value::Bool(false),
        (PrimitiveKind::Bool, Raw::Varint(1)) => Value::Bool(true),
        (PrimitiveKind::Bool, Raw::Varint(v)) => {
            return Err(Error::invalid(format!("invalid bool value {}", v)));
        }
        (PrimitiveKind::Int8, Raw::Varint(v)) => {
            Value::Int8(i8::try_from(v as i64).map_err(|_| overflow("int8", v as i64))?)
        }
        (PrimitiveKind::Int16, Raw::Varint(v)) => {
            Value::Int16(i16::try_from(v as i64).map_err(|_| overflow("int16", v as i64))?)
        }
        (PrimitiveKind::Int32, Raw::Varint(v)) => {
            Value::Int32(i32::try_from(v as i64).map_err(|_| overflow("int32", v as i64))?)
        }
        (PrimitiveKind::Int32, Raw::Fixed32(v)) => Value::Int32(v as i32),
        (PrimitiveKind::Int64, Raw::Varint(v) | Raw::Fixed64(v)) => Value::Int64(v as i64),
        (PrimitiveKind::Int, Raw::Varint(v) | Raw::Fixed64(v)) => Value::Int(v as i64),
        (PrimitiveKind::Uint8, Raw::Varint(v)) => {
            Value::Uint8(u8::try_from(v).map_err(|_| overflow("uint8", v))?)
        }
        (PrimitiveKind::Uint16, Raw::Varint(v)) => {
            Value::Uint16(u16::try_from(v).map_err(|_| overflow("uint16", v))?)
        }
        (PrimitiveKind::Uint32, Raw::Varint(v)) => {
            Value::Uint32(u32::try_from(v).map_err(|_| overflow("uint32", v))?)
        }
        (PrimitiveKind::Uint32, Raw::Fixed32(v)) => Value::Uint32(v),
        (PrimitiveKind::Uint64, Raw::Varint(v) | Raw::Fixed64(v)) => Value::Uint64(v),
        (PrimitiveKind::Uint, Raw::Varint(v) | Raw::Fixed64(v)) => Value::Uint(v),
        (PrimitiveKind::Float32, Raw::Fixed32(v)) => Value::Float32(f32::from_bits(v)),
        (PrimitiveKind::Float64, Raw::Fixed64(v)) => Value::Float64(f64::from_bits(v)),
        (PrimitiveKind::String, Raw::Bytes(bz)) => Value::String(
            std::str::from_utf8(bz)
                .map_err(|_| Error::InvalidUtf8 { context: "string" })?
                .to_string(),
        ),
        (prim, raw) => {
            return Err(Error::invalid(format!(
                "wire type {:?} cannot hold {}",
                raw.wire_type(),
                prim.name()
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::{coin, msg, sample_codec};
    use crate::limits::CodecOptions;
    use crate::model::{FieldOptions, TypeDecl};
    use crate::registry::{ConcreteOptions, InterfaceOptions, DISFIX_MARKER};
    use proptest::prelude::*;

    fn struct_codec(decl: TypeDecl) -> Codec {
        let cdc = Codec::new();
        cdc.declare(decl).unwrap();
        cdc
    }

    fn sv(fields: Vec<(&str, Value)>) -> Value {
        let mut s = StructValue::new();
        for (name, value) in fields {
            s.set(name, value);
        }
        Value::Struct(s)
    }

    #[test]
    fn test_struct_known_encoding() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field("A", TypeDef::Int64)
                .field("B", TypeDef::String),
        );
        let ty = TypeDef::named("S");
        let value = sv(vec![("A", Value::Int64(150)), ("B", Value::String("hi".into()))]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz, vec![0x08, 0x96, 0x01, 0x12, 0x02, 0x68, 0x69]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
    }

    #[test]
    fn test_zero_fields_omitted() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field("A", TypeDef::Int64)
                .field("B", TypeDef::String)
                .field("C", TypeDef::slice(TypeDef::Int32)),
        );
        let ty = TypeDef::named("S");
        let zero = cdc.zero_value(&ty).unwrap();
        assert!(cdc.marshal_binary_bare(&ty, &zero).unwrap().is_empty());
        assert_eq!(cdc.unmarshal_binary_bare(&[], &ty).unwrap(), zero);
    }

    #[test]
    fn test_write_empty_field() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field_with("A", TypeDef::Int32, FieldOptions::new().write_empty()),
        );
        let bz = cdc
            .marshal_binary_bare(&TypeDef::named("S"), &sv(vec![]))
            .unwrap();
        assert_eq!(bz, vec![0x08, 0x00]);
    }

    #[test]
    fn test_negative_int_sign_extended() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Int32));
        let ty = TypeDef::named("S");
        let value = sv(vec![("A", Value::Int32(-1))]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz.len(), 11);
        assert_eq!(&bz[..2], &[0x08, 0xFF]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
    }

    #[test]
    fn test_fixed_width_fields() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field_with("A", TypeDef::Int32, FieldOptions::new().fixed32())
                .field_with("B", TypeDef::Uint64, FieldOptions::new().fixed64()),
        );
        let ty = TypeDef::named("S");
        let value = sv(vec![("A", Value::Int32(1)), ("B", Value::Uint64(2))]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(
            bz,
            vec![0x0D, 1, 0, 0, 0, 0x11, 2, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
    }

    #[test]
    fn test_packed_and_unpacked_lists() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::slice(TypeDef::Int32)));
        let ty = TypeDef::named("S");
        let value = sv(vec![(
            "A",
            Value::List(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]),
        )]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz, vec![0x0A, 0x03, 0x01, 0x02, 0x03]);

        let unpacked = [0x08, 0x01, 0x08, 0x02, 0x08, 0x03];
        assert_eq!(cdc.unmarshal_binary_bare(&unpacked, &ty).unwrap(), value);
    }

    #[test]
    fn test_repeated_strings_and_bytes() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field("A", TypeDef::slice(TypeDef::String))
                .field("B", TypeDef::slice(TypeDef::bytes())),
        );
        let ty = TypeDef::named("S");
        let value = sv(vec![
            ("A", Value::List(vec![Value::String("a".into()), Value::String("b".into())])),
            ("B", Value::List(vec![Value::Bytes(vec![1]), Value::Bytes(vec![])])),
        ]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(
            bz,
            vec![0x0A, 0x01, 0x61, 0x0A, 0x01, 0x62, 0x12, 0x01, 0x01, 0x12, 0x00]
        );
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
    }

    #[test]
    fn test_array_length_checked() {
        let cdc = struct_codec(
            TypeDecl::new_struct("S")
                .field("A", TypeDef::array(TypeDef::Int32, 2))
                .field("B", TypeDef::byte_array(4)),
        );
        let ty = TypeDef::named("S");
        // Three packed elements for a two-element array.
        assert_eq!(
            cdc.unmarshal_binary_bare(&[0x0A, 0x03, 0x01, 0x02, 0x03], &ty),
            Err(Error::LengthMismatch { expected: 2, actual: 3 })
        );
        // Three bytes for a four-byte array.
        assert_eq!(
            cdc.unmarshal_binary_bare(&[0x12, 0x03, 0x01, 0x02, 0x03], &ty),
            Err(Error::LengthMismatch { expected: 4, actual: 3 })
        );
        assert_eq!(
            cdc.marshal_binary_bare(&ty, &sv(vec![("B", Value::Bytes(vec![1; 3]))])),
            Err(Error::LengthMismatch { expected: 4, actual: 3 })
        );
    }

    #[test]
    fn test_duplicate_scalar_last_wins() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Int32));
        let value = cdc
            .unmarshal_binary_bare(&[0x08, 0x01, 0x08, 0x07], &TypeDef::named("S"))
            .unwrap();
        assert_eq!(value, sv(vec![("A", Value::Int32(7))]));
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Int32));
        // field 5 varint, field 6 bytes, field 7 fixed32, then A = 3
        let bz = [
            0x28, 0x96, 0x01, 0x32, 0x02, 0xAA, 0xBB, 0x3D, 1, 2, 3, 4, 0x08, 0x03,
        ];
        let value = cdc.unmarshal_binary_bare(&bz, &TypeDef::named("S")).unwrap();
        assert_eq!(value, sv(vec![("A", Value::Int32(3))]));
    }

    #[test]
    fn test_group_wire_types_rejected() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Int32));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x0B], &TypeDef::named("S")),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x0C], &TypeDef::named("S")),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Bool));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x08, 0x02], &TypeDef::named("S")),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_wire_type_mismatch_rejected() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::String));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x08, 0x01], &TypeDef::named("S")),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_narrowing_overflow() {
        let cdc = Codec::new();
        cdc.declare(TypeDecl::new_struct("Wide").field("A", TypeDef::Int64))
            .unwrap();
        cdc.declare(TypeDecl::new_struct("Narrow").field("A", TypeDef::Int32))
            .unwrap();
        let bz = cdc
            .marshal_binary_bare(
                &TypeDef::named("Wide"),
                &sv(vec![("A", Value::Int64(i64::from(i32::MAX) + 1))]),
            )
            .unwrap();
        assert!(matches!(
            cdc.unmarshal_binary_bare(&bz, &TypeDef::named("Narrow")),
            Err(Error::Overflow { ty: "int32", .. })
        ));
    }

    #[test]
    fn test_floats_require_unsafe() {
        let cdc = Codec::new();
        cdc.declare(TypeDecl::new_struct("Safe").field("F", TypeDef::Float64))
            .unwrap();
        cdc.declare(
            TypeDecl::new_struct("Unsafe")
                .field_with("F", TypeDef::Float64, FieldOptions::new().allow_unsafe())
                .field_with("G", TypeDef::slice(TypeDef::Float32), FieldOptions::new().allow_unsafe()),
        )
        .unwrap();
        assert_eq!(
            cdc.marshal_binary_bare(&TypeDef::named("Safe"), &sv(vec![("F", Value::Float64(1.5))])),
            Err(Error::UnsafeType { ty: "float64" })
        );

        let ty = TypeDef::named("Unsafe");
        let value = sv(vec![
            ("F", Value::Float64(1.5)),
            ("G", Value::List(vec![Value::Float32(0.25), Value::Float32(-2.0)])),
        ]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz[0], 0x09);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
    }

    #[test]
    fn test_pointer_presence() {
        let cdc = sample_codec();
        let ty = TypeDef::named("Holder");
        let mut holder = cdc.zero_value(&ty).unwrap();
        holder
            .as_struct_mut()
            .unwrap()
            .set("Ptr", Value::pointer(Value::Int32(0)));
        let bz = cdc.marshal_binary_bare(&ty, &holder).unwrap();
        assert_eq!(bz, vec![0x18, 0x00]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), holder);

        let zero = cdc.zero_value(&ty).unwrap();
        assert!(cdc.marshal_binary_bare(&ty, &zero).unwrap().is_empty());
    }

    #[test]
    fn test_top_level_pointer() {
        let cdc = Codec::new();
        let ty = TypeDef::pointer(TypeDef::Int64);
        assert!(cdc.marshal_binary_bare(&ty, &Value::nil_pointer()).unwrap().is_empty());
        assert_eq!(cdc.unmarshal_binary_bare(&[], &ty).unwrap(), Value::nil_pointer());

        let some_zero = Value::pointer(Value::Int64(0));
        let bz = cdc.marshal_binary_bare(&ty, &some_zero).unwrap();
        assert_eq!(bz, vec![0x08, 0x00]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), some_zero);
    }

    #[test]
    fn test_top_level_list_is_field_one() {
        let cdc = Codec::new();
        let ty = TypeDef::slice(TypeDef::String);
        let value = Value::List(vec![Value::String("x".into())]);
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz, vec![0x0A, 0x01, b'x']);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
        assert_eq!(
            cdc.unmarshal_binary_bare(&[], &ty).unwrap(),
            Value::List(Vec::new())
        );
    }

    #[test]
    fn test_top_level_concrete_prefix() {
        let cdc = sample_codec();
        let entry = cdc.registry().concrete_by_type("Msg").unwrap();
        let bz = cdc.marshal_binary_bare(&TypeDef::named("Msg"), &msg(5)).unwrap();
        assert_eq!(&bz[..4], &entry.identity.prefix);
        assert_eq!(&bz[4..], &[0x08, 0x05]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &TypeDef::named("Msg")).unwrap(), msg(5));

        // Another type's prefix is refused.
        let height = cdc
            .marshal_binary_bare(&TypeDef::named("Height"), &Value::Int64(9))
            .unwrap();
        assert!(matches!(
            cdc.unmarshal_binary_bare(&height, &TypeDef::named("Msg")),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_interface_roundtrip() {
        let cdc = sample_codec();
        let ty = TypeDef::named("Holder");
        let mut holder = cdc.zero_value(&ty).unwrap();
        {
            let s = holder.as_struct_mut().unwrap();
            s.set("Pet", Value::interface("Msg", msg(7)));
            s.set(
                "Pets",
                Value::List(vec![
                    Value::interface("Height", Value::Int64(3)),
                    Value::nil_interface(),
                    Value::interface(
                        "Dog",
                        sv(vec![("Name", Value::String("rex".into())), ("Age", Value::Int64(2))]),
                    ),
                ]),
            );
        }
        let bz = cdc.marshal_binary_bare(&ty, &holder).unwrap();

        let prefix = cdc.registry().concrete_by_type("Msg").unwrap().identity.prefix;
        assert_eq!(bz[0], 0x0A);
        assert_eq!(bz[1], 6);
        assert_eq!(&bz[2..6], &prefix);
        assert_eq!(&bz[6..8], &[0x08, 0x07]);

        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), holder);
    }

    #[test]
    fn test_top_level_interface() {
        let cdc = sample_codec();
        let ty = TypeDef::named("Animal");
        let value = Value::interface("Height", Value::Int64(12));
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(&bz[4..], &[0x08, 0x0C]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
        assert_eq!(
            cdc.unmarshal_binary_bare(&[], &ty).unwrap(),
            Value::nil_interface()
        );
    }

    #[test]
    fn test_interface_rejects_non_implementer() {
        let cdc = sample_codec();
        cdc.seal();
        assert!(matches!(
            cdc.marshal_binary_bare(
                &TypeDef::named("Animal"),
                &Value::interface("Coin", coin(1, "atom"))
            ),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        let cdc = sample_codec();
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x11, 0x22, 0x33, 0x44], &TypeDef::named("Animal")),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x11, 0x22], &TypeDef::named("Animal")),
            Err(Error::MalformedIdentity(_))
        ));
    }

    #[test]
    fn test_always_disambiguate_writes_disfix() {
        let cdc = Codec::new();
        cdc.register_interface("Key", InterfaceOptions::new().always_disambiguate())
            .unwrap();
        let entry = cdc
            .register_concrete(
                TypeDecl::defined("Ed25519", TypeDef::byte_array(4)),
                "crypto/Ed25519",
                ConcreteOptions::new().implements("Key"),
            )
            .unwrap();
        let ty = TypeDef::named("Key");
        let value = Value::interface("Ed25519", Value::Bytes(vec![1, 2, 3, 4]));
        let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
        assert_eq!(bz[0], DISFIX_MARKER);
        assert_eq!(&bz[..8], &entry.identity.disfix_bytes());
        assert_eq!(&bz[8..], &[0x0A, 0x04, 1, 2, 3, 4]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);

        // The short form is refused.
        let mut short = entry.identity.prefix.to_vec();
        short.extend_from_slice(&bz[8..]);
        assert!(matches!(
            cdc.unmarshal_binary_bare(&short, &ty),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_repr_hook() {
        let cdc = sample_codec();
        let ty = TypeDef::named("Holder");
        let mut holder = cdc.zero_value(&ty).unwrap();
        holder.as_struct_mut().unwrap().set("Coin", coin(5, "atom"));
        let bz = cdc.marshal_binary_bare(&ty, &holder).unwrap();
        assert_eq!(bz, vec![0x22, 0x05, b'5', b'a', b't', b'o', b'm']);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), holder);

        // Hook errors come back unchanged.
        assert_eq!(
            cdc.unmarshal_binary_bare(&[0x22, 0x01, b'x'], &ty),
            Err(Error::custom("bad coin \"x\""))
        );
    }

    #[test]
    fn test_length_prefixed_framing() {
        let cdc = sample_codec();
        let ty = TypeDef::named("Msg");
        let bz = cdc.marshal_binary_length_prefixed(&ty, &msg(1)).unwrap();
        assert_eq!(bz[0] as usize, bz.len() - 1);
        assert_eq!(cdc.unmarshal_binary_length_prefixed(&bz, &ty).unwrap(), msg(1));

        let mut long = bz.clone();
        long.push(0);
        assert!(matches!(
            cdc.unmarshal_binary_length_prefixed(&long, &ty),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::String));
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x0A, 0x05, b'a'], &TypeDef::named("S")),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let cdc = Codec::with_options(CodecOptions::new().max_depth(8));
        cdc.declare(
            TypeDecl::new_struct("Node")
                .field("V", TypeDef::Int32)
                .field("Next", TypeDef::pointer(TypeDef::named("Node"))),
        )
        .unwrap();
        let mut value = sv(vec![("V", Value::Int32(1)), ("Next", Value::nil_pointer())]);
        for _ in 0..10 {
            value = sv(vec![("V", Value::Int32(1)), ("Next", Value::pointer(value))]);
        }
        assert_eq!(
            cdc.marshal_binary_bare(&TypeDef::named("Node"), &value),
            Err(Error::DepthExceeded { max: 8 })
        );
    }

    #[test]
    fn test_recursive_type_roundtrip() {
        let cdc = Codec::new();
        cdc.declare(
            TypeDecl::new_struct("Node")
                .field("V", TypeDef::Int32)
                .field("Next", TypeDef::pointer(TypeDef::named("Node"))),
        )
        .unwrap();
        let ty = TypeDef::named("Node");
        let tail = sv(vec![("V", Value::Int32(2)), ("Next", Value::nil_pointer())]);
        let head = sv(vec![("V", Value::Int32(1)), ("Next", Value::pointer(tail))]);
        let bz = cdc.marshal_binary_bare(&ty, &head).unwrap();
        assert_eq!(bz, vec![0x08, 0x01, 0x12, 0x02, 0x08, 0x02]);
        assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), head);
    }

    #[test]
    fn test_type_mismatch() {
        let cdc = struct_codec(TypeDecl::new_struct("S").field("A", TypeDef::Int32));
        assert!(matches!(
            cdc.marshal_binary_bare(&TypeDef::named("S"), &sv(vec![("A", Value::Int64(1))])),
            Err(Error::TypeMismatch { found: "int64", .. })
        ));
    }

    #[test]
    fn test_unsupported_type() {
        let cdc = Codec::new();
        let ty = TypeDef::Map(Box::new(TypeDef::String), Box::new(TypeDef::Int64));
        assert!(matches!(
            cdc.marshal_binary_bare(&ty, &Value::List(vec![])),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_list_limit() {
        let cdc = Codec::with_options(CodecOptions::new().max_list_len(2));
        let ty = TypeDef::slice(TypeDef::Int32);
        assert!(matches!(
            cdc.unmarshal_binary_bare(&[0x0A, 0x03, 0x01, 0x02, 0x03], &ty),
            Err(Error::LengthExceedsLimit { context: "list", .. })
        ));
    }

    #[test]
    fn test_typed_helpers() {
        let cdc = Codec::new();
        let bz = cdc.encode_binary(&vec![1i64, -2, 3]).unwrap();
        assert_eq!(cdc.decode_binary::<Vec<i64>>(&bz).unwrap(), vec![1, -2, 3]);

        let bz = cdc.encode_binary_length_prefixed(&Some([9u8; 3])).unwrap();
        assert_eq!(
            cdc.decode_binary_length_prefixed::<Option<[u8; 3]>>(&bz).unwrap(),
            Some([9u8; 3])
        );
        assert_eq!(cdc.decode_binary::<Option<String>>(&[]).unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_struct_roundtrip(
            a in any::<i64>(),
            b in any::<u32>(),
            c in ".{0,16}",
            d in proptest::collection::vec(any::<u8>(), 0..16),
            e in proptest::collection::vec(any::<i16>(), 0..8),
            f in any::<bool>(),
        ) {
            let cdc = struct_codec(
                TypeDecl::new_struct("S")
                    .field("A", TypeDef::Int64)
                    .field("B", TypeDef::Uint32)
                    .field("C", TypeDef::String)
                    .field("D", TypeDef::bytes())
                    .field("E", TypeDef::slice(TypeDef::Int16))
                    .field("F", TypeDef::Bool),
            );
            let ty = TypeDef::named("S");
            let value = sv(vec![
                ("A", Value::Int64(a)),
                ("B", Value::Uint32(b)),
                ("C", Value::String(c)),
                ("D", Value::Bytes(d)),
                ("E", Value::List(e.into_iter().map(Value::Int16).collect())),
                ("F", Value::Bool(f)),
            ]);
            let bz = cdc.marshal_binary_bare(&ty, &value).unwrap();
            prop_assert_eq!(cdc.unmarshal_binary_bare(&bz, &ty).unwrap(), value);
        }
    }
}
