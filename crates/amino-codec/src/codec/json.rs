//! JSON codec.
//!
//! - 64-bit integers (`int64`, `uint64`, `int`, `uint`) are quoted decimal
//!   strings; narrower integers are plain numbers.
//! - Byte slices and arrays are standard base64.
//! - Structs are objects keyed by JSON name in declaration order.
//! - Interface values are envelopes: `{"@type": "<url>", "value": ...}`.
//!   A registered concrete type encoded at top level is enveloped too.
//! - `null` decodes to the zero value of any type.

use std::borrow::Cow;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use log::trace;
use serde_json::{Map, Number};

use crate::codec::{type_mismatch, Codec, LeafOptions};
use crate::descriptor::{Kind, PrimitiveKind, TypeDescriptor};
use crate::error::{Error, Result};
use crate::model::{TypeDef, Value};
use crate::registry::ConcreteEntry;

const TYPE_KEY: &str = "@type";
const VALUE_KEY: &str = "value";

type Json = serde_json::Value;

static NULL: Json = Json::Null;

impl Codec {
    /// Encodes `value` as `ty` in JSON.
    pub fn marshal_json(&self, ty: &TypeDef, value: &Value) -> Result<Vec<u8>> {
        self.ensure_sealed();
        let json = JsonEncoder { codec: self }.top(ty, value)?;
        Ok(serde_json::to_vec(&json)?)
    }

    /// Decodes JSON as `ty`, starting from the zero value.
    pub fn unmarshal_json(&self, bz: &[u8], ty: &TypeDef) -> Result<Value> {
        let mut value = self.zero_value(ty)?;
        self.unmarshal_json_into(bz, ty, &mut value)?;
        Ok(value)
    }

    /// Decodes JSON as `ty` into an existing value.
    ///
    /// Struct fields marked `omit_empty` that are absent from the input keep
    /// their current value; other absent fields are reset to zero.
    pub fn unmarshal_json_into(&self, bz: &[u8], ty: &TypeDef, dest: &mut Value) -> Result<()> {
        self.ensure_sealed();
        let json: Json = serde_json::from_slice(bz)?;
        let desc = self.describe(ty)?;
        JsonDecoder { codec: self }.top(&json, &desc, dest, 0)
    }
}

fn check_unsafe(prim: PrimitiveKind, leaf: LeafOptions) -> Result<()> {
    if prim.is_float() && !leaf.unsafe_ {
        return Err(Error::UnsafeType { ty: prim.name() });
    }
    Ok(())
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn expected(what: &str, ty: impl std::fmt::Display, json: &Json) -> Error {
    Error::invalid(format!(
        "expected {} for {}, got {}",
        what,
        ty,
        json_kind(json)
    ))
}

// =============================================================================
// ENCODING
// =============================================================================

struct JsonEncoder<'c> {
    codec: &'c Codec,
}

impl JsonEncoder<'_> {
    fn top(&self, ty: &TypeDef, value: &Value) -> Result<Json> {
        let mut desc = self.codec.describe(ty)?;
        let mut value = value;
        while let Kind::Pointer(inner) = &desc.kind {
            match value {
                Value::Pointer(None) => return Ok(Json::Null),
                Value::Pointer(Some(v)) => value = &**v,
                other => return Err(type_mismatch(&desc, other)),
            }
            desc = self.codec.describe(inner)?;
        }

        match self.codec.concrete_entry(&desc) {
            Some(entry) => self.envelope(&entry, desc, value, 0),
            None => self.value(desc, value, LeafOptions::default(), 0),
        }
    }

    fn envelope(
        &self,
        entry: &ConcreteEntry,
        desc: Arc<TypeDescriptor>,
        value: &Value,
        depth: usize,
    ) -> Result<Json> {
        let mut obj = Map::new();
        obj.insert(TYPE_KEY.to_string(), Json::String(entry.type_url.clone()));
        obj.insert(
            VALUE_KEY.to_string(),
            self.value(desc, value, LeafOptions::default(), depth + 1)?,
        );
        Ok(Json::Object(obj))
    }

    fn value(
        &self,
        desc: Arc<TypeDescriptor>,
        value: &Value,
        leaf: LeafOptions,
        depth: usize,
    ) -> Result<Json> {
        self.codec.check_depth(depth)?;
        if let Some(well_known) = &desc.well_known {
            if let Some(json) = well_known.encode_json(value)? {
                return Ok(json);
            }
        }
        if let (Some(repr), Some(repr_type)) = (&desc.repr, &desc.repr_type) {
            let repr_value = repr.marshal_repr(value)?;
            let rdesc = self.codec.describe(repr_type)?;
            return self.value(rdesc, &repr_value, leaf, depth + 1);
        }

        match &desc.kind {
            Kind::Primitive(prim) => primitive(&desc, *prim, value, leaf),
            Kind::ByteArray(len) => match value {
                Value::Bytes(bz) if bz.len() != *len => Err(Error::LengthMismatch {
                    expected: *len,
                    actual: bz.len(),
                }),
                Value::Bytes(bz) => Ok(base64_string(bz)),
                other => Err(type_mismatch(&desc, other)),
            },
            Kind::ByteSlice => match value {
                Value::Bytes(bz) => Ok(base64_string(bz)),
                other => Err(type_mismatch(&desc, other)),
            },
            Kind::Array { elem, .. } | Kind::Slice { elem } => {
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
                let elem = self.codec.describe(elem)?;
                let items = items
                    .iter()
                    .map(|item| self.value(elem.clone(), item, leaf, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Json::Array(items))
            }
            Kind::Struct(fields) => {
                let Value::Struct(sv) = value else {
                    return Err(type_mismatch(&desc, value));
                };
                let mut obj = Map::new();
                for field in fields {
                    let fdesc = self.codec.describe(&field.ty)?;
                    let zero;
                    let fvalue = match sv.get(&field.name) {
                        Some(v) => v,
                        None => {
                            zero = self.codec.zero_of(&fdesc, depth + 1)?;
                            &zero
                        }
                    };
                    if field.omit_empty && self.codec.is_zero(&fdesc, fvalue, depth + 1)? {
                        continue;
                    }
                    let fjson = self.value(fdesc, fvalue, LeafOptions::from(field), depth + 1)?;
                    obj.insert(field.json_name.clone(), fjson);
                }
                Ok(Json::Object(obj))
            }
            Kind::Interface => match value {
                Value::Interface(None) => Ok(Json::Null),
                Value::Interface(Some(concrete)) => {
                    let entry = self.codec.interface_entry(&desc, &concrete.type_name)?;
                    let cdesc = self
                        .codec
                        .describe(&TypeDef::named(concrete.type_name.as_str()))?;
                    self.envelope(&entry, cdesc, &concrete.value, depth)
                }
                other => Err(type_mismatch(&desc, other)),
            },
            Kind::Pointer(inner) => match value {
                Value::Pointer(None) => Ok(Json::Null),
                Value::Pointer(Some(v)) => {
                    let inner = self.codec.describe(inner)?;
                    self.value(inner, v, leaf, depth + 1)
                }
                other => Err(type_mismatch(&desc, other)),
            },
        }
    }
}

fn base64_string(bz: &[u8]) -> Json {
    Json::String(general_purpose::STANDARD.encode(bz))
}

fn float(v: f64) -> Result<Json> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| Error::invalid(format!("cannot encode {} as JSON", v)))
}

fn primitive(
    desc: &TypeDescriptor,
    prim: PrimitiveKind,
    value: &Value,
    leaf: LeafOptions,
) -> Result<Json> {
    check_unsafe(prim, leaf)?;
    Ok(match (prim, value) {
        (PrimitiveKind::Bool, Value::Bool(b)) => Json::Bool(*b),
        (PrimitiveKind::Int8, Value::Int8(v)) => Json::from(*v),
        (PrimitiveKind::Int16, Value::Int16(v)) => Json::from(*v),
        (PrimitiveKind::Int32, Value::Int32(v)) => Json::from(*v),
        (PrimitiveKind::Uint8, Value::Uint8(v)) => Json::from(*v),
        (PrimitiveKind::Uint16, Value::Uint16(v)) => Json::from(*v),
        (PrimitiveKind::Uint32, Value::Uint32(v)) => Json::from(*v),
        (PrimitiveKind::Int64, Value::Int64(v)) | (PrimitiveKind::Int, Value::Int(v)) => {
            Json::String(v.to_string())
        }
        (PrimitiveKind::Uint64, Value::Uint64(v)) | (PrimitiveKind::Uint, Value::Uint(v)) => {
            Json::String(v.to_string())
        }
        // Widened through the shortest decimal so 0.1f32 stays "0.1".
        (PrimitiveKind::Float32, Value::Float32(v)) => match v.to_string().parse::<f64>() {
            Ok(wide) if v.is_finite() => float(wide)?,
            _ => return Err(Error::invalid(format!("cannot encode {} as JSON", v))),
        },
        (PrimitiveKind::Float64, Value::Float64(v)) => float(*v)?,
        (PrimitiveKind::String, Value::String(s)) => Json::String(s.clone()),
        (_, other) => return Err(type_mismatch(desc, other)),
    })
}

// =============================================================================
// DECODING
// =============================================================================

struct JsonDecoder<'c> {
    codec: &'c Codec,
}

impl JsonDecoder<'_> {
    fn top(&self, json: &Json, desc: &Arc<TypeDescriptor>, dest: &mut Value, depth: usize) -> Result<()> {
        self.codec.check_depth(depth)?;
        if json.is_null() {
            *dest = self.codec.zero_of(desc, depth)?;
            return Ok(());
        }
        if let Kind::Pointer(inner) = &desc.kind {
            let inner = self.codec.describe(inner)?;
            return match dest {
                Value::Pointer(Some(slot)) => self.top(json, &inner, slot, depth + 1),
                _ => {
                    let mut value = self.codec.zero_of(&inner, depth + 1)?;
                    self.top(json, &inner, &mut value, depth + 1)?;
                    *dest = Value::pointer(value);
                    Ok(())
                }
            };
        }

        let Some(entry) = self.codec.concrete_entry(desc) else {
            return self.decode_into(json, desc, LeafOptions::default(), dest, depth);
        };
        let Json::Object(envelope) = json else {
            return Err(Error::MalformedEnvelope(format!(
                "expected an object for {}, got {}",
                entry.name,
                json_kind(json)
            )));
        };
        let url = type_url(envelope)?;
        if url != entry.type_url {
            return Err(Error::UnknownType(format!(
                "expected type URL {:?}, got {:?}",
                entry.type_url, url
            )));
        }
        let payload = self.payload(envelope, url, desc)?;
        self.decode_into(&payload, desc, LeafOptions::default(), dest, depth + 1)
    }

    fn decode_into(
        &self,
        json: &Json,
        desc: &Arc<TypeDescriptor>,
        leaf: LeafOptions,
        dest: &mut Value,
        depth: usize,
    ) -> Result<()> {
        self.codec.check_depth(depth)?;
        if json.is_null() {
            *dest = self.codec.zero_of(desc, depth)?;
            return Ok(());
        }
        if let Some(well_known) = &desc.well_known {
            if let Some(value) = well_known.decode_json(json)? {
                *dest = value;
                return Ok(());
            }
        }
        if let (Some(repr), Some(repr_type)) = (&desc.repr, &desc.repr_type) {
            let rdesc = self.codec.describe(repr_type)?;
            let mut repr_value = self.codec.zero_of(&rdesc, depth + 1)?;
            self.decode_into(json, &rdesc, leaf, &mut repr_value, depth + 1)?;
            *dest = repr.unmarshal_repr(repr_value)?;
            return Ok(());
        }

        match &desc.kind {
            Kind::Primitive(prim) => *dest = decode_primitive(*prim, json, leaf)?,
            Kind::ByteArray(len) => {
                let bz = decode_base64(json, desc)?;
                if bz.len() != *len {
                    return Err(Error::LengthMismatch {
                        expected: *len,
                        actual: bz.len(),
                    });
                }
                *dest = Value::Bytes(bz);
            }
            Kind::ByteSlice => *dest = Value::Bytes(decode_base64(json, desc)?),
            Kind::Array { elem, .. } | Kind::Slice { elem } => {
                let Json::Array(items) = json else {
                    return Err(expected("an array", &desc.type_def, json));
                };
                let max = self.codec.options().max_list_len;
                if items.len() > max {
                    return Err(Error::LengthExceedsLimit {
                        context: "list",
                        len: items.len(),
                        max,
                    });
                }
                if let Kind::Array { len, .. } = &desc.kind {
                    if items.len() != *len {
                        return Err(Error::LengthMismatch {
                            expected: *len,
                            actual: items.len(),
                        });
                    }
                }
                let elem = self.codec.describe(elem)?;
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let mut value = self.codec.zero_of(&elem, depth + 1)?;
                    self.decode_into(item, &elem, leaf, &mut value, depth + 1)?;
                    values.push(value);
                }
                *dest = Value::List(values);
            }
            Kind::Struct(fields) => {
                let Json::Object(obj) = json else {
                    return Err(expected("an object", &desc.type_def, json));
                };
                if !matches!(dest, Value::Struct(_)) {
                    *dest = self.codec.zero_of(desc, depth)?;
                }
                let sv = match dest {
                    Value::Struct(sv) => sv,
                    other => return Err(type_mismatch(desc, other)),
                };
                for field in fields {
                    let fdesc = self.codec.describe(&field.ty)?;
                    match obj.get(&field.json_name) {
                        Some(fjson) => {
                            if sv.get(&field.name).is_none() {
                                sv.set(field.name.clone(), self.codec.zero_of(&fdesc, depth + 1)?);
                            }
                            if let Some(slot) = sv.get_mut(&field.name) {
                                self.decode_into(
                                    fjson,
                                    &fdesc,
                                    LeafOptions::from(field),
                                    slot,
                                    depth + 1,
                                )?;
                            }
                        }
                        None if field.omit_empty && sv.get(&field.name).is_some() => {}
                        None => sv.set(field.name.clone(), self.codec.zero_of(&fdesc, depth + 1)?),
                    }
                }
            }
            Kind::Interface => self.interface(json, desc, dest, depth)?,
            Kind::Pointer(inner) => {
                let inner = self.codec.describe(inner)?;
                match dest {
                    Value::Pointer(Some(slot)) => self.decode_into(json, &inner, leaf, slot, depth + 1)?,
                    _ => {
                        let mut value = self.codec.zero_of(&inner, depth + 1)?;
                        self.decode_into(json, &inner, leaf, &mut value, depth + 1)?;
                        *dest = Value::pointer(value);
                    }
                }
            }
        }
        Ok(())
    }

    fn interface(&self, json: &Json, desc: &TypeDescriptor, dest: &mut Value, depth: usize) -> Result<()> {
        let Json::Object(envelope) = json else {
            return Err(Error::MalformedEnvelope(format!(
                "expected an object for {}, got {}",
                desc.type_def,
                json_kind(json)
            )));
        };
        let url = type_url(envelope)?;
        let resolved = self.codec.registry().resolve_by_url(url)?;
        let entry = self.codec.interface_entry(desc, &resolved.type_name)?;
        trace!("decoding JSON {} as {} inside {}", url, entry.type_name, desc.type_def);

        let cdesc = self.codec.describe(&TypeDef::named(entry.type_name.as_str()))?;
        let payload = self.payload(envelope, url, &cdesc)?;
        let mut value = self.codec.zero_of(&cdesc, depth + 1)?;
        self.decode_into(&payload, &cdesc, LeafOptions::default(), &mut value, depth + 1)?;
        *dest = Value::interface(entry.type_name.clone(), value);
        Ok(())
    }

    /// Extracts the JSON to decode as the concrete type from an envelope.
    fn payload<'j>(
        &self,
        envelope: &'j Map<String, Json>,
        url: &str,
        cdesc: &Arc<TypeDescriptor>,
    ) -> Result<Cow<'j, Json>> {
        if !self.is_object_form(cdesc)? {
            return Ok(Cow::Borrowed(envelope.get(VALUE_KEY).unwrap_or(&NULL)));
        }
        match envelope.get(VALUE_KEY) {
            Some(Json::Object(inner)) => match inner.get(TYPE_KEY) {
                None => Ok(Cow::Borrowed(&envelope[VALUE_KEY])),
                Some(Json::String(inner_url)) if inner_url == url => {
                    let mut inner = inner.clone();
                    inner.remove(TYPE_KEY);
                    Ok(Cow::Owned(Json::Object(inner)))
                }
                Some(other) => Err(Error::MalformedEnvelope(format!(
                    "inner @type {} does not match {:?}",
                    other, url
                ))),
            },
            Some(other) => Err(Error::MalformedEnvelope(format!(
                "value of {:?} must be an object, got {}",
                url,
                json_kind(other)
            ))),
            None => {
                let mut embedded = envelope.clone();
                embedded.remove(TYPE_KEY);
                Ok(Cow::Owned(Json::Object(embedded)))
            }
        }
    }

    /// True when values of `desc` are JSON objects.
    fn is_object_form(&self, desc: &Arc<TypeDescriptor>) -> Result<bool> {
        let mut desc = desc.clone();
        let mut hops = 0;
        loop {
            if let Some(well_known) = &desc.well_known {
                return Ok(!well_known.json_is_scalar());
            }
            if let Some(repr_type) = &desc.repr_type {
                desc = self.codec.describe(repr_type)?;
            } else if let Kind::Pointer(inner) = &desc.kind {
                desc = self.codec.describe(inner)?;
            } else {
                return Ok(desc.is_struct());
            }
            hops += 1;
            self.codec.check_depth(hops)?;
        }
    }
}

/// Reads the `@type` of an envelope.
fn type_url(envelope: &Map<String, Json>) -> Result<&str> {
    match envelope.get(TYPE_KEY) {
        None => Err(Error::MissingTypeUrl),
        Some(Json::String(url)) if url.is_empty() => Err(Error::MissingTypeUrl),
        Some(Json::String(url)) => Ok(url),
        Some(other) => Err(Error::MalformedEnvelope(format!(
            "@type must be a string, got {}",
            json_kind(other)
        ))),
    }
}

fn decode_base64(json: &Json, desc: &TypeDescriptor) -> Result<Vec<u8>> {
    let Json::String(s) = json else {
        return Err(expected("a base64 string", &desc.type_def, json));
    };
    general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::invalid(format!("invalid base64 for {}: {}", desc.type_def, e)))
}

fn overflow(ty: &'static str, value: impl std::fmt::Display) -> Error {
    Error::Overflow {
        ty,
        value: value.to_string(),
    }
}

/// Parses a quoted 64-bit integer. The text must follow the JSON integer
/// grammar (`-?(0|[1-9][0-9]*)`); in-grammar numbers that do not fit report
/// `Overflow`.
fn parse_wide<T: std::str::FromStr>(prim: PrimitiveKind, json: &Json) -> Result<T> {
    let Json::String(s) = json else {
        return Err(expected("a quoted integer", prim.name(), json));
    };
    let digits = s.strip_prefix('-').unwrap_or(s);
    let well_formed = match digits.as_bytes() {
        [b'0'] => true,
        [b'1'..=b'9', rest @ ..] => rest.iter().all(u8::is_ascii_digit),
        _ => false,
    };
    if !well_formed {
        return Err(Error::invalid(format!("invalid {} {:?}", prim.name(), s)));
    }
    s.parse::<T>().map_err(|_| overflow(prim.name(), s))
}

fn narrow_int<T: TryFrom<i64>>(prim: PrimitiveKind, json: &Json) -> Result<T> {
    let Json::Number(n) = json else {
        return Err(expected("a number", prim.name(), json));
    };
    match n.as_i64() {
        Some(v) => T::try_from(v).map_err(|_| overflow(prim.name(), n)),
        None if n.is_u64() => Err(overflow(prim.name(), n)),
        None => Err(Error::invalid(format!("{} is not an integer", n))),
    }
}

fn decode_primitive(prim: PrimitiveKind, json: &Json, leaf: LeafOptions) -> Result<Value> {
    check_unsafe(prim, leaf)?;
    Ok(match prim {
        PrimitiveKind::Bool => match json {
            Json::Bool(b) => Value::Bool(*b),
            other => return Err(expected("a bool", prim.name(), other)),
        },
        PrimitiveKind::Int8 => Value::Int8(narrow_int(prim, json)?),
        PrimitiveKind::Int16 => Value::Int16(narrow_int(prim, json)?),
        PrimitiveKind::Int32 => Value::Int32(narrow_int(prim, json)?),
        PrimitiveKind::Uint8 => Value::Uint8(narrow_int(prim, json)?),
        PrimitiveKind::Uint16 => Value::Uint16(narrow_int(prim, json)?),
        PrimitiveKind::Uint32 => Value::Uint32(narrow_int(prim, json)?),
        PrimitiveKind::Int64 => Value::Int64(parse_wide(prim, json)?),
        PrimitiveKind::Int => Value::Int(parse_wide(prim, json)?),
        PrimitiveKind::Uint64 => Value::Uint64(parse_wide(prim, json)?),
        PrimitiveKind::Uint => Value::Uint(parse_wide(prim, json)?),
        PrimitiveKind::Float32 | PrimitiveKind::Float64 => {
            let Some(v) = json.as_f64() else {
                return Err(expected("a number", prim.name(), json));
            };
            if prim == PrimitiveKind::Float32 {
                let narrowed = v as f32;
                if !narrowed.is_finite() {
                    return Err(overflow(prim.name(), v));
                }
                Value::Float32(narrowed)
            } else {
                Value::Float64(v)
            }
        }
        PrimitiveKind::String => match json {
            Json::String(s) => Value::String(s.clone()),
            other => return Err(expected("a string", prim.name(), other)),
        },
    })
}
