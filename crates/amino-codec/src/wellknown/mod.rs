//! Built-in well-known types.
//!
//! Every codec declares these on construction:
//!
//! | Name | Fields | JSON form |
//! |------|--------|-----------|
//! | `google.protobuf.Timestamp` | `Seconds int64`, `Nanos int32` | `"2009-11-10T23:00:00Z"` |
//! | `google.protobuf.Duration`  | `Seconds int64`, `Nanos int32` | `"1.5s"` |
//!
//! The binary form of both is the plain proto3 message: field 1 is the
//! seconds varint, field 2 the nanos varint, each omitted when zero.

mod duration;
mod timestamp;

use std::sync::Arc;

use lazy_static::lazy_static;

use crate::codec::primitives::{Reader, WireType, Writer};
use crate::error::{Error, Result};
use crate::hooks::WellKnownCodec;
use crate::limits::MAX_BYTES_LEN;
use crate::model::{StructValue, TypeDecl, TypeDef, Value};

pub use duration::{Duration, DurationCodec, MAX_DURATION_SECONDS};
pub use timestamp::{Timestamp, TimestampCodec};

/// Declared name of the timestamp type.
pub const TIMESTAMP: &str = "google.protobuf.Timestamp";

/// Declared name of the duration type.
pub const DURATION: &str = "google.protobuf.Duration";

const SECONDS: &str = "Seconds";
const NANOS: &str = "Nanos";

lazy_static! {
    static ref TIMESTAMP_CODEC: Arc<dyn WellKnownCodec> = Arc::new(TimestampCodec);
    static ref DURATION_CODEC: Arc<dyn WellKnownCodec> = Arc::new(DurationCodec);
}

/// Declarations of the well-known types.
pub fn declarations() -> Vec<TypeDecl> {
    vec![
        seconds_nanos(TIMESTAMP).with_well_known(TIMESTAMP_CODEC.clone()),
        seconds_nanos(DURATION).with_well_known(DURATION_CODEC.clone()),
    ]
}

fn seconds_nanos(name: &str) -> TypeDecl {
    TypeDecl::new_struct(name)
        .field(SECONDS, TypeDef::Int64)
        .field(NANOS, TypeDef::Int32)
}

/// Reads `(seconds, nanos)` out of a struct value. Missing fields are zero.
fn split(name: &str, value: &Value) -> Result<(i64, i32)> {
    let sv = value.as_struct().ok_or_else(|| Error::TypeMismatch {
        expected: name.to_string(),
        found: value.kind_name(),
    })?;
    let seconds = match sv.get(SECONDS) {
        None => 0,
        Some(Value::Int64(s)) => *s,
        Some(other) => {
            return Err(Error::TypeMismatch {
                expected: "int64".to_string(),
                found: other.kind_name(),
            });
        }
    };
    let nanos = match sv.get(NANOS) {
        None => 0,
        Some(Value::Int32(n)) => *n,
        Some(other) => {
            return Err(Error::TypeMismatch {
                expected: "int32".to_string(),
                found: other.kind_name(),
            });
        }
    };
    Ok((seconds, nanos))
}

fn join(seconds: i64, nanos: i32) -> Value {
    Value::Struct(
        StructValue::new()
            .with(SECONDS, Value::Int64(seconds))
            .with(NANOS, Value::Int32(nanos)),
    )
}

fn encode_message(seconds: i64, nanos: i32) -> Vec<u8> {
    let mut writer = Writer::with_capacity(16);
    if seconds != 0 {
        writer.write_field_key(1, WireType::Varint);
        writer.write_int_varint(seconds);
    }
    if nanos != 0 {
        writer.write_field_key(2, WireType::Varint);
        writer.write_int_varint(i64::from(nanos));
    }
    writer.into_bytes()
}

fn decode_message(bz: &[u8]) -> Result<(i64, i32)> {
    let mut reader = Reader::new(bz);
    let mut seconds = 0i64;
    let mut nanos = 0i32;
    while !reader.is_empty() {
        match reader.read_field_key()? {
            (1, WireType::Varint) => seconds = reader.read_varint("seconds")? as i64,
            (2, WireType::Varint) => {
                let raw = reader.read_varint("nanos")? as i64;
                nanos = i32::try_from(raw).map_err(|_| Error::Overflow {
                    ty: "int32",
                    value: raw.to_string(),
                })?;
            }
            (1 | 2, wire_type) => {
                return Err(Error::invalid(format!(
                    "wire type {:?} cannot hold a seconds/nanos field",
                    wire_type
                )));
            }
            (_, wire_type) => reader.skip_field(wire_type)?,
        }
    }
    Ok((seconds, nanos))
}

/// Reads a JSON string for a well-known type, bounded like any other string.
fn json_str<'a>(name: &str, json: &'a serde_json::Value) -> Result<Option<&'a str>> {
    match json {
        serde_json::Value::String(s) if s.len() > MAX_BYTES_LEN => Err(Error::LengthExceedsLimit {
            context: "well-known string",
            len: s.len(),
            max: MAX_BYTES_LEN,
        }),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Object(_) => Ok(None),
        other => Err(Error::invalid(format!(
            "{} must be a JSON string, got {}",
            name, other
        ))),
    }
}
