use crate::error::{Error, Result};
use crate::hooks::WellKnownCodec;
use crate::model::{Amino, TypeDef, Value};
use crate::util::datetime::{check_timestamp, format_timestamp_rfc3339, parse_timestamp_rfc3339};

use super::{decode_message, encode_message, join, json_str, split, TIMESTAMP};

/// A point in time as seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Parses an RFC 3339 timestamp.
    pub fn parse(s: &str) -> Result<Self> {
        let (seconds, nanos) = parse_timestamp_rfc3339(s).map_err(|e| Error::invalid(e.message))?;
        Ok(Self { seconds, nanos })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_timestamp_rfc3339(self.seconds, self.nanos))
    }
}

impl Amino for Timestamp {
    fn type_def() -> TypeDef {
        TypeDef::named(TIMESTAMP)
    }

    fn to_value(&self) -> Value {
        join(self.seconds, self.nanos)
    }

    fn from_value(value: Value) -> Result<Self> {
        let (seconds, nanos) = split(TIMESTAMP, &value)?;
        Ok(Self { seconds, nanos })
    }
}

fn checked(seconds: i64, nanos: i32) -> Result<(i64, i32)> {
    check_timestamp(seconds, nanos).map_err(|e| Error::invalid(e.message))?;
    Ok((seconds, nanos))
}

/// Hook for `google.protobuf.Timestamp`.
///
/// An empty JSON string decodes to the Unix epoch. A JSON object is declined
/// and decoded as the plain struct.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampCodec;

impl WellKnownCodec for TimestampCodec {
    fn encode_json(&self, value: &Value) -> Result<Option<serde_json::Value>> {
        let (seconds, nanos) = checked_split(value)?;
        Ok(Some(serde_json::Value::String(format_timestamp_rfc3339(seconds, nanos))))
    }

    fn decode_json(&self, json: &serde_json::Value) -> Result<Option<Value>> {
        let Some(s) = json_str(TIMESTAMP, json)? else {
            return Ok(None);
        };
        if s.is_empty() {
            return Ok(Some(join(0, 0)));
        }
        let (seconds, nanos) = parse_timestamp_rfc3339(s).map_err(|e| Error::invalid(e.message))?;
        Ok(Some(join(seconds, nanos)))
    }

    fn encode_binary(&self, value: &Value) -> Result<Option<Vec<u8>>> {
        let (seconds, nanos) = checked_split(value)?;
        Ok(Some(encode_message(seconds, nanos)))
    }

    fn decode_binary(&self, bz: &[u8]) -> Result<Option<Value>> {
        let (seconds, nanos) = decode_message(bz)?;
        let (seconds, nanos) = checked(seconds, nanos)?;
        Ok(Some(join(seconds, nanos)))
    }
}

fn checked_split(value: &Value) -> Result<(i64, i32)> {
    let (seconds, nanos) = split(TIMESTAMP, value)?;
    checked(seconds, nanos)
}
