//! Custom hook protocol.
//!
//! A declaration can replace the generic traversal in two ways:
//!
//! - [`ReprCodec`]: the type is encoded as some other *representation* type.
//!   Marshal converts the value into a repr value which is then encoded
//!   generically; unmarshal decodes a repr value generically and converts it
//!   back. Representation types may themselves be arbitrarily nested.
//! - [`WellKnownCodec`]: the type has a bespoke wire form on one or both
//!   formats. The hook gets first refusal and returns `None` to decline,
//!   after which generic dispatch proceeds.

use std::fmt;

use crate::error::Result;
use crate::model::{TypeDef, Value};

/// Substitutes a representation type for encoding and decoding.
pub trait ReprCodec: Send + Sync + fmt::Debug {
    /// The type values are converted to before encoding.
    fn repr_type(&self) -> TypeDef;

    /// Converts a value of the declaring type into a repr value.
    fn marshal_repr(&self, value: &Value) -> Result<Value>;

    /// Converts a decoded repr value back. Errors are returned to the
    /// caller unchanged.
    fn unmarshal_repr(&self, repr: Value) -> Result<Value>;
}

/// Bespoke encoding for a well-known type.
///
/// Every method may decline with `Ok(None)`.
pub trait WellKnownCodec: Send + Sync + fmt::Debug {
    /// Returns the JSON form of `value`.
    fn encode_json(&self, value: &Value) -> Result<Option<serde_json::Value>>;

    /// Decodes a parsed JSON value.
    fn decode_json(&self, json: &serde_json::Value) -> Result<Option<Value>>;

    /// Returns the bare (unframed) binary body for `value`.
    fn encode_binary(&self, value: &Value) -> Result<Option<Vec<u8>>>;

    /// Decodes a bare binary body.
    fn decode_binary(&self, bz: &[u8]) -> Result<Option<Value>>;

    /// True when the JSON form is not an object. Interface envelopes carry
    /// such values directly in their `value` field.
    fn json_is_scalar(&self) -> bool {
        true
    }
}
