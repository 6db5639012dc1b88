//! Shared declarations for codec tests.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::hooks::ReprCodec;
use crate::model::{FieldOptions, StructValue, TypeDecl, TypeDef, Value};
use crate::registry::{ConcreteOptions, InterfaceOptions};

use super::Codec;

/// Encodes `Coin{Amount, Denom}` as the string `"<amount><denom>"`.
#[derive(Debug)]
pub(crate) struct CoinRepr;

impl ReprCodec for CoinRepr {
    fn repr_type(&self) -> TypeDef {
        TypeDef::String
    }

    fn marshal_repr(&self, value: &Value) -> Result<Value> {
        let sv = value
            .as_struct()
            .ok_or_else(|| Error::custom("coin must be a struct"))?;
        let amount = sv.get("Amount").and_then(Value::as_i64).unwrap_or(0);
        let denom = sv.get("Denom").and_then(Value::as_str).unwrap_or("");
        Ok(Value::String(format!("{}{}", amount, denom)))
    }

    fn unmarshal_repr(&self, repr: Value) -> Result<Value> {
        let s = repr
            .as_str()
            .ok_or_else(|| Error::custom("coin repr must be a string"))?;
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let amount: i64 = s[..split]
            .parse()
            .map_err(|_| Error::custom(format!("bad coin {:?}", s)))?;
        Ok(coin(amount, &s[split..]))
    }
}

pub(crate) fn coin(amount: i64, denom: &str) -> Value {
    Value::Struct(
        StructValue::new()
            .with("Amount", Value::Int64(amount))
            .with("Denom", Value::String(denom.to_string())),
    )
}

pub(crate) fn msg(field: i32) -> Value {
    Value::Struct(StructValue::new().with("Field", Value::Int32(field)))
}

/// A codec with an `Animal` interface, three implementers and a handful of
/// plain declarations.
///
/// - `Msg` registered as `pkg/Msg`: `{Field int32}`
/// - `Dog` registered as `/pkg/Dog`: `{Name string, Age int64 (omitempty)}`
/// - `Height` registered as `pkg/Height`: defined over `int64`
/// - `Coin`: `{Amount int64, Denom string}` with a string repr
/// - `Holder`: `{Pet Animal, Pets []Animal, Ptr *int32, Coin Coin}`
pub(crate) fn sample_codec() -> Codec {
    let cdc = Codec::new();
    cdc.register_interface("Animal", InterfaceOptions::new())
        .unwrap();
    cdc.register_concrete(
        TypeDecl::new_struct("Msg").field("Field", TypeDef::Int32),
        "pkg/Msg",
        ConcreteOptions::new().implements("Animal"),
    )
    .unwrap();
    cdc.register_concrete(
        TypeDecl::new_struct("Dog")
            .field("Name", TypeDef::String)
            .field_with("Age", TypeDef::Int64, FieldOptions::new().omit_empty()),
        "pkg/Dog",
        ConcreteOptions::new().implements("Animal").slash_prefixed_url(),
    )
    .unwrap();
    cdc.register_concrete(
        TypeDecl::defined("Height", TypeDef::Int64),
        "pkg/Height",
        ConcreteOptions::new().implements("Animal"),
    )
    .unwrap();
    cdc.declare(
        TypeDecl::new_struct("Coin")
            .field("Amount", TypeDef::Int64)
            .field("Denom", TypeDef::String)
            .with_repr(Arc::new(CoinRepr)),
    )
    .unwrap();
    cdc.declare(
        TypeDecl::new_struct("Holder")
            .field("Pet", TypeDef::named("Animal"))
            .field("Pets", TypeDef::slice(TypeDef::named("Animal")))
            .field("Ptr", TypeDef::pointer(TypeDef::Int32))
            .field("Coin", TypeDef::named("Coin")),
    )
    .unwrap();
    cdc
}
