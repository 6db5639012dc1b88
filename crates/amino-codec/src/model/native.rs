//! Typed layer mapping native Rust types to dynamic values.
//!
//! | Rust type  | Type expression |
//! |------------|-----------------|
//! | `bool`     | `Bool`          |
//! | `i8`..`i64`| `Int8`..`Int64` |
//! | `u8`..`u64`| `Uint8`..`Uint64` |
//! | `f32`/`f64`| `Float32`/`Float64` |
//! | `String`   | `String`        |
//! | `Vec<T>`   | `Slice(T)`      |
//! | `[T; N]`   | `Array(T, N)`   |
//! | `Option<T>`| `Pointer(T)`    |
//!
//! `Vec<u8>` and `[u8; N]` map to [`Value::Bytes`].

use crate::error::{Error, Result};
use crate::model::{TypeDef, Value};

/// A native type with a fixed type expression.
pub trait Amino: Sized {
    /// The type expression values of this type are encoded as.
    fn type_def() -> TypeDef;

    /// Converts to a dynamic value.
    fn to_value(&self) -> Value;

    /// Converts back from a dynamic value.
    fn from_value(value: Value) -> Result<Self>;
}

pub(crate) fn mismatch(expected: &TypeDef, found: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind_name(),
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $def:ident / $variant:ident),* $(,)?) => {
        $(
            impl Amino for $ty {
                fn type_def() -> TypeDef {
                    TypeDef::$def
                }

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch(&Self::type_def(), &other)),
                    }
                }
            }
        )*
    };
}

impl_scalar! {
    bool => Bool / Bool,
    i8 => Int8 / Int8,
    i16 => Int16 / Int16,
    i32 => Int32 / Int32,
    i64 => Int64 / Int64,
    u8 => Uint8 / Uint8,
    u16 => Uint16 / Uint16,
    u32 => Uint32 / Uint32,
    u64 => Uint64 / Uint64,
    f32 => Float32 / Float32,
    f64 => Float64 / Float64,
    String => String / String,
}

fn list_to_value<T: Amino>(items: &[T]) -> Value {
    if T::type_def().is_byte() {
        Value::Bytes(
            items
                .iter()
                .filter_map(|item| match item.to_value() {
                    Value::Uint8(b) => Some(b),
                    _ => None,
                })
                .collect(),
        )
    } else {
        Value::List(items.iter().map(Amino::to_value).collect())
    }
}

fn list_from_value<T: Amino>(list_ty: &TypeDef, value: Value) -> Result<Vec<T>> {
    match value {
        Value::Bytes(bytes) if T::type_def().is_byte() => bytes
            .into_iter()
            .map(|b| T::from_value(Value::Uint8(b)))
            .collect(),
        Value::List(items) => items.into_iter().map(T::from_value).collect(),
        other => Err(mismatch(list_ty, &other)),
    }
}

impl<T: Amino> Amino for Vec<T> {
    fn type_def() -> TypeDef {
        TypeDef::slice(T::type_def())
    }

    fn to_value(&self) -> Value {
        list_to_value(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        list_from_value(&Self::type_def(), value)
    }
}

impl<T: Amino, const N: usize> Amino for [T; N] {
    fn type_def() -> TypeDef {
        TypeDef::array(T::type_def(), N)
    }

    fn to_value(&self) -> Value {
        list_to_value(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        let items = list_from_value::<T>(&Self::type_def(), value)?;
        let actual = items.len();
        items.try_into().map_err(|_| Error::LengthMismatch {
            expected: N,
            actual,
        })
    }
}

impl<T: Amino> Amino for Option<T> {
    fn type_def() -> TypeDef {
        TypeDef::pointer(T::type_def())
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => Value::pointer(v.to_value()),
            None => Value::nil_pointer(),
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Pointer(Some(inner)) => T::from_value(*inner).map(Some),
            Value::Pointer(None) => Ok(None),
            other => Err(mismatch(&Self::type_def(), &other)),
        }
    }
}
