//! Amino: a type-driven binary and JSON codec with registered interface types.
//!
//! Values are described by declarations registered with a [`Codec`], then
//! encoded into a proto3-compatible binary form or a JSON form. Interface
//! slots hold any registered concrete type; the binary form identifies it by
//! a 4-byte prefix derived from its registered name, the JSON form by a type
//! URL.
//!
//! # Quick Start
//!
//! ```rust
//! use amino_codec::{
//!     Codec, ConcreteOptions, InterfaceOptions, StructValue, TypeDecl, TypeDef, Value,
//! };
//!
//! let cdc = Codec::new();
//! cdc.register_interface("Msg", InterfaceOptions::new()).unwrap();
//! cdc.register_concrete(
//!     TypeDecl::new_struct("Send")
//!         .field("Amount", TypeDef::Int64)
//!         .field("To", TypeDef::String),
//!     "bank/Send",
//!     ConcreteOptions::new().implements("Msg"),
//! )
//! .unwrap();
//!
//! let send = StructValue::new()
//!     .with("Amount", Value::Int64(150))
//!     .with("To", Value::String("bob".to_string()));
//! let msg = Value::interface("Send", Value::Struct(send));
//!
//! let bz = cdc.marshal_binary_bare(&TypeDef::named("Msg"), &msg).unwrap();
//! assert_eq!(cdc.unmarshal_binary_bare(&bz, &TypeDef::named("Msg")).unwrap(), msg);
//!
//! let json = cdc.marshal_json(&TypeDef::named("Msg"), &msg).unwrap();
//! assert_eq!(json, br#"{"@type":"bank/Send","value":{"Amount":"150","To":"bob"}}"#);
//! ```
//!
//! # Modules
//!
//! - [`model`]: type expressions, declarations, dynamic values, native types
//! - [`registry`]: declarations, interfaces and concrete type identities
//! - [`descriptor`]: cached per-type encoding plans
//! - [`codec`]: the [`Codec`] and its binary and JSON engines
//! - [`hooks`]: custom representation and well-known type hooks
//! - [`wellknown`]: `Timestamp` and `Duration`
//! - [`error`]: error types
//! - [`limits`]: decoding limits
//!
//! # Security
//!
//! Decoding is safe on untrusted input: lengths, list sizes and nesting
//! depth are bounded by [`CodecOptions`], varints longer than 10 bytes are
//! rejected, and narrowing integer conversions are checked.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod limits;
pub mod model;
pub mod registry;
pub mod util;
pub mod wellknown;

pub use codec::Codec;
pub use descriptor::{FieldDescriptor, Kind, PrimitiveKind, TypeDescriptor};
pub use error::{Error, ErrorCode, Result};
pub use hooks::{ReprCodec, WellKnownCodec};
pub use limits::CodecOptions;
pub use model::{
    Amino, BinFixed, Concrete, DeclBody, FieldDef, FieldOptions, StructValue, TypeDecl, TypeDef,
    Value,
};
pub use registry::{
    BinaryIdentity, ConcreteEntry, ConcreteOptions, InterfaceOptions, Registry, WireIdentity,
};
pub use wellknown::{Duration, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
