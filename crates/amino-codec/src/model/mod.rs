//! Data model: type expressions, declarations and dynamic values.

pub mod native;
pub mod types;
pub mod value;

pub use native::Amino;
pub use types::{BinFixed, DeclBody, FieldDef, FieldOptions, TypeDecl, TypeDef};
pub use value::{Concrete, StructValue, Value};
