//! Error types for registration, encoding and decoding.

use thiserror::Error;

/// Broad classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Registration-time failures (duplicates, collisions, sealed registry).
    Registration,
    /// A type or identity could not be resolved.
    Resolution,
    /// Malformed or out-of-range wire data.
    Format,
    /// A value was refused by a safety gate (floats without `unsafe`).
    Safety,
}

impl ErrorCode {
    /// Returns a short label for the class.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCode::Registration => "registration",
            ErrorCode::Resolution => "resolution",
            ErrorCode::Format => "format",
            ErrorCode::Safety => "safety",
        }
    }
}

/// Error returned by every fallible codec operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // === Registration ===
    #[error("unsupported type {ty}: {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("duplicate registration of {name:?}")]
    DuplicateRegistration { name: String },

    #[error("identity collision: {name:?} and {existing:?} share {identity}")]
    IdentityCollision {
        name: String,
        existing: String,
        identity: String,
    },

    #[error("registry is sealed")]
    RegistrySealed,

    // === Resolution ===
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("malformed type identity: {0}")]
    MalformedIdentity(String),

    #[error("JSON encoding of interfaces requires a non-empty @type field")]
    MissingTypeUrl,

    #[error("malformed interface envelope: {0}")]
    MalformedEnvelope(String),

    // === Format ===
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("value {value} overflows {ty}")]
    Overflow { ty: &'static str, value: String },

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("invalid UTF-8 in {context}")]
    InvalidUtf8 { context: &'static str },

    #[error("{context} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        context: &'static str,
        len: usize,
        max: usize,
    },

    #[error("nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("value does not match type {expected}: found {found}")]
    TypeMismatch { expected: String, found: &'static str },

    // === Safety ===
    #[error("{ty} support requires the unsafe field option")]
    UnsafeType { ty: &'static str },

    /// Error raised by a user-supplied hook, returned unchanged.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Creates a hook error from any displayable message.
    pub fn custom(msg: impl std::fmt::Display) -> Self {
        Error::Custom(msg.to_string())
    }

    pub(crate) fn unsupported(ty: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Error::UnsupportedType {
            ty: ty.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Returns the class of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnsupportedType { .. }
            | Error::DuplicateRegistration { .. }
            | Error::IdentityCollision { .. }
            | Error::RegistrySealed => ErrorCode::Registration,
            Error::UnknownType(_)
            | Error::MalformedIdentity(_)
            | Error::MissingTypeUrl
            | Error::MalformedEnvelope(_) => ErrorCode::Resolution,
            Error::UnsafeType { .. } => ErrorCode::Safety,
            _ => ErrorCode::Format,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
