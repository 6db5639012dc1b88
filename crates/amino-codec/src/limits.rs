//! Decoding limits and codec options.
//!
//! The decoder handles untrusted input, so every allocation driven by a
//! length read from the wire is bounded.

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Default maximum nesting depth of a traversal.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Maximum length of a single byte string (bytes or string field).
pub const MAX_BYTES_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of a string.
pub const MAX_STRING_LEN: usize = MAX_BYTES_LEN;

/// Maximum number of elements in a decoded list.
pub const MAX_LIST_LEN: usize = 1 << 20;

/// Length of the short binary identity.
pub const PREFIX_LEN: usize = 4;

/// Length of the disambiguation bytes.
pub const DISAMB_LEN: usize = 3;

/// Options controlling a [`Codec`](crate::Codec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Maximum recursion depth before a traversal fails with
    /// [`Error::DepthExceeded`](crate::Error::DepthExceeded).
    pub max_depth: usize,
    /// Maximum length of a decoded byte string or string.
    pub max_bytes_len: usize,
    /// Maximum number of elements in a decoded list.
    pub max_list_len: usize,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_bytes_len: MAX_BYTES_LEN,
            max_list_len: MAX_LIST_LEN,
        }
    }
}

impl CodecOptions {
    /// Creates options with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum traversal depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the maximum byte string length.
    pub fn max_bytes_len(mut self, len: usize) -> Self {
        self.max_bytes_len = len;
        self
    }

    /// Sets the maximum decoded list length.
    pub fn max_list_len(mut self, len: usize) -> Self {
        self.max_list_len = len;
        self
    }
}
