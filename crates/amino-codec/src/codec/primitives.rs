//! Primitive wire encoding: varints, fixed-width integers, length-delimited
//! byte strings and proto3 field keys.

use crate::error::{Error, Result};
use crate::limits::MAX_VARINT_BYTES;

/// Proto3 wire type of an encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    ByteLength = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Creates a WireType from its 3-bit wire representation.
    pub fn from_u8(v: u8) -> Option<WireType> {
        match v {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::ByteLength),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Reader for decoding binary data.
///
/// Wraps a byte slice and provides bounds-checked reads.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the next byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    #[inline]
    pub fn read_byte(&mut self, context: &'static str) -> Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::UnexpectedEof { context });
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads exactly n bytes.
    #[inline]
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8]> {
        if n > self.remaining_len() {
            return Err(Error::UnexpectedEof { context });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Reads an unsigned varint (LEB128).
    #[inline]
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_byte(context)?;
            let value = (byte & 0x7F) as u64;

            if shift >= 64 || (shift == 63 && value > 1) {
                return Err(Error::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;

            if i == MAX_VARINT_BYTES - 1 {
                return Err(Error::VarintTooLong);
            }
        }

        Err(Error::VarintTooLong)
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_fixed32(&mut self, context: &'static str) -> Result<u32> {
        let bytes = self.read_bytes(4, context)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian u64.
    #[inline]
    pub fn read_fixed64(&mut self, context: &'static str) -> Result<u64> {
        let bytes = self.read_bytes(8, context)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a length-prefixed byte string, borrowed from the input.
    pub fn read_bytes_prefixed(
        &mut self,
        max_len: usize,
        context: &'static str,
    ) -> Result<&'a [u8]> {
        let len = self.read_varint(context)?;
        if len > max_len as u64 {
            return Err(Error::LengthExceedsLimit {
                context,
                len: len.min(usize::MAX as u64) as usize,
                max: max_len,
            });
        }
        self.read_bytes(len as usize, context)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, max_len: usize, context: &'static str) -> Result<String> {
        let bytes = self.read_bytes_prefixed(max_len, context)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| Error::InvalidUtf8 { context })
    }

    /// Reads a field key, returning the field number and wire type.
    pub fn read_field_key(&mut self) -> Result<(u32, WireType)> {
        let key = self.read_varint("field key")?;
        let typ = (key & 0x07) as u8;
        let num = key >> 3;
        let wire_type = WireType::from_u8(typ)
            .ok_or_else(|| Error::invalid(format!("unsupported wire type {}", typ)))?;
        if num == 0 || num > (1 << 29) - 1 {
            return Err(Error::invalid(format!("invalid field number {}", num)));
        }
        Ok((num as u32, wire_type))
    }

    /// Skips over one field value of the given wire type.
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint("skipped varint")?;
            }
            WireType::Fixed64 => {
                self.read_bytes(8, "skipped fixed64")?;
            }
            WireType::Fixed32 => {
                self.read_bytes(4, "skipped fixed32")?;
            }
            WireType::ByteLength => {
                let len = self.read_varint("skipped length")?;
                if len > self.remaining_len() as u64 {
                    return Err(Error::UnexpectedEof { context: "skipped bytes" });
                }
                self.read_bytes(len as usize, "skipped bytes")?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned varint (LEB128).
    #[inline]
    pub fn write_varint(&mut self, mut value: u64) {
        // Use stack buffer to batch writes (faster than multiple push calls)
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.buf.extend_from_slice(&buf[..len]);
    }

    /// Writes a signed integer as a two's complement varint, sign-extended to
    /// 64 bits (proto3 `int32`/`int64`).
    #[inline]
    pub fn write_int_varint(&mut self, value: i64) {
        self.write_varint(value as u64);
    }

    #[inline]
    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a length-prefixed byte string.
    pub fn write_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes_prefixed(s.as_bytes());
    }

    /// Writes a field key: `(num << 3) | wire_type`.
    pub fn write_field_key(&mut self, num: u32, wire_type: WireType) {
        self.write_varint(((num as u64) << 3) | wire_type as u64);
    }
}

/// Returns the number of bytes `value` occupies as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint_known_encodings() {
        let cases: [(u64, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (150, &[0x96, 0x01]),
            (300, &[0xAC, 0x02]),
            (u64::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        ];
        for (v, expected) in cases {
            let mut writer = Writer::new();
            writer.write_varint(v);
            assert_eq!(writer.as_bytes(), expected, "failed for {}", v);
            assert_eq!(varint_len(v), expected.len());
        }
    }

    #[test]
    fn test_negative_int_is_ten_bytes() {
        let mut writer = Writer::new();
        writer.write_int_varint(-1);
        assert_eq!(writer.len(), 10);

        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_varint("test").unwrap() as i64, -1);
    }

    #[test]
    fn test_field_key() {
        let mut writer = Writer::new();
        writer.write_field_key(1, WireType::ByteLength);
        writer.write_field_key(16, WireType::Varint);
        assert_eq!(writer.as_bytes(), &[0x0A, 0x80, 0x01]);

        let mut reader = Reader::new(writer.as_bytes());
        assert_eq!(reader.read_field_key().unwrap(), (1, WireType::ByteLength));
        assert_eq!(reader.read_field_key().unwrap(), (16, WireType::Varint));
    }

    #[test]
    fn test_group_wire_type_rejected() {
        // field 1, wire type 3 (start group)
        let mut reader = Reader::new(&[0x0B]);
        assert!(matches!(reader.read_field_key(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_field_number_zero_rejected() {
        let mut reader = Reader::new(&[0x00]);
        assert!(matches!(reader.read_field_key(), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_skip_field() {
        let mut writer = Writer::new();
        writer.write_varint(300);
        writer.write_fixed64(7);
        writer.write_fixed32(7);
        writer.write_bytes_prefixed(b"abc");
        writer.write_byte(0xFF);

        let mut reader = Reader::new(writer.as_bytes());
        reader.skip_field(WireType::Varint).unwrap();
        reader.skip_field(WireType::Fixed64).unwrap();
        reader.skip_field(WireType::Fixed32).unwrap();
        reader.skip_field(WireType::ByteLength).unwrap();
        assert_eq!(reader.read_byte("tail").unwrap(), 0xFF);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_skip_truncated_bytes() {
        let mut reader = Reader::new(&[0x05, 0x01]);
        assert!(matches!(
            reader.skip_field(WireType::ByteLength),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_varint_too_long() {
        // 11 continuation bytes should fail
        let data = [0x80u8; 11];
        let mut reader = Reader::new(&data);
        assert!(matches!(reader.read_varint("test"), Err(Error::VarintTooLong)));
    }

    #[test]
    fn test_varint_overflow() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        let mut reader = Reader::new(&data);
        assert!(matches!(reader.read_varint("test"), Err(Error::VarintOverflow)));
    }

    #[test]
    fn test_string_too_long() {
        let mut writer = Writer::new();
        writer.write_varint(1000);
        writer.write_bytes(&[b'a'; 1000]);

        let mut reader = Reader::new(writer.as_bytes());
        assert!(matches!(
            reader.read_string(100, "test"),
            Err(Error::LengthExceedsLimit { max: 100, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut reader = Reader::new(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            reader.read_string(100, "test"),
            Err(Error::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_unexpected_eof() {
        let data = [0u8; 5];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            reader.read_bytes(10, "test"),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(v in any::<u64>()) {
            let mut writer = Writer::new();
            writer.write_varint(v);
            prop_assert_eq!(writer.len(), varint_len(v));
            let mut reader = Reader::new(writer.as_bytes());
            prop_assert_eq!(reader.read_varint("test").unwrap(), v);
            prop_assert!(reader.is_empty());
        }

        #[test]
        fn prop_fixed_roundtrip(a in any::<u32>(), b in any::<u64>()) {
            let mut writer = Writer::new();
            writer.write_fixed32(a);
            writer.write_fixed64(b);
            let mut reader = Reader::new(writer.as_bytes());
            prop_assert_eq!(reader.read_fixed32("test").unwrap(), a);
            prop_assert_eq!(reader.read_fixed64("test").unwrap(), b);
        }
    }
}
