//! Fixed-width integer and length-prefixed string primitives.
//!
//! This is the lowest layer of the protocol. Every packet field is one of:
//!
//! - an unsigned or signed integer of 8, 16, or 32 bits, written
//!   **big-endian** (network byte order);
//! - a "string16": a `u16` big-endian byte length followed by that many
//!   raw bytes.
//!
//! ```text
//! string16 "hero"
//! +------+------+----+----+----+----+
//! | 0x00 | 0x04 | h  | e  | r  | o  |
//! +------+------+----+----+----+----+
//! ```
//!
//! [`Writer`] appends fields to an owned buffer. [`Reader`] walks a
//! borrowed slice with a cursor. Integer reads are strict (a short read
//! is a [`ProtocolError::Truncated`]), but string reads are soft: a
//! truncated string decodes as whatever bytes remain, which keeps a peer
//! running an older build from tearing the connection down over one
//! malformed name.

use crate::ProtocolError;

/// Largest byte length a string16 can carry.
pub const MAX_STRING16_LEN: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends big-endian fields to a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_s8(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_s16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_s32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a boolean as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a length-prefixed string.
    ///
    /// Strings longer than [`MAX_STRING16_LEN`] bytes cannot be
    /// represented; they are replaced by a zero-length marker so the
    /// surrounding packet stays well-formed.
    pub fn write_string16(&mut self, value: &str) {
        self.write_bytes16(value.as_bytes());
    }

    /// Writes length-prefixed raw bytes. Same overflow rule as
    /// [`write_string16`](Self::write_string16).
    pub fn write_bytes16(&mut self, value: &[u8]) {
        match u16::try_from(value.len()) {
            Ok(len) => {
                self.write_u16(len);
                self.buf.extend_from_slice(value);
            }
            Err(_) => {
                tracing::debug!(len = value.len(), "string16 too long, writing empty marker");
                self.write_u16(0);
            }
        }
    }

    /// Appends bytes verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes `bytes` as a standalone string16.
pub fn serialize_string16(bytes: &[u8]) -> Vec<u8> {
    let mut w = Writer::with_capacity(bytes.len() + 2);
    w.write_bytes16(bytes);
    w.into_inner()
}

/// Decodes a standalone string16, returning the payload bytes.
///
/// Never fails: truncated input yields whatever payload bytes exist,
/// and input shorter than the length header yields an empty vector.
pub fn deserialize_string16(data: &[u8]) -> Vec<u8> {
    Reader::new(data).read_bytes16().to_vec()
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A forward-only cursor over a received payload.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unconsumed tail of the input.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let remaining = self.remaining();
        if remaining < N {
            return Err(ProtocolError::Truncated {
                needed: N,
                remaining,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    pub fn read_s8(&mut self) -> Result<i8, ProtocolError> {
        self.take::<1>().map(i8::from_be_bytes)
    }

    pub fn read_s16(&mut self) -> Result<i16, ProtocolError> {
        self.take::<2>().map(i16::from_be_bytes)
    }

    pub fn read_s32(&mut self) -> Result<i32, ProtocolError> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    /// Reads a byte and treats any non-zero value as `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.read_u8().map(|b| b != 0)
    }

    /// Reads length-prefixed raw bytes, softly.
    ///
    /// A missing or partial length header yields an empty slice and
    /// consumes the rest of the input. A declared length longer than the
    /// remaining input yields the remaining bytes.
    pub fn read_bytes16(&mut self) -> &'a [u8] {
        let Ok(len) = self.read_u16() else {
            self.pos = self.data.len();
            return &[];
        };
        let end = (self.pos + len as usize).min(self.data.len());
        let out = &self.data[self.pos..end];
        self.pos = end;
        out
    }

    /// Reads a length-prefixed string. Invalid UTF-8 is replaced rather
    /// than rejected.
    pub fn read_string16(&mut self) -> String {
        String::from_utf8_lossy(self.read_bytes16()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let mut w = Writer::new();
        w.write_u8(0xab);
        w.write_u16(0x1234);
        w.write_u32(0xdead_beef);
        w.write_s8(-1);
        w.write_s16(-2);
        w.write_s32(-3);
        let bytes = w.into_inner();
        assert_eq!(
            bytes,
            vec![
                0xab, 0x12, 0x34, 0xde, 0xad, 0xbe, 0xef, 0xff, 0xff, 0xfe, 0xff, 0xff,
                0xff, 0xfd,
            ]
        );

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_s8().unwrap(), -1);
        assert_eq!(r.read_s16().unwrap(), -2);
        assert_eq!(r.read_s32().unwrap(), -3);
        assert!(r.is_empty());
    }

    #[test]
    fn test_short_integer_read_is_truncated_error() {
        let mut r = Reader::new(&[0x01]);
        assert_eq!(
            r.read_u16(),
            Err(ProtocolError::Truncated {
                needed: 2,
                remaining: 1
            })
        );
        // A failed read leaves the cursor where it was.
        assert_eq!(r.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_string16_layout() {
        assert_eq!(serialize_string16(b"hero"), vec![0, 4, b'h', b'e', b'r', b'o']);
        assert_eq!(serialize_string16(b""), vec![0, 0]);
    }

    #[test]
    fn test_string16_too_long_writes_empty_marker() {
        let long = vec![b'x'; MAX_STRING16_LEN + 1];
        assert_eq!(serialize_string16(&long), vec![0, 0]);

        let max = vec![b'y'; MAX_STRING16_LEN];
        let encoded = serialize_string16(&max);
        assert_eq!(encoded.len(), MAX_STRING16_LEN + 2);
        assert_eq!(deserialize_string16(&encoded), max);
    }

    #[test]
    fn test_string16_truncated_input_fails_softly() {
        // Header promises 10 bytes, only 3 arrive.
        assert_eq!(deserialize_string16(&[0, 10, b'a', b'b', b'c']), b"abc");
        // Header itself cut short.
        assert!(deserialize_string16(&[0]).is_empty());
        assert!(deserialize_string16(&[]).is_empty());
    }

    #[test]
    fn test_read_string16_then_integer() {
        let mut w = Writer::new();
        w.write_string16("名前");
        w.write_u16(7);
        let bytes = w.into_inner();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_string16(), "名前");
        assert_eq!(r.read_u16().unwrap(), 7);
    }
}
