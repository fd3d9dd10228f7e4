//! The binary encoding used for signature hashes.
//!
//! Hashes are computed over a deterministic little-endian encoding: integers
//! are 8-byte little-endian, variable-length collections carry an 8-byte
//! length prefix, and byte arrays are written raw. The encoder writes into
//! an in-memory buffer that is fed to BLAKE2b.

use crate::hash::{blake2b_sum, Hash256};

/// A buffer that accumulates the deterministic encoding of chain objects.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with a distinguisher prefix, namespacing the hash
    /// it will produce (`sia/<tag>|`).
    #[must_use]
    pub fn with_distinguisher(tag: &str) -> Self {
        let mut e = Self::new();
        e.write_bytes(b"sia/");
        e.write_bytes(tag.as_bytes());
        e.write_bytes(b"|");
        e
    }

    /// Writes raw bytes without a length prefix.
    pub fn write_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a bool as a single 0/1 byte.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Writes a little-endian u64.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a collection length prefix.
    pub fn write_prefix(&mut self, len: usize) {
        self.write_u64(len as u64);
    }

    /// Writes a length-prefixed byte string.
    pub fn write_prefixed_bytes(&mut self, b: &[u8]) {
        self.write_prefix(b.len());
        self.write_bytes(b);
    }

    /// Consumes the encoder and returns the BLAKE2b-256 digest of its
    /// contents.
    #[must_use]
    pub fn finalize(self) -> Hash256 {
        blake2b_sum(&self.buf)
    }
}

/// Objects with a deterministic binary encoding.
pub trait SiaEncodable {
    /// Appends the object's encoding to `e`.
    fn encode_to(&self, e: &mut Encoder);
}

impl SiaEncodable for u64 {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_u64(*self);
    }
}

impl<T: SiaEncodable> SiaEncodable for [T] {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_prefix(self.len());
        for item in self {
            item.encode_to(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_is_little_endian() {
        let mut e = Encoder::new();
        e.write_u64(0x0102_0304);
        assert_eq!(e.buf, [0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_prefixed_bytes() {
        let mut e = Encoder::new();
        e.write_prefixed_bytes(b"ab");
        assert_eq!(e.buf, [2, 0, 0, 0, 0, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_distinguisher_prefix() {
        let mut a = Encoder::with_distinguisher("sig/input");
        a.write_u8(0);
        let mut b = Encoder::new();
        b.write_bytes(b"sia/sig/input|\x00");
        assert_eq!(a.finalize(), b.finalize());
    }
}
