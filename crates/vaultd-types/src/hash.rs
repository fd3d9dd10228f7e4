//! 32-byte hashes and 16-byte specifiers.

use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TypesError;

/// BLAKE2b with a 256-bit digest, the hash used throughout the chain.
pub(crate) type Blake2b256 = Blake2b<U32>;

/// Computes the BLAKE2b-256 digest of `data`.
#[must_use]
pub fn blake2b_sum(data: &[u8]) -> Hash256 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

/// A generic 256-bit hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Returns the hash as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses a hash from a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidHex`] if the string is not 64 hex
    /// characters.
    pub fn parse_hex(s: &str) -> Result<Self, TypesError> {
        let mut buf = [0u8; 32];
        hex::decode_to_slice(s, &mut buf).map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        Ok(Self(buf))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(b: [u8; 32]) -> Self {
        Self(b)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_hex(&s).map_err(D::Error::custom)
    }
}

/// The specifier identifying the Ed25519 signature algorithm.
pub const SPECIFIER_ED25519: Specifier = Specifier::new(b"ed25519");

/// A 16-byte identifier for an algorithm or object kind.
///
/// Specifiers are ASCII strings padded with zeros to 16 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Specifier(pub [u8; 16]);

impl Specifier {
    /// Creates a specifier from an ASCII string of at most 16 bytes.
    /// Longer inputs are truncated.
    #[must_use]
    pub const fn new(s: &[u8]) -> Self {
        let mut buf = [0u8; 16];
        let mut i = 0;
        while i < s.len() && i < 16 {
            buf[i] = s[i];
            i += 1;
        }
        Self(buf)
    }

    fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(16);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Specifier {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 16 {
            return Err(TypesError::InvalidHex(s.to_string()));
        }
        Ok(Self::new(s.as_bytes()))
    }
}

impl Serialize for Specifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Specifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2b_sum_empty() {
        // BLAKE2b-256 of the empty string.
        let h = blake2b_sum(b"");
        assert_eq!(
            h.to_string(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_hash_hex_round_trip() {
        let h = blake2b_sum(b"vaultd");
        let parsed = Hash256::parse_hex(&h.to_string()).expect("valid hex");
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_hash_rejects_bad_hex() {
        assert!(Hash256::parse_hex("abcd").is_err());
        assert!(Hash256::parse_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_specifier_padding() {
        let spec = SPECIFIER_ED25519;
        assert_eq!(&spec.0[..7], b"ed25519");
        assert!(spec.0[7..].iter().all(|&b| b == 0));
        assert_eq!(spec.to_string(), "ed25519");
    }

    #[test]
    fn test_hash_serde() {
        let h = blake2b_sum(b"serde");
        let json = serde_json::to_string(&h).expect("serialize");
        let back: Hash256 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(h, back);
    }
}
