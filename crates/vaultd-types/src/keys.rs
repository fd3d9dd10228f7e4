//! Ed25519 key and signature types with secure memory handling.
//!
//! [`PrivateKey`] holds the 32-byte Ed25519 seed and is zeroized on drop.
//! It intentionally does not implement `Clone`; key material is moved, not
//! copied, and derived fresh from the vault for each signing operation.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::Hash256;
use crate::TypesError;

/// An Ed25519 public key, displayed as `ed25519:<hex>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verifies `sig` over `hash`.
    ///
    /// Returns `false` for malformed keys as well as invalid signatures.
    #[must_use]
    pub fn verify_hash(&self, hash: &Hash256, sig: &Signature) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig.0);
        vk.verify(hash.as_bytes(), &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ed25519:{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.strip_prefix("ed25519:").unwrap_or(s);
        let mut buf = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut buf)
            .map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        Ok(Self(buf))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// An Ed25519 private key derived from a 32-byte seed.
///
/// The seed is zeroized when the key is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    seed: [u8; 32],
}

impl PrivateKey {
    /// Creates a private key from a 32-byte Ed25519 seed. The caller keeps
    /// ownership of `seed` and remains responsible for wiping it.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self { seed: *seed }
    }

    /// Returns the corresponding public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let sk = SigningKey::from_bytes(&self.seed);
        PublicKey(sk.verifying_key().to_bytes())
    }

    /// Signs a 32-byte hash.
    #[must_use]
    pub fn sign_hash(&self, hash: &Hash256) -> Signature {
        let sk = SigningKey::from_bytes(&self.seed);
        Signature(sk.sign(hash.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").finish_non_exhaustive()
    }
}

/// A 64-byte Ed25519 signature, hex in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl Signature {
    /// Returns the signature as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Signature {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buf = [0u8; 64];
        hex::decode_to_slice(s, &mut buf).map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        Ok(Self(buf))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::blake2b_sum;

    #[test]
    fn test_sign_and_verify() {
        let sk = PrivateKey::from_seed(&[7u8; 32]);
        let pk = sk.public_key();
        let h = blake2b_sum(b"message");

        let sig = sk.sign_hash(&h);
        assert!(pk.verify_hash(&h, &sig));
        assert!(!pk.verify_hash(&blake2b_sum(b"other"), &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let sk = PrivateKey::from_seed(&[7u8; 32]);
        let other = PrivateKey::from_seed(&[8u8; 32]).public_key();
        let h = blake2b_sum(b"message");
        let sig = sk.sign_hash(&h);
        assert!(!other.verify_hash(&h, &sig));
    }

    #[test]
    fn test_public_key_string_round_trip() {
        let pk = PrivateKey::from_seed(&[1u8; 32]).public_key();
        let s = pk.to_string();
        assert!(s.starts_with("ed25519:"));
        let parsed: PublicKey = s.parse().expect("parse");
        assert_eq!(pk, parsed);
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let sk = PrivateKey::from_seed(&[0x42u8; 32]);
        let out = format!("{sk:?}");
        assert!(!out.contains("42"));
    }
}
