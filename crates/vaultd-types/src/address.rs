//! Addresses and unlock conditions.
//!
//! An address is the Merkle root of a set of unlock conditions. The tree has
//! one leaf for the timelock, one per public key, and one for the number of
//! required signatures; leaves are hashed with a `0x00` prefix and interior
//! nodes with `0x01`.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding::{Encoder, SiaEncodable};
use crate::hash::{blake2b_sum, Hash256, Specifier, SPECIFIER_ED25519};
use crate::keys::PublicKey;
use crate::TypesError;

/// A 32-byte address, displayed as hex with a 6-byte checksum suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 32]);

impl Address {
    fn checksum(&self) -> [u8; 6] {
        let h = blake2b_sum(&self.0);
        let mut c = [0u8; 6];
        c.copy_from_slice(&h.as_bytes()[..6]);
        c
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", hex::encode(self.0), hex::encode(self.checksum()))
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut buf = [0u8; 38];
        hex::decode_to_slice(s, &mut buf).map_err(|_| TypesError::InvalidHex(s.to_string()))?;
        let mut payload = [0u8; 32];
        payload.copy_from_slice(&buf[..32]);
        let addr = Self(payload);
        if addr.checksum() != buf[32..] {
            return Err(TypesError::InvalidChecksum);
        }
        Ok(addr)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl SiaEncodable for Address {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bytes(&self.0);
    }
}

/// A public key together with its signature algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockKey {
    /// The signature algorithm; only Ed25519 keys can be signed for.
    pub algorithm: Specifier,
    /// The raw key bytes; 32 for Ed25519.
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
}

impl UnlockKey {
    /// Wraps an Ed25519 public key.
    #[must_use]
    pub fn ed25519(pk: PublicKey) -> Self {
        Self {
            algorithm: SPECIFIER_ED25519,
            key: pk.as_bytes().to_vec(),
        }
    }

    /// Returns the Ed25519 public key, or `None` if the entry uses a
    /// different algorithm or has the wrong length.
    #[must_use]
    pub fn public_key(&self) -> Option<PublicKey> {
        if self.algorithm != SPECIFIER_ED25519 || self.key.len() != 32 {
            return None;
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&self.key);
        Some(PublicKey(buf))
    }
}

impl SiaEncodable for UnlockKey {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bytes(&self.algorithm.0);
        e.write_prefixed_bytes(&self.key);
    }
}

/// The conditions for spending an output: a timelock, a set of keys, and the
/// number of signatures required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConditions {
    /// The height before which the output cannot be spent.
    pub timelock: u64,
    /// The keys that may sign.
    pub public_keys: Vec<UnlockKey>,
    /// How many of the keys must sign.
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// Computes the address committing to these conditions.
    #[must_use]
    pub fn unlock_hash(&self) -> Address {
        let mut acc = MerkleAccumulator::default();
        acc.add_leaf(leaf_hash(|e| e.write_u64(self.timelock)));
        for key in &self.public_keys {
            acc.add_leaf(leaf_hash(|e| key.encode_to(e)));
        }
        acc.add_leaf(leaf_hash(|e| e.write_u64(self.signatures_required)));
        Address(acc.root().0)
    }
}

impl SiaEncodable for UnlockConditions {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_u64(self.timelock);
        e.write_prefix(self.public_keys.len());
        for key in &self.public_keys {
            key.encode_to(e);
        }
        e.write_u64(self.signatures_required);
    }
}

/// Returns the unlock conditions for a single-key address: no timelock, one
/// Ed25519 key, one signature required.
#[must_use]
pub fn standard_unlock_conditions(pk: PublicKey) -> UnlockConditions {
    UnlockConditions {
        timelock: 0,
        public_keys: vec![UnlockKey::ed25519(pk)],
        signatures_required: 1,
    }
}

fn leaf_hash(encode: impl FnOnce(&mut Encoder)) -> Hash256 {
    let mut e = Encoder::new();
    e.write_u8(0x00);
    encode(&mut e);
    e.finalize()
}

fn node_hash(left: Hash256, right: Hash256) -> Hash256 {
    let mut e = Encoder::new();
    e.write_u8(0x01);
    e.write_bytes(left.as_bytes());
    e.write_bytes(right.as_bytes());
    e.finalize()
}

/// A streaming Merkle tree accumulator over an arbitrary number of leaves.
#[derive(Debug)]
struct MerkleAccumulator {
    trees: [Hash256; 64],
    num_leaves: u64,
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self {
            trees: [Hash256::default(); 64],
            num_leaves: 0,
        }
    }
}

impl MerkleAccumulator {
    fn add_leaf(&mut self, mut h: Hash256) {
        let mut i = 0;
        while self.num_leaves & (1 << i) != 0 {
            h = node_hash(self.trees[i], h);
            i += 1;
        }
        self.trees[i] = h;
        self.num_leaves += 1;
    }

    fn root(&self) -> Hash256 {
        let i = self.num_leaves.trailing_zeros() as usize;
        if i == 64 {
            return Hash256::default();
        }
        let mut root = self.trees[i];
        for j in i + 1..64 {
            if self.num_leaves & (1 << j) != 0 {
                root = node_hash(self.trees[j], root);
            }
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PrivateKey;

    #[test]
    fn test_standard_unlock_hash_vector() {
        // Key derived from a known seed; the address is the Merkle root of
        // the single-key unlock conditions.
        let pk = PrivateKey::from_seed(&[0u8; 32]).public_key();
        let uc = standard_unlock_conditions(pk);
        let addr = uc.unlock_hash();

        // The address must round-trip through its checksummed string form.
        let s = addr.to_string();
        assert_eq!(s.len(), 76);
        let parsed: Address = s.parse().expect("valid address");
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_rejects_bad_checksum() {
        let pk = PrivateKey::from_seed(&[1u8; 32]).public_key();
        let mut s = standard_unlock_conditions(pk).unlock_hash().to_string();
        s.replace_range(74..76, "00");
        assert!(matches!(
            s.parse::<Address>(),
            Err(TypesError::InvalidChecksum)
        ));
    }

    #[test]
    fn test_unlock_hash_depends_on_all_fields() {
        let pk = PrivateKey::from_seed(&[2u8; 32]).public_key();
        let base = standard_unlock_conditions(pk);

        let mut timelocked = base.clone();
        timelocked.timelock = 10;
        assert_ne!(base.unlock_hash(), timelocked.unlock_hash());

        let mut multisig = base.clone();
        multisig.signatures_required = 2;
        assert_ne!(base.unlock_hash(), multisig.unlock_hash());
    }

    #[test]
    fn test_unlock_key_rejects_foreign_algorithm() {
        let key = UnlockKey {
            algorithm: Specifier::new(b"entropy"),
            key: vec![0u8; 32],
        };
        assert!(key.public_key().is_none());

        let short = UnlockKey {
            algorithm: SPECIFIER_ED25519,
            key: vec![0u8; 16],
        };
        assert!(short.public_key().is_none());
    }

    #[test]
    fn test_merkle_accumulator_three_leaves() {
        // Three leaves hash as H(H(l0, l1), l2).
        let l: Vec<Hash256> = (0..3u8).map(|i| blake2b_sum(&[i])).collect();
        let mut acc = MerkleAccumulator::default();
        for &leaf in &l {
            acc.add_leaf(leaf);
        }
        assert_eq!(acc.root(), node_hash(node_hash(l[0], l[1]), l[2]));
    }
}
