//! Spend policies.
//!
//! A spend policy is a recursive description of who may spend an output.
//! Policies are a tagged variant; evaluation and satisfaction are pure
//! matches on the tag.

use serde::{Deserialize, Serialize};

use crate::address::UnlockConditions;
use crate::encoding::{Encoder, SiaEncodable};
use crate::hash::Hash256;
use crate::keys::{PublicKey, Signature};

/// A recursive description of the conditions for spending an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "policy")]
pub enum SpendPolicy {
    /// Valid only at or above a block height.
    #[serde(rename = "above")]
    Above(u64),

    /// Valid only at or after a Unix timestamp.
    #[serde(rename = "after")]
    After(u64),

    /// Requires a signature from the given key.
    #[serde(rename = "pk")]
    PublicKey(PublicKey),

    /// Requires the preimage of the given hash.
    #[serde(rename = "hash")]
    Hash(Hash256),

    /// Requires `n` of the sub-policies to be satisfied.
    #[serde(rename = "thresh")]
    Threshold {
        /// How many of the sub-policies must be satisfied.
        n: u8,
        /// The sub-policies.
        of: Vec<SpendPolicy>,
    },

    /// Requires the conditions to be satisfied in full.
    #[serde(rename = "uc")]
    UnlockConditions(UnlockConditions),

    /// A policy whose preimage is not known; cannot be satisfied.
    #[serde(rename = "opaque")]
    Opaque(crate::address::Address),
}

impl SiaEncodable for SpendPolicy {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_u8(1); // policy version
        self.encode_inner(e);
    }
}

impl SpendPolicy {
    fn encode_inner(&self, e: &mut Encoder) {
        match self {
            Self::Above(height) => {
                e.write_u8(1);
                e.write_u64(*height);
            }
            Self::After(timestamp) => {
                e.write_u8(2);
                e.write_u64(*timestamp);
            }
            Self::PublicKey(pk) => {
                e.write_u8(3);
                e.write_bytes(pk.as_bytes());
            }
            Self::Hash(h) => {
                e.write_u8(4);
                e.write_bytes(h.as_bytes());
            }
            Self::Threshold { n, of } => {
                e.write_u8(5);
                e.write_u8(*n);
                e.write_u8(of.len() as u8);
                for sub in of {
                    sub.encode_inner(e);
                }
            }
            Self::Opaque(addr) => {
                e.write_u8(6);
                e.write_bytes(&addr.0);
            }
            Self::UnlockConditions(uc) => {
                e.write_u8(7);
                uc.encode_to(e);
            }
        }
    }
}

/// A spend policy together with the signatures and preimages that satisfy
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatisfiedPolicy {
    /// The policy being satisfied.
    pub policy: SpendPolicy,
    /// Signatures, in policy traversal order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<Signature>,
    /// Hash preimages, in policy traversal order.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "hex_vec")]
    pub preimages: Vec<Vec<u8>>,
}

impl From<SpendPolicy> for SatisfiedPolicy {
    fn from(policy: SpendPolicy) -> Self {
        Self {
            policy,
            signatures: Vec::new(),
            preimages: Vec::new(),
        }
    }
}

mod hex_vec {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(v.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| hex::decode(s).map_err(D::Error::custom))
            .collect()
    }
}
