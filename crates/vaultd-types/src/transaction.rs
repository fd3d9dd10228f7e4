//! Transaction types, v1 and v2.
//!
//! Only the fields the signing vault needs are modeled: inputs with their
//! unlock conditions or spend policies, outputs, miner fees, arbitrary data,
//! and the signature entries themselves.

use serde::{Deserialize, Serialize};

use crate::address::{Address, UnlockConditions};
use crate::encoding::{Encoder, SiaEncodable};
use crate::hash::Hash256;
use crate::policy::SatisfiedPolicy;

/// An amount of currency, encoded as length-prefixed big-endian bytes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Currency(pub u128);

impl SiaEncodable for Currency {
    fn encode_to(&self, e: &mut Encoder) {
        let be = self.0.to_be_bytes();
        let start = be.iter().position(|&b| b != 0).unwrap_or(be.len());
        e.write_prefixed_bytes(&be[start..]);
    }
}

/// A v1 siacoin input, spending an output under its unlock conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiacoinInput {
    /// The ID of the output being spent.
    #[serde(rename = "parentID")]
    pub parent_id: Hash256,
    /// The conditions under which the output may be spent.
    pub unlock_conditions: UnlockConditions,
}

impl SiaEncodable for SiacoinInput {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bytes(self.parent_id.as_bytes());
        self.unlock_conditions.encode_to(e);
    }
}

/// A v1 siacoin output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiacoinOutput {
    /// The amount of the output.
    pub value: Currency,
    /// The address the output is sent to.
    pub address: Address,
}

impl SiaEncodable for SiacoinOutput {
    fn encode_to(&self, e: &mut Encoder) {
        self.value.encode_to(e);
        self.address.encode_to(e);
    }
}

/// A v1 siafund input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiafundInput {
    /// The ID of the output being spent.
    #[serde(rename = "parentID")]
    pub parent_id: Hash256,
    /// The conditions under which the output may be spent.
    pub unlock_conditions: UnlockConditions,
    /// The address claim siacoins are sent to.
    pub claim_address: Address,
}

impl SiaEncodable for SiafundInput {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bytes(self.parent_id.as_bytes());
        self.unlock_conditions.encode_to(e);
        self.claim_address.encode_to(e);
    }
}

/// A v1 siafund output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiafundOutput {
    /// The number of siafunds.
    pub value: u64,
    /// The address the output is sent to.
    pub address: Address,
}

impl SiaEncodable for SiafundOutput {
    fn encode_to(&self, e: &mut Encoder) {
        Currency(u128::from(self.value)).encode_to(e);
        self.address.encode_to(e);
    }
}

/// Which parts of a v1 transaction a signature covers.
///
/// If `whole_transaction` is set, the individual index lists other than
/// `signatures` must be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoveredFields {
    /// Covers every field of the transaction.
    pub whole_transaction: bool,
    /// Indices of covered siacoin inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_inputs: Vec<u64>,
    /// Indices of covered siacoin outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_outputs: Vec<u64>,
    /// Indices of covered siafund inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_inputs: Vec<u64>,
    /// Indices of covered siafund outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_outputs: Vec<u64>,
    /// Indices of covered miner fees.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub miner_fees: Vec<u64>,
    /// Indices of covered arbitrary data entries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arbitrary_data: Vec<u64>,
    /// Indices of covered signatures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<u64>,
}

impl CoveredFields {
    /// Returns covered fields spanning the whole transaction.
    #[must_use]
    pub fn whole_transaction() -> Self {
        Self {
            whole_transaction: true,
            ..Self::default()
        }
    }
}

impl SiaEncodable for CoveredFields {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bool(self.whole_transaction);
        for list in [
            &self.siacoin_inputs,
            &self.siacoin_outputs,
            &self.siafund_inputs,
            &self.siafund_outputs,
            &self.miner_fees,
            &self.arbitrary_data,
            &self.signatures,
        ] {
            list.as_slice().encode_to(e);
        }
    }
}

/// A signature entry on a v1 transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSignature {
    /// The ID of the input this signature spends.
    #[serde(rename = "parentID")]
    pub parent_id: Hash256,
    /// The index of the key within the input's unlock conditions.
    #[serde(default)]
    pub public_key_index: u64,
    /// The height before which the signature is invalid.
    #[serde(default)]
    pub timelock: u64,
    /// Which parts of the transaction the signature covers.
    #[serde(default)]
    pub covered_fields: CoveredFields,
    /// The signature bytes; empty until signed.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl SiaEncodable for TransactionSignature {
    fn encode_to(&self, e: &mut Encoder) {
        e.write_bytes(self.parent_id.as_bytes());
        e.write_u64(self.public_key_index);
        e.write_u64(self.timelock);
        self.covered_fields.encode_to(e);
        e.write_prefixed_bytes(&self.signature);
    }
}

/// A v1 transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    /// The siacoin inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_inputs: Vec<SiacoinInput>,
    /// The siacoin outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_outputs: Vec<SiacoinOutput>,
    /// The siafund inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_inputs: Vec<SiafundInput>,
    /// The siafund outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_outputs: Vec<SiafundOutput>,
    /// The miner fees.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub miner_fees: Vec<Currency>,
    /// Arbitrary data entries, hex in JSON.
    #[serde(skip_serializing_if = "Vec::is_empty", with = "hex_entries")]
    pub arbitrary_data: Vec<Vec<u8>>,
    /// The signatures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<TransactionSignature>,
}

/// A v2 siacoin input, spending an output under its spend policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2SiacoinInput {
    /// The ID of the output being spent.
    #[serde(rename = "parentID")]
    pub parent_id: Hash256,
    /// The policy and the signatures satisfying it.
    pub satisfied_policy: SatisfiedPolicy,
}

/// A v2 siacoin output; identical in shape to v1.
pub type V2SiacoinOutput = SiacoinOutput;

/// A v2 siafund input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2SiafundInput {
    /// The ID of the output being spent.
    #[serde(rename = "parentID")]
    pub parent_id: Hash256,
    /// The address claim siacoins are sent to.
    pub claim_address: Address,
    /// The policy and the signatures satisfying it.
    pub satisfied_policy: SatisfiedPolicy,
}

/// A v2 transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct V2Transaction {
    /// The siacoin inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_inputs: Vec<V2SiacoinInput>,
    /// The siacoin outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siacoin_outputs: Vec<V2SiacoinOutput>,
    /// The siafund inputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_inputs: Vec<V2SiafundInput>,
    /// The siafund outputs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub siafund_outputs: Vec<SiafundOutput>,
    /// The miner fee.
    #[serde(skip_serializing_if = "currency_is_zero")]
    pub miner_fee: Currency,
    /// Arbitrary data, hex in JSON.
    #[serde(skip_serializing_if = "Vec::is_empty", with = "hex::serde")]
    pub arbitrary_data: Vec<u8>,
}

fn currency_is_zero(c: &Currency) -> bool {
    c.0 == 0
}

mod hex_entries {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_encoding_strips_leading_zeros() {
        let mut e = Encoder::new();
        Currency(0x0100).encode_to(&mut e);
        let mut expected = Encoder::new();
        expected.write_prefixed_bytes(&[0x01, 0x00]);
        assert_eq!(e.finalize(), expected.finalize());
    }

    #[test]
    fn test_currency_zero_encodes_empty() {
        let mut e = Encoder::new();
        Currency(0).encode_to(&mut e);
        let mut expected = Encoder::new();
        expected.write_prefixed_bytes(&[]);
        assert_eq!(e.finalize(), expected.finalize());
    }

    #[test]
    fn test_transaction_json_round_trip() {
        let txn = Transaction {
            siacoin_inputs: vec![SiacoinInput {
                parent_id: crate::blake2b_sum(b"parent"),
                unlock_conditions: UnlockConditions::default(),
            }],
            signatures: vec![TransactionSignature {
                parent_id: crate::blake2b_sum(b"parent"),
                covered_fields: CoveredFields::whole_transaction(),
                ..TransactionSignature::default()
            }],
            ..Transaction::default()
        };
        let json = serde_json::to_string(&txn).expect("serialize");
        let back: Transaction = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(txn, back);
    }

    #[test]
    fn test_unsigned_signature_entry_omits_signature_field() {
        let sig = TransactionSignature::default();
        let json = serde_json::to_string(&sig).expect("serialize");
        assert!(!json.contains("\"signature\""));
    }
}
