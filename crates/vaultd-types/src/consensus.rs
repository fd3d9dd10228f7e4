//! Consensus state and signature hashing.
//!
//! [`ConsensusState`] pairs a chain index with the network parameters that
//! govern it. It computes the three signature-hash flavors the vault signs:
//! the v1 whole-transaction and partial hashes, and the single v2 input
//! hash. The v1 hashes inject a replay prefix that changes across hardforks
//! so signatures cannot be replayed on the other side of a fork.

use serde::{Deserialize, Serialize};

use crate::encoding::{Encoder, SiaEncodable};
use crate::hash::Hash256;
use crate::transaction::{CoveredFields, Transaction, V2Transaction};
use crate::TypesError;

/// Activation heights for the v2 hardfork.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardforkV2 {
    /// The height at which v2 transactions become valid.
    pub allow_height: u64,
    /// The height at which v1 transactions become invalid.
    pub require_height: u64,
}

/// Activation height for the Foundation hardfork.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardforkFoundation {
    /// The height at which the hardfork activates.
    pub height: u64,
}

/// The consensus parameters of a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Human-readable network name.
    pub name: String,
    /// Foundation hardfork activation.
    #[serde(default)]
    pub hardfork_foundation: HardforkFoundation,
    /// V2 hardfork activation.
    #[serde(rename = "hardforkV2", default)]
    pub hardfork_v2: HardforkV2,
}

impl Network {
    /// The production network.
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            hardfork_foundation: HardforkFoundation { height: 298_000 },
            hardfork_v2: HardforkV2 {
                allow_height: 526_000,
                require_height: 530_000,
            },
        }
    }

    /// The Zen test network.
    #[must_use]
    pub fn zen() -> Self {
        Self {
            name: "zen".to_string(),
            hardfork_foundation: HardforkFoundation { height: 10 },
            hardfork_v2: HardforkV2 {
                allow_height: 112_000,
                require_height: 114_000,
            },
        }
    }
}

/// A position in the blockchain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainIndex {
    /// The block height.
    pub height: u64,
    /// The block ID at that height.
    #[serde(default)]
    pub id: Hash256,
}

/// The consensus state a signature hash is computed against.
///
/// The network is carried out-of-band in API requests and attached after
/// deserialization, so it is skipped by serde.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusState {
    /// The current chain index.
    pub index: ChainIndex,
    /// The network parameters.
    #[serde(skip)]
    pub network: Network,
}

impl ConsensusState {
    /// The replay prefix written before each input in v1 signature hashes.
    /// It changes across hardforks, invalidating pre-fork signatures on the
    /// post-fork chain and vice versa.
    #[must_use]
    pub fn replay_prefix(&self) -> &'static [u8] {
        if self.index.height >= self.network.hardfork_v2.allow_height {
            &[2]
        } else if self.index.height >= self.network.hardfork_foundation.height {
            &[1]
        } else {
            &[]
        }
    }

    /// Computes the hash of an entire v1 transaction for the signature
    /// entry identified by `parent_id`, `public_key_index`, and `timelock`.
    /// `covered_sigs` lists indices of other signatures covered by this one.
    #[must_use]
    pub fn whole_sig_hash(
        &self,
        txn: &Transaction,
        parent_id: Hash256,
        public_key_index: u64,
        timelock: u64,
        covered_sigs: &[u64],
    ) -> Hash256 {
        let mut e = Encoder::new();

        e.write_prefix(txn.siacoin_inputs.len());
        for input in &txn.siacoin_inputs {
            e.write_bytes(self.replay_prefix());
            input.encode_to(&mut e);
        }
        e.write_prefix(txn.siacoin_outputs.len());
        for output in &txn.siacoin_outputs {
            output.encode_to(&mut e);
        }
        e.write_prefix(txn.siafund_inputs.len());
        for input in &txn.siafund_inputs {
            e.write_bytes(self.replay_prefix());
            input.encode_to(&mut e);
        }
        e.write_prefix(txn.siafund_outputs.len());
        for output in &txn.siafund_outputs {
            output.encode_to(&mut e);
        }
        e.write_prefix(txn.miner_fees.len());
        for fee in &txn.miner_fees {
            fee.encode_to(&mut e);
        }
        e.write_prefix(txn.arbitrary_data.len());
        for data in &txn.arbitrary_data {
            e.write_prefixed_bytes(data);
        }

        e.write_bytes(parent_id.as_bytes());
        e.write_u64(public_key_index);
        e.write_u64(timelock);
        for &i in covered_sigs {
            if let Some(sig) = txn.signatures.get(i as usize) {
                sig.encode_to(&mut e);
            }
        }
        e.finalize()
    }

    /// Computes the hash of the covered subset of a v1 transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::InvalidCoveredFields`] if any covered index is
    /// out of range.
    pub fn partial_sig_hash(
        &self,
        txn: &Transaction,
        covered: &CoveredFields,
    ) -> Result<Hash256, TypesError> {
        fn pick<'a, T>(
            items: &'a [T],
            indices: &[u64],
            field: &'static str,
        ) -> Result<Vec<&'a T>, TypesError> {
            indices
                .iter()
                .map(|&i| {
                    items
                        .get(i as usize)
                        .ok_or(TypesError::InvalidCoveredFields { field, index: i })
                })
                .collect()
        }

        let mut e = Encoder::new();
        for input in pick(&txn.siacoin_inputs, &covered.siacoin_inputs, "siacoinInputs")? {
            e.write_bytes(self.replay_prefix());
            input.encode_to(&mut e);
        }
        for output in pick(
            &txn.siacoin_outputs,
            &covered.siacoin_outputs,
            "siacoinOutputs",
        )? {
            output.encode_to(&mut e);
        }
        for input in pick(&txn.siafund_inputs, &covered.siafund_inputs, "siafundInputs")? {
            e.write_bytes(self.replay_prefix());
            input.encode_to(&mut e);
        }
        for output in pick(
            &txn.siafund_outputs,
            &covered.siafund_outputs,
            "siafundOutputs",
        )? {
            output.encode_to(&mut e);
        }
        for fee in pick(&txn.miner_fees, &covered.miner_fees, "minerFees")? {
            fee.encode_to(&mut e);
        }
        for data in pick(&txn.arbitrary_data, &covered.arbitrary_data, "arbitraryData")? {
            e.write_prefixed_bytes(data);
        }
        for sig in pick(&txn.signatures, &covered.signatures, "signatures")? {
            sig.encode_to(&mut e);
        }
        Ok(e.finalize())
    }

    /// Computes the hash signed by every input of a v2 transaction. The
    /// hash covers the whole transaction except the signatures being added.
    #[must_use]
    pub fn input_sig_hash(&self, txn: &V2Transaction) -> Hash256 {
        let mut e = Encoder::with_distinguisher("sig/input");

        e.write_prefix(txn.siacoin_inputs.len());
        for input in &txn.siacoin_inputs {
            e.write_bytes(input.parent_id.as_bytes());
            input.satisfied_policy.policy.encode_to(&mut e);
        }
        e.write_prefix(txn.siacoin_outputs.len());
        for output in &txn.siacoin_outputs {
            output.encode_to(&mut e);
        }
        e.write_prefix(txn.siafund_inputs.len());
        for input in &txn.siafund_inputs {
            e.write_bytes(input.parent_id.as_bytes());
            input.claim_address.encode_to(&mut e);
            input.satisfied_policy.policy.encode_to(&mut e);
        }
        e.write_prefix(txn.siafund_outputs.len());
        for output in &txn.siafund_outputs {
            output.encode_to(&mut e);
        }
        txn.miner_fee.encode_to(&mut e);
        e.write_prefixed_bytes(&txn.arbitrary_data);
        e.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::standard_unlock_conditions;
    use crate::hash::blake2b_sum;
    use crate::keys::PrivateKey;
    use crate::transaction::SiacoinInput;

    fn test_state(height: u64) -> ConsensusState {
        ConsensusState {
            index: ChainIndex {
                height,
                id: Hash256::default(),
            },
            network: Network {
                name: "test".to_string(),
                hardfork_foundation: HardforkFoundation { height: 0 },
                hardfork_v2: HardforkV2 {
                    allow_height: 10,
                    require_height: 20,
                },
            },
        }
    }

    fn one_input_txn() -> Transaction {
        let pk = PrivateKey::from_seed(&[9u8; 32]).public_key();
        Transaction {
            siacoin_inputs: vec![SiacoinInput {
                parent_id: blake2b_sum(b"parent"),
                unlock_conditions: standard_unlock_conditions(pk),
            }],
            ..Transaction::default()
        }
    }

    #[test]
    fn test_replay_prefix_changes_across_hardforks() {
        assert_eq!(test_state(5).replay_prefix(), &[1]);
        assert_eq!(test_state(10).replay_prefix(), &[2]);

        let mut pre_foundation = test_state(5);
        pre_foundation.network.hardfork_foundation.height = 100;
        assert_eq!(pre_foundation.replay_prefix(), &[] as &[u8]);
    }

    #[test]
    fn test_whole_sig_hash_differs_across_allow_height() {
        let txn = one_input_txn();
        let parent = txn.siacoin_inputs[0].parent_id;
        let h8 = test_state(8).whole_sig_hash(&txn, parent, 0, 0, &[]);
        let h10 = test_state(10).whole_sig_hash(&txn, parent, 0, 0, &[]);
        assert_ne!(h8, h10);
    }

    #[test]
    fn test_whole_sig_hash_is_deterministic() {
        let txn = one_input_txn();
        let parent = txn.siacoin_inputs[0].parent_id;
        let cs = test_state(5);
        assert_eq!(
            cs.whole_sig_hash(&txn, parent, 0, 0, &[]),
            cs.whole_sig_hash(&txn, parent, 0, 0, &[])
        );
    }

    #[test]
    fn test_partial_sig_hash_rejects_bad_index() {
        let txn = one_input_txn();
        let covered = CoveredFields {
            siacoin_inputs: vec![3],
            ..CoveredFields::default()
        };
        let err = test_state(5).partial_sig_hash(&txn, &covered).unwrap_err();
        assert!(matches!(err, TypesError::InvalidCoveredFields { index: 3, .. }));
    }

    #[test]
    fn test_partial_sig_hash_covers_selected_inputs() {
        let txn = one_input_txn();
        let cs = test_state(5);
        let some = cs
            .partial_sig_hash(
                &txn,
                &CoveredFields {
                    siacoin_inputs: vec![0],
                    ..CoveredFields::default()
                },
            )
            .expect("valid indices");
        let none = cs
            .partial_sig_hash(&txn, &CoveredFields::default())
            .expect("valid indices");
        assert_ne!(some, none);
    }

    #[test]
    fn test_network_presets() {
        assert!(Network::mainnet().hardfork_v2.allow_height < Network::mainnet().hardfork_v2.require_height);
        assert!(Network::zen().hardfork_v2.allow_height < Network::zen().hardfork_v2.require_height);
    }
}
