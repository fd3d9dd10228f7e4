//! Consensus types for the vaultd signing vault.
//!
//! This crate provides the subset of chain types the vault needs to derive
//! addresses and compute signature hashes: 32-byte hashes and Ed25519 keys,
//! the binary encoding those hashes are computed over, unlock conditions and
//! their addresses, spend policies, and the v1/v2 transaction shapes together
//! with the consensus-state sighash functions.
//!
//! All fixed-size byte types serialize as lowercase hex strings in JSON;
//! addresses carry a 6-byte checksum suffix.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod consensus;
mod encoding;
mod hash;
mod keys;
mod policy;
mod transaction;

pub use address::{standard_unlock_conditions, Address, UnlockConditions, UnlockKey};
pub use consensus::{ChainIndex, ConsensusState, HardforkFoundation, HardforkV2, Network};
pub use encoding::{Encoder, SiaEncodable};
pub use hash::{blake2b_sum, Hash256, Specifier, SPECIFIER_ED25519};
pub use keys::{PrivateKey, PublicKey, Signature};
pub use policy::{SatisfiedPolicy, SpendPolicy};
pub use transaction::{
    CoveredFields, Currency, SiacoinInput, SiacoinOutput, SiafundInput, SiafundOutput, Transaction,
    TransactionSignature, V2SiacoinInput, V2SiacoinOutput, V2SiafundInput, V2Transaction,
};

/// Errors produced when working with consensus types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A hex string could not be decoded, or had the wrong length.
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// An address checksum did not match its payload.
    #[error("invalid address checksum")]
    InvalidChecksum,

    /// A covered-fields index referenced a transaction element that does
    /// not exist.
    #[error("covered fields index {index} out of range for {field}")]
    InvalidCoveredFields {
        /// The name of the covered field.
        field: &'static str,
        /// The out-of-range index.
        index: u64,
    },

    /// The bytes do not form a valid Ed25519 public key.
    #[error("invalid ed25519 public key")]
    InvalidPublicKey,
}
