//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultd_core::SeedMeta;
use vaultd_types::{
    Address, ConsensusState, Hash256, Network, PublicKey, Signature, SpendPolicy, Transaction,
    V2Transaction,
};

/// Daemon build and runtime information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    /// The daemon version.
    pub version: String,
    /// The VCS commit the daemon was built from.
    pub commit: String,
    /// The operating system the daemon runs on.
    pub os: String,
    /// When the daemon was built.
    pub build_time: DateTime<Utc>,
    /// When the daemon started.
    pub start_time: DateTime<Utc>,
}

/// A request to unlock the vault.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// The vault secret.
    pub secret: String,
}

/// A request to import a seed from a recovery phrase.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddSeedRequest {
    /// The recovery phrase: 12 BIP39 words or 28/29 legacy words.
    pub phrase: String,
}

/// A page of seed metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct SeedsResponse {
    /// The seeds, ordered by creation time.
    pub seeds: Vec<SeedMeta>,
}

/// A derived key with its standard address and spend policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedKey {
    /// The public key.
    pub public_key: PublicKey,
    /// The address of the key's standard unlock conditions.
    pub address: Address,
    /// The standard single-key spend policy.
    pub spend_policy: SpendPolicy,
}

/// A page of derived keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct SeedKeysResponse {
    /// The keys, ordered by derivation index.
    pub keys: Vec<SeedKey>,
}

/// A request to derive keys from a seed.
#[derive(Debug, Serialize, Deserialize)]
pub struct SeedDeriveRequest {
    /// How many keys to derive.
    pub count: u64,
}

/// A request to sign a v1 transaction.
///
/// `state` and `network` must be provided together; when both are omitted
/// the daemon signs against the current chain tip.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignRequest {
    /// The consensus state to sign against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConsensusState>,
    /// The network parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// The transaction to sign.
    pub transaction: Transaction,
}

/// The response to a v1 sign request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// The transaction with filled signatures.
    pub transaction: Transaction,
    /// Whether every signature entry is now filled.
    pub fully_signed: bool,
}

/// A request to sign a v2 transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignV2Request {
    /// The consensus state to sign against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConsensusState>,
    /// The network parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// The transaction to sign.
    pub transaction: V2Transaction,
}

/// The response to a v2 sign request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignV2Response {
    /// The transaction with appended policy signatures.
    pub transaction: V2Transaction,
    /// Whether every input's policy was satisfied.
    pub fully_signed: bool,
}

/// A request to sign an arbitrary 32-byte digest.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindSignRequest {
    /// The key to sign with.
    pub public_key: PublicKey,
    /// The digest to sign.
    pub sig_hash: Hash256,
}

/// The response to a blind-sign request.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlindSignResponse {
    /// The signature over the digest.
    pub signature: Signature,
}
