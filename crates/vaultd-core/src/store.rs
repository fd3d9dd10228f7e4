//! The persistence interface the vault operates over.
//!
//! The store sees only opaque blobs: encrypted seeds, their MACs, and the
//! public keys derived from them. It performs no cryptography and never
//! holds plaintext seed material.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultd_types::{Hash256, PublicKey};

use crate::VaultError;

/// A unique identifier for a stored seed, assigned on first insertion.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeedId(pub i64);

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata about a stored seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMeta {
    /// The seed's identifier.
    pub id: SeedId,
    /// The highest derivation index used so far, or 0 if no keys have been
    /// derived.
    pub last_index: u64,
    /// When the seed was first inserted.
    pub created_at: DateTime<Utc>,
}

/// A persistent store for encrypted seeds and derived keys.
///
/// Implementations must be single-writer transactional: each method is one
/// atomic operation.
pub trait Store: Send + Sync {
    /// Returns the seed and index associated with a public key, or
    /// [`VaultError::NotFound`].
    fn signing_key_index(&self, pk: PublicKey) -> Result<(SeedId, u64), VaultError>;

    /// Associates a public key with a seed and derivation index. If the key
    /// is already present the call is a no-op.
    fn add_key_index(&self, id: SeedId, pk: PublicKey, index: u64) -> Result<(), VaultError>;

    /// Returns the next derivation index for a seed: one past the highest
    /// index in use, or 0 if no keys exist. [`VaultError::NotFound`] if the
    /// seed does not exist.
    fn next_index(&self, id: SeedId) -> Result<u64, VaultError>;

    /// Returns the salt used to derive the key-encryption key, or `None`
    /// if no salt has been set yet.
    fn key_salt(&self) -> Result<Option<[u8; 32]>, VaultError>;

    /// Sets the key-derivation salt. Returns [`VaultError::SaltSet`] if a
    /// salt is already present; the salt is write-once.
    fn set_key_salt(&self, salt: &[u8; 32]) -> Result<(), VaultError>;

    /// Returns an arbitrary encrypted seed blob for verifying the derived
    /// encryption key, or [`VaultError::NotFound`] if no seeds exist.
    fn bytes_for_verify(&self) -> Result<Vec<u8>, VaultError>;

    /// Inserts an encrypted seed keyed by its MAC. If a seed with the same
    /// MAC exists, the existing row's metadata is returned.
    fn add_seed(&self, mac: Hash256, encrypted_seed: &[u8]) -> Result<SeedMeta, VaultError>;

    /// Returns the encrypted seed blob, or [`VaultError::NotFound`].
    fn seed(&self, id: SeedId) -> Result<Vec<u8>, VaultError>;

    /// Returns metadata about a seed, or [`VaultError::NotFound`].
    fn seed_meta(&self, id: SeedId) -> Result<SeedMeta, VaultError>;

    /// Returns a page of public keys derived from the seed, ordered by
    /// derivation index. [`VaultError::NotFound`] if the seed does not
    /// exist.
    fn seed_keys(
        &self,
        id: SeedId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PublicKey>, VaultError>;

    /// Returns a page of seed metadata ordered by creation time.
    fn seeds(&self, limit: usize, offset: usize) -> Result<Vec<SeedMeta>, VaultError>;
}
