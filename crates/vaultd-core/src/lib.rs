//! The vault core.
//!
//! [`Vault`] owns the lock/unlock state machine and every operation that
//! touches plaintext seed material: importing seeds, deriving keys, and
//! signing hashes. Seeds are encrypted at rest with XChaCha20-Poly1305
//! under a key derived from the user's secret with Argon2id, and
//! deduplicated by a keyed BLAKE2b MAC of the plaintext.
//!
//! The [`signer`] module implements the transaction-signing policy
//! evaluators on top of the vault: v1 covered-field signing and v2
//! recursive spend-policy satisfaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod signer;
mod store;
mod vault;

pub use error::VaultError;
pub use store::{SeedId, SeedMeta, Store};
pub use vault::{Vault, ENCRYPTED_SEED_LEN, KEY_SALT_LEN, SEED_MAC_LEN};
