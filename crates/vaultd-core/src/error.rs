//! Error types for vault operations.

/// Errors returned by the vault and its store.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault is locked; no seed material is accessible.
    #[error("vault is locked")]
    Locked,

    /// The vault is already unlocked.
    #[error("already unlocked")]
    Unlocked,

    /// The supplied secret does not match the stored seeds.
    #[error("incorrect secret")]
    IncorrectSecret,

    /// The requested seed or signing key does not exist.
    #[error("not found")]
    NotFound,

    /// The key salt has already been set and cannot change.
    #[error("salt already set")]
    SaltSet,

    /// A stored blob or derived buffer had an unexpected size.
    #[error("invalid key size")]
    InvalidSize,

    /// The vault has been closed and accepts no further operations.
    #[error("vault is closed")]
    Closed,

    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),

    /// A cryptographic primitive failed; never caused by user input.
    #[error("crypto failure: {0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(VaultError::Locked.to_string(), "vault is locked");
        assert_eq!(VaultError::Unlocked.to_string(), "already unlocked");
        assert_eq!(VaultError::IncorrectSecret.to_string(), "incorrect secret");
        assert_eq!(VaultError::NotFound.to_string(), "not found");
        assert_eq!(VaultError::SaltSet.to_string(), "salt already set");
    }
}
