//! Recovery-phrase decoding and deterministic key derivation.
//!
//! Two phrase formats are supported, distinguished solely by word count:
//! 12-word BIP39 mnemonics, and the legacy 28/29-word dictionary encoding.
//! Both produce a 32-byte root seed from which signing keys are derived by
//! index.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dictionary;
mod legacy;

pub use dictionary::{DICTIONARY, DICTIONARY_SIZE};
pub use legacy::seed_to_phrase;

use zeroize::Zeroize;

use vaultd_types::{blake2b_sum, PrivateKey};

/// Errors produced while decoding a recovery phrase.
#[derive(Debug, thiserror::Error)]
pub enum PhraseError {
    /// The phrase does not have a supported word count.
    #[error("invalid phrase length, must be BIP39 12 word seed or 28 word legacy seed")]
    InvalidLength(usize),

    /// A legacy phrase word matched no dictionary entry.
    #[error("word not found in dictionary: {0}")]
    UnknownWord(String),

    /// The BIP39 mnemonic failed to parse.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(#[from] bip39::Error),
}

/// Decodes a recovery phrase into `seed`. The format is chosen by word
/// count: 12 words parse as BIP39, 28 or 29 as the legacy encoding.
///
/// # Errors
///
/// Returns [`PhraseError::InvalidLength`] for any other word count, and the
/// respective codec error for malformed phrases.
pub fn seed_from_phrase(seed: &mut [u8; 32], phrase: &str) -> Result<(), PhraseError> {
    match phrase.split_whitespace().count() {
        12 => seed_from_bip39(seed, phrase),
        28 | 29 => legacy::seed_from_phrase(seed, phrase),
        n => Err(PhraseError::InvalidLength(n)),
    }
}

/// Decodes a 12-word BIP39 mnemonic: the seed is the BLAKE2b-256 digest of
/// the mnemonic's entropy.
fn seed_from_bip39(seed: &mut [u8; 32], phrase: &str) -> Result<(), PhraseError> {
    let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase)?;
    let mut entropy = mnemonic.to_entropy();
    seed.copy_from_slice(blake2b_sum(&entropy).as_bytes());
    entropy.zeroize();
    Ok(())
}

/// Derives the Ed25519 key at `index` from a root seed.
///
/// The key's seed is `blake2b256(seed || le64(index))`, so derivation is
/// deterministic and each index yields an independent key.
#[must_use]
pub fn key_from_seed(seed: &[u8; 32], index: u64) -> PrivateKey {
    let mut buf = [0u8; 40];
    buf[..32].copy_from_slice(seed);
    buf[32..].copy_from_slice(&index.to_le_bytes());

    let mut key_seed = *blake2b_sum(&buf).as_bytes();
    let key = PrivateKey::from_seed(&key_seed);
    buf.zeroize();
    key_seed.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultd_types::standard_unlock_conditions;

    const LEGACY_PHRASE: &str = "mocked southern dehydrate unusual navy pegs aided ruined \
        festival yearbook total building wife greater befit drunk judge thwart erosion \
        hefty saucepan hijack request welders bomb remedy each sayings actress";

    const LEGACY_SEED_HEX: &str =
        "de67ef93cd0adb3418aa4ce71d2504636533b36d36a0d5211bfccc331dea7b41";

    fn legacy_seed() -> [u8; 32] {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(LEGACY_SEED_HEX, &mut seed).expect("valid hex");
        seed
    }

    #[test]
    fn test_dispatch_rejects_other_lengths() {
        let mut seed = [0u8; 32];
        for phrase in ["", "one", "one two three"] {
            assert!(matches!(
                seed_from_phrase(&mut seed, phrase),
                Err(PhraseError::InvalidLength(_))
            ));
        }
    }

    #[test]
    fn test_legacy_phrase_derives_known_addresses() {
        let mut seed = [0u8; 32];
        seed_from_phrase(&mut seed, LEGACY_PHRASE).expect("valid phrase");
        assert_eq!(seed, legacy_seed());

        let vectors: [(u64, &str); 5] = [
            (0, "744584e33df37f0f80a0904bba9d2a49eab1a740688c30cd100a662e096ada0941ab1076a84b"),
            (1, "2ff6a95ff4e9c182a87c9bfadccaa683efa6c4c76eff029cf020b1a027e85de785f916c16037"),
            (2, "5066c72993c12cd3e891fab423f8263e6178fedccdc82c4a227d9cbf4ff48a960c06a74815d7"),
            (
                9_223_372_036_854_775_807,
                "44a5019071a2c6b9633a16c654bee5c4f576acb0329f555317c974f84f3cfef746708ce85442",
            ),
            (
                u64::MAX,
                "66fc751bb94f4706d067f3f71f36aa34be558257ee67a32b9892257325c2b64b98aef427b7d6",
            ),
        ];
        for (index, expected) in vectors {
            let pk = key_from_seed(&seed, index).public_key();
            let addr = standard_unlock_conditions(pk).unlock_hash();
            assert_eq!(addr.to_string(), expected, "index {index}");
        }
    }

    #[test]
    fn test_legacy_round_trip() {
        assert_eq!(seed_to_phrase(&legacy_seed()), LEGACY_PHRASE);
    }

    #[test]
    fn test_bip39_phrase_decodes() {
        // The all-zero entropy mnemonic; any valid 12-word phrase decodes
        // deterministically.
        let phrase = "abandon abandon abandon abandon abandon abandon \
            abandon abandon abandon abandon abandon about";
        let mut seed = [0u8; 32];
        seed_from_phrase(&mut seed, phrase).expect("valid mnemonic");
        assert_eq!(seed, *blake2b_sum(&[0u8; 16]).as_bytes());
    }

    #[test]
    fn test_bip39_rejects_bad_checksum() {
        let phrase = "abandon abandon abandon abandon abandon abandon \
            abandon abandon abandon abandon abandon abandon";
        let mut seed = [0u8; 32];
        assert!(matches!(
            seed_from_phrase(&mut seed, phrase),
            Err(PhraseError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_key_derivation_is_index_sensitive() {
        let seed = legacy_seed();
        let a = key_from_seed(&seed, 0).public_key();
        let b = key_from_seed(&seed, 1).public_key();
        assert_ne!(a, b);

        // And deterministic.
        assert_eq!(a, key_from_seed(&seed, 0).public_key());
    }
}
