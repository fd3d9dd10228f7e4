//! The legacy 28/29-word phrase encoding.
//!
//! The encoding treats a byte string as a big integer and rewrites it in
//! base 1626, one dictionary word per digit. Both directions use an offset
//! scheme that preserves leading zeros, giving a unique round-trip: a digit
//! sequence `d_0..d_n` in base `b` represents `sum((d_k + 1) * b^k) - 1`.
//!
//! An encoded phrase covers the 32-byte seed followed by the first six
//! bytes of its BLAKE2b-256 digest; decoding recovers the byte string and
//! takes the first 32 bytes, ignoring the checksum tail.

use std::sync::OnceLock;

use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroize;

use vaultd_types::blake2b_sum;

use crate::dictionary::{DICTIONARY, DICTIONARY_SIZE};
use crate::PhraseError;

const PREFIX_LEN: usize = 3;
const CHECKSUM_LEN: usize = 6;

/// Decodes a legacy phrase into a 32-byte seed.
///
/// Words are matched by the first three characters of their NFC
/// normalization.
///
/// # Errors
///
/// Returns [`PhraseError::UnknownWord`] if a word matches no dictionary
/// entry.
pub fn seed_from_phrase(seed: &mut [u8; 32], phrase: &str) -> Result<(), PhraseError> {
    let mut n = phrase_to_int(phrase)?;
    let mut bytes = int_to_bytes(&mut n);
    let len = bytes.len().min(32);
    seed[..len].copy_from_slice(&bytes[..len]);
    bytes.zeroize();
    Ok(())
}

/// Encodes a 32-byte seed as a legacy phrase, including its checksum words.
#[must_use]
pub fn seed_to_phrase(seed: &[u8; 32]) -> String {
    let checksum = blake2b_sum(seed);
    let mut data = [0u8; 32 + CHECKSUM_LEN];
    data[..32].copy_from_slice(seed);
    data[32..].copy_from_slice(&checksum.as_bytes()[..CHECKSUM_LEN]);

    let mut n = bytes_to_int(&data);
    let phrase = int_to_phrase(&mut n);
    data.zeroize();
    phrase
}

/// The dictionary with every entry NFC-normalized, built on first use.
fn normalized_dictionary() -> &'static [String] {
    static NORMALIZED: OnceLock<Vec<String>> = OnceLock::new();
    NORMALIZED.get_or_init(|| {
        DICTIONARY
            .iter()
            .map(|entry| entry.nfc().collect())
            .collect()
    })
}

/// Finds the dictionary index of a word by its normalized three-character
/// prefix.
fn word_index(word: &str) -> Result<usize, PhraseError> {
    let normalized: String = word.nfc().collect();
    let prefix: String = normalized.chars().take(PREFIX_LEN).collect();
    normalized_dictionary()
        .iter()
        .position(|entry| entry.starts_with(prefix.as_str()))
        .ok_or_else(|| PhraseError::UnknownWord(word.to_string()))
}

fn phrase_to_int(phrase: &str) -> Result<BigUint, PhraseError> {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    let mut n = BigUint::zero();
    for word in words.into_iter().rev() {
        let j = word_index(word)?;
        n.mul_add(DICTIONARY_SIZE as u32, j as u32 + 1);
    }
    n.sub_small(1);
    Ok(n)
}

fn int_to_phrase(n: &mut BigUint) -> String {
    let mut words = Vec::new();
    while n.is_at_least(DICTIONARY_SIZE as u32) {
        let digit = n.divmod(DICTIONARY_SIZE as u32);
        words.push(DICTIONARY[digit as usize]);
        n.sub_small(1);
    }
    words.push(DICTIONARY[n.low() as usize]);
    words.join(" ")
}

fn bytes_to_int(bytes: &[u8]) -> BigUint {
    let mut n = BigUint::zero();
    for &b in bytes.iter().rev() {
        n.mul_add(256, u32::from(b) + 1);
    }
    n.sub_small(1);
    n
}

fn int_to_bytes(n: &mut BigUint) -> Vec<u8> {
    let mut bytes = Vec::new();
    while n.is_at_least(256) {
        bytes.push(n.divmod(256) as u8);
        n.sub_small(1);
    }
    bytes.push(n.low() as u8);
    bytes
}

/// A minimal unsigned big integer: little-endian base-2^32 limbs, just the
/// operations the base conversions need. Limbs are wiped on drop.
struct BigUint {
    limbs: Vec<u32>,
}

impl BigUint {
    fn zero() -> Self {
        Self { limbs: Vec::new() }
    }

    /// `self = self * mul + add`
    fn mul_add(&mut self, mul: u32, add: u32) {
        let mut carry = u64::from(add);
        for limb in &mut self.limbs {
            let v = u64::from(*limb) * u64::from(mul) + carry;
            *limb = v as u32;
            carry = v >> 32;
        }
        while carry != 0 {
            self.limbs.push(carry as u32);
            carry >>= 32;
        }
    }

    /// `self = self / div`, returning the remainder.
    fn divmod(&mut self, div: u32) -> u32 {
        let mut rem = 0u64;
        for limb in self.limbs.iter_mut().rev() {
            let v = (rem << 32) | u64::from(*limb);
            *limb = (v / u64::from(div)) as u32;
            rem = v % u64::from(div);
        }
        self.trim();
        rem as u32
    }

    /// `self = self - sub`; `self` must be at least `sub`.
    fn sub_small(&mut self, sub: u32) {
        let mut borrow = u64::from(sub);
        for limb in &mut self.limbs {
            if borrow == 0 {
                break;
            }
            let v = u64::from(*limb);
            if v >= borrow {
                *limb = (v - borrow) as u32;
                borrow = 0;
            } else {
                *limb = ((v + (1u64 << 32)) - borrow) as u32;
                borrow = 1;
            }
        }
        self.trim();
    }

    fn is_at_least(&self, v: u32) -> bool {
        match self.limbs.len() {
            0 => v == 0,
            1 => self.limbs[0] >= v,
            _ => true,
        }
    }

    fn low(&self) -> u32 {
        self.limbs.first().copied().unwrap_or(0)
    }

    fn trim(&mut self) {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }
}

impl Drop for BigUint {
    fn drop(&mut self) {
        self.limbs.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_phrase_decodes() {
        const PHRASE: &str = "mocked southern dehydrate unusual navy pegs aided ruined \
            festival yearbook total building wife greater befit drunk judge thwart \
            erosion hefty saucepan hijack request welders bomb remedy each sayings actress";

        let mut seed = [0u8; 32];
        seed_from_phrase(&mut seed, PHRASE).expect("valid phrase");
        assert_eq!(
            hex::encode(seed),
            "de67ef93cd0adb3418aa4ce71d2504636533b36d36a0d5211bfccc331dea7b41"
        );
    }

    #[test]
    fn test_known_seed_encodes_to_phrase() {
        const PHRASE: &str = "mocked southern dehydrate unusual navy pegs aided ruined \
            festival yearbook total building wife greater befit drunk judge thwart \
            erosion hefty saucepan hijack request welders bomb remedy each sayings actress";

        let mut seed = [0u8; 32];
        hex::decode_to_slice(
            "de67ef93cd0adb3418aa4ce71d2504636533b36d36a0d5211bfccc331dea7b41",
            &mut seed,
        )
        .expect("valid hex");
        assert_eq!(seed_to_phrase(&seed), PHRASE);
    }

    #[test]
    fn test_round_trip_arbitrary_seeds() {
        // Deterministic pseudo-random seeds; the round-trip must be exact.
        let mut state = 0xdead_beef_u64;
        for _ in 0..64 {
            let mut seed = [0u8; 32];
            for b in &mut seed {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                *b = (state >> 56) as u8;
            }
            let phrase = seed_to_phrase(&seed);
            let count = phrase.split_whitespace().count();
            assert!(count == 28 || count == 29, "unexpected word count {count}");

            let mut decoded = [0u8; 32];
            seed_from_phrase(&mut decoded, &phrase).expect("valid phrase");
            assert_eq!(seed, decoded);
        }
    }

    #[test]
    fn test_all_zero_seed_round_trip() {
        let seed = [0u8; 32];
        let phrase = seed_to_phrase(&seed);
        let mut decoded = [0xffu8; 32];
        seed_from_phrase(&mut decoded, &phrase).expect("valid phrase");
        assert_eq!(seed, decoded);
    }

    #[test]
    fn test_unknown_word_is_rejected() {
        let err = seed_from_phrase(&mut [0u8; 32], "zzz").unwrap_err();
        assert!(matches!(err, PhraseError::UnknownWord(w) if w == "zzz"));
    }

    #[test]
    fn test_words_match_by_prefix() {
        // A truncated word shares its three-character prefix with the full
        // word and must decode identically.
        let full = seed_to_phrase(&[7u8; 32]);
        let truncated: Vec<String> = full
            .split_whitespace()
            .map(|w| w.chars().take(4).collect())
            .collect();

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        seed_from_phrase(&mut a, &full).expect("valid phrase");
        seed_from_phrase(&mut b, &truncated.join(" ")).expect("valid phrase");
        assert_eq!(a, b);
    }
}
