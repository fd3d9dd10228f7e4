//! Transaction signing on top of the vault.
//!
//! V1 transactions carry explicit signature entries; each is resolved to a
//! public key through its input's unlock conditions and filled if the vault
//! holds the key. V2 transactions carry spend policies; satisfaction walks
//! the policy tree and appends signatures for every key the vault holds.

use tracing::debug;

use vaultd_types::{
    ConsensusState, Hash256, PublicKey, SatisfiedPolicy, Signature, SpendPolicy, Transaction,
    TypesError, UnlockConditions, V2Transaction,
};

use crate::{Vault, VaultError};

/// The maximum spend-policy recursion depth; deeper policies fail
/// satisfaction rather than risking the stack.
const MAX_POLICY_DEPTH: usize = 64;

/// Errors that fail a signing request outright.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// V1 transactions are rejected once the v2 hardfork requires v2.
    #[error("v1 transactions are not supported at or after the v2 require height")]
    UnsupportedAfterRequireHeight,

    /// V2 transactions are rejected before the v2 hardfork allows them.
    #[error("v2 transactions are not supported until after the allow height")]
    UnsupportedBeforeAllowHeight,

    /// No signature was filled and none was already present.
    #[error("no signatures were added")]
    NoSignaturesAdded,

    /// The request referenced transaction elements that do not exist.
    #[error(transparent)]
    InvalidRequest(#[from] TypesError),

    /// The vault failed; [`VaultError::NotFound`] is handled internally and
    /// never surfaces here.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// A transaction returned from signing, with an indication of whether every
/// signature it needs is present.
#[derive(Debug, Clone)]
pub struct Signed<T> {
    /// The (possibly partially) signed transaction.
    pub transaction: T,
    /// Whether the transaction is fully signed.
    pub fully_signed: bool,
}

/// Fills the signature entries of a v1 transaction.
///
/// Entries that already carry a signature are left untouched. Entries whose
/// input or public key cannot be resolved, or whose key the vault does not
/// hold, are skipped. The digest is the whole-transaction hash unless the
/// entry covers specific fields.
///
/// # Errors
///
/// - [`SignError::UnsupportedAfterRequireHeight`] at or past the v2
///   require height.
/// - [`SignError::NoSignaturesAdded`] if the returned transaction would
///   carry no signatures at all.
/// - Any vault failure other than an unknown key.
pub fn sign_v1(
    vault: &Vault,
    cs: &ConsensusState,
    mut txn: Transaction,
) -> Result<Signed<Transaction>, SignError> {
    if cs.index.height >= cs.network.hardfork_v2.require_height {
        return Err(SignError::UnsupportedAfterRequireHeight);
    }

    let mut signed = 0usize;
    for i in 0..txn.signatures.len() {
        if !txn.signatures[i].signature.is_empty() {
            signed += 1;
            continue;
        }

        let sig = &txn.signatures[i];
        let Some(pk) = public_key_for_signing(&txn, sig.parent_id, sig.public_key_index) else {
            // Not our input, or not an Ed25519 key; leave the entry alone.
            continue;
        };

        let sig_hash = if sig.covered_fields.whole_transaction {
            cs.whole_sig_hash(&txn, sig.parent_id, sig.public_key_index, sig.timelock, &[])
        } else {
            cs.partial_sig_hash(&txn, &sig.covered_fields)?
        };

        match vault.sign(pk, sig_hash) {
            Ok(signature) => {
                txn.signatures[i].signature = signature.as_bytes().to_vec();
                signed += 1;
            }
            Err(VaultError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
    }

    if signed == 0 {
        return Err(SignError::NoSignaturesAdded);
    }
    Ok(Signed {
        fully_signed: signed == txn.signatures.len(),
        transaction: txn,
    })
}

/// Resolves the public key a signature entry commits to: the key at
/// `public_key_index` in the unlock conditions of the input with
/// `parent_id`. Returns `None` if the input is unknown, the index is out of
/// range, or the key is not a 32-byte Ed25519 key.
fn public_key_for_signing(
    txn: &Transaction,
    parent_id: Hash256,
    public_key_index: u64,
) -> Option<PublicKey> {
    let unlock_conditions = txn
        .siacoin_inputs
        .iter()
        .map(|input| (&input.parent_id, &input.unlock_conditions))
        .chain(
            txn.siafund_inputs
                .iter()
                .map(|input| (&input.parent_id, &input.unlock_conditions)),
        )
        .find(|(id, _)| **id == parent_id)
        .map(|(_, uc)| uc)?;

    let index = usize::try_from(public_key_index).ok()?;
    unlock_conditions.public_keys.get(index)?.public_key()
}

/// Signs every input of a v2 transaction by satisfying its spend policy.
///
/// Every input signs the same transaction-wide digest. An input whose
/// policy cannot be satisfied leaves the transaction partially signed; the
/// transaction is always returned.
///
/// # Errors
///
/// [`SignError::UnsupportedBeforeAllowHeight`] below the v2 allow height.
pub fn sign_v2(
    vault: &Vault,
    cs: &ConsensusState,
    mut txn: V2Transaction,
) -> Result<Signed<V2Transaction>, SignError> {
    if cs.index.height < cs.network.hardfork_v2.allow_height {
        return Err(SignError::UnsupportedBeforeAllowHeight);
    }

    let sig_hash = cs.input_sig_hash(&txn);

    let mut fully_signed = true;
    let mut sign_input = |satisfied: &mut SatisfiedPolicy| {
        let policy = satisfied.policy.clone();
        if let Err(reason) = satisfy_policy(vault, sig_hash, &policy, &mut satisfied.signatures, 0)
        {
            debug!(%reason, "policy not satisfied");
            fully_signed = false;
        }
    };
    for input in &mut txn.siacoin_inputs {
        sign_input(&mut input.satisfied_policy);
    }
    for input in &mut txn.siafund_inputs {
        sign_input(&mut input.satisfied_policy);
    }

    Ok(Signed {
        transaction: txn,
        fully_signed,
    })
}

/// Recursively satisfies `policy` by appending signatures over `sig_hash`.
///
/// The threshold counter advances after every attempted sub-policy, whether
/// or not it produced a signature; a threshold is reported "met" once `n`
/// sub-policies have been attempted. Downstream verification rejects
/// transactions where the attempts produced too few signatures.
fn satisfy_policy(
    vault: &Vault,
    sig_hash: Hash256,
    policy: &SpendPolicy,
    signatures: &mut Vec<Signature>,
    depth: usize,
) -> Result<(), String> {
    if depth > MAX_POLICY_DEPTH {
        return Err(format!("policy depth exceeds {MAX_POLICY_DEPTH}"));
    }

    match policy {
        SpendPolicy::Threshold { n, of } => {
            let mut signed: u8 = 0;
            for sub in of {
                if signed == *n {
                    break;
                }
                satisfy_policy(vault, sig_hash, sub, signatures, depth + 1)?;
                signed += 1;
            }
            if signed < *n {
                return Err(format!("threshold not met {signed} != {n}"));
            }
            Ok(())
        }
        SpendPolicy::PublicKey(pk) => match vault.sign(*pk, sig_hash) {
            Ok(sig) => {
                signatures.push(sig);
                Ok(())
            }
            // Not our key; contribute nothing.
            Err(VaultError::NotFound) => Ok(()),
            Err(err) => Err(format!("failed to sign policy: {err}")),
        },
        SpendPolicy::UnlockConditions(uc) => satisfy_unlock_conditions(vault, sig_hash, uc, signatures),
        // Height, time, hash, and opaque policies take no signatures.
        SpendPolicy::Above(_)
        | SpendPolicy::After(_)
        | SpendPolicy::Hash(_)
        | SpendPolicy::Opaque(_) => Ok(()),
    }
}

fn satisfy_unlock_conditions(
    vault: &Vault,
    sig_hash: Hash256,
    uc: &UnlockConditions,
    signatures: &mut Vec<Signature>,
) -> Result<(), String> {
    let mut signed: u64 = 0;
    for entry in &uc.public_keys {
        if signed == uc.signatures_required {
            break;
        }
        let Some(pk) = entry.public_key() else {
            return Err(format!("unsupported public key algorithm {}", entry.algorithm));
        };
        match vault.sign(pk, sig_hash) {
            Ok(sig) => {
                signatures.push(sig);
                signed += 1;
            }
            Err(VaultError::NotFound) => {}
            Err(err) => return Err(format!("failed to sign policy: {err}")),
        }
    }
    if signed < uc.signatures_required {
        return Err(format!(
            "required signatures not met {signed} != {}",
            uc.signatures_required
        ));
    }
    Ok(())
}
