//! The vault: lock/unlock state machine and seed operations.

use std::sync::{Arc, Condvar, Mutex};

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::digest::Mac as _;
use blake2::Blake2bMac;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use vaultd_seed::key_from_seed;
use vaultd_types::{Hash256, PrivateKey, PublicKey, Signature};

use crate::store::{SeedId, SeedMeta, Store};
use crate::VaultError;

type Blake2bMac256 = Blake2bMac<U32>;

/// Length of the key-derivation salt.
pub const KEY_SALT_LEN: usize = 32;

/// Length of a seed MAC.
pub const SEED_MAC_LEN: usize = 32;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const SEED_LEN: usize = 32;

/// Length of an encrypted seed blob: nonce, ciphertext, and tag.
pub const ENCRYPTED_SEED_LEN: usize = NONCE_LEN + SEED_LEN + TAG_LEN;

// Argon2id parameters; these are a contract. Changing them would brick
// every existing database.
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// The capabilities installed by a successful unlock.
struct UnlockedKeys {
    aead: XChaCha20Poly1305,
    mac_key: Zeroizing<[u8; 32]>,
}

/// A secure store for root seeds.
///
/// The vault starts locked. [`Vault::unlock`] derives the encryption key
/// from the caller's secret and installs the AEAD and MAC capabilities;
/// every operation that touches seed material requires them. A single
/// internal mutex serializes state transitions and seed access, which makes
/// the read-derive-write sequences of [`Vault::add_seed`] and
/// [`Vault::next_key`] atomic.
pub struct Vault {
    store: Arc<dyn Store>,
    keys: Mutex<Option<UnlockedKeys>>,
    ops: OpTracker,
}

impl Vault {
    /// Creates a locked vault over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            keys: Mutex::new(None),
            ops: OpTracker::default(),
        }
    }

    /// Derives the encryption key from `secret` and unlocks the vault.
    ///
    /// On the first ever unlock a random salt is generated and persisted;
    /// afterwards the stored salt is reused so the same secret always
    /// derives the same key. If any seed exists, the key is verified by
    /// decrypting one of the stored blobs before it is accepted.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Unlocked`] if the vault is already unlocked.
    /// - [`VaultError::IncorrectSecret`] if verification fails; the vault
    ///   stays locked.
    pub fn unlock(&self, secret: &str) -> Result<(), VaultError> {
        let _op = self.ops.add()?;
        let mut keys = self.keys.lock().expect("vault mutex poisoned");
        if keys.is_some() {
            return Err(VaultError::Unlocked);
        }

        let salt = match self.store.key_salt()? {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; KEY_SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                match self.store.set_key_salt(&salt) {
                    Ok(()) => salt,
                    // Lost the race to another writer; reread theirs.
                    Err(VaultError::SaltSet) => self
                        .store
                        .key_salt()?
                        .ok_or_else(|| VaultError::Database("salt set but missing".to_string()))?,
                    Err(err) => return Err(err),
                }
            }
        };

        let key = derive_encryption_key(secret, &salt)?;
        let aead = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

        match self.store.bytes_for_verify() {
            Ok(blob) => {
                if blob.len() < NONCE_LEN + TAG_LEN {
                    return Err(VaultError::InvalidSize);
                }
                let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
                match aead.decrypt(XNonce::from_slice(nonce), ciphertext) {
                    Ok(mut plaintext) => plaintext.zeroize(),
                    Err(_) => return Err(VaultError::IncorrectSecret),
                }
            }
            // No seeds yet; nothing to verify against.
            Err(VaultError::NotFound) => {}
            Err(err) => return Err(err),
        }

        *keys = Some(UnlockedKeys { aead, mac_key: key });
        debug!("vault unlocked");
        Ok(())
    }

    /// Locks the vault, wiping the derived key material. Idempotent.
    pub fn lock(&self) {
        let mut keys = self.keys.lock().expect("vault mutex poisoned");
        if keys.take().is_some() {
            debug!("vault locked");
        }
    }

    /// Encrypts `seed` and adds it to the store, returning its metadata.
    /// If the seed is already present, the existing metadata is returned.
    ///
    /// The caller's buffer is wiped before the call returns, on success and
    /// on error.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] if the vault is locked.
    pub fn add_seed(&self, seed: &mut [u8; 32]) -> Result<SeedMeta, VaultError> {
        let result = self.add_seed_inner(seed);
        seed.zeroize();
        result
    }

    fn add_seed_inner(&self, seed: &[u8; 32]) -> Result<SeedMeta, VaultError> {
        let _op = self.ops.add()?;
        let keys = self.keys.lock().expect("vault mutex poisoned");
        let keys = keys.as_ref().ok_or(VaultError::Locked)?;

        let mut mac = <Blake2bMac256 as blake2::digest::Mac>::new_from_slice(keys.mac_key.as_ref())
            .map_err(|err| VaultError::Crypto(format!("failed to key MAC: {err}")))?;
        mac.update(seed);
        let mac = Hash256(mac.finalize().into_bytes().into());

        let mut blob = Vec::with_capacity(ENCRYPTED_SEED_LEN);
        blob.resize(NONCE_LEN, 0);
        OsRng.fill_bytes(&mut blob[..NONCE_LEN]);
        let ciphertext = keys
            .aead
            .encrypt(XNonce::from_slice(&blob[..NONCE_LEN]), seed.as_slice())
            .map_err(|_| VaultError::Crypto("failed to encrypt seed".to_string()))?;
        blob.extend_from_slice(&ciphertext);

        self.store.add_seed(mac, &blob)
    }

    /// Derives the next public key for a seed and records it.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] if locked; [`VaultError::NotFound`] if the
    /// seed does not exist.
    pub fn next_key(&self, id: SeedId) -> Result<PublicKey, VaultError> {
        let _op = self.ops.add()?;
        let keys = self.keys.lock().expect("vault mutex poisoned");
        let keys = keys.as_ref().ok_or(VaultError::Locked)?;

        let index = self.store.next_index(id)?;
        let key = self.derive_private_key(keys, id, index)?;
        let pk = key.public_key();
        self.store.add_key_index(id, pk, index)?;
        Ok(pk)
    }

    /// Signs a 32-byte hash with the key matching `pk`.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] if no stored seed derives `pk`;
    /// [`VaultError::Locked`] if locked.
    pub fn sign(&self, pk: PublicKey, hash: Hash256) -> Result<Signature, VaultError> {
        let _op = self.ops.add()?;
        let keys = self.keys.lock().expect("vault mutex poisoned");
        let keys = keys.as_ref().ok_or(VaultError::Locked)?;

        let (id, index) = self.store.signing_key_index(pk)?;
        let key = self.derive_private_key(keys, id, index)?;
        Ok(key.sign_hash(&hash))
    }

    /// Returns metadata about a seed.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] if locked; [`VaultError::NotFound`] if the
    /// seed does not exist.
    pub fn seed_meta(&self, id: SeedId) -> Result<SeedMeta, VaultError> {
        let _op = self.ops.add()?;
        self.require_unlocked()?;
        self.store.seed_meta(id)
    }

    /// Returns a page of public keys derived from a seed.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] if locked; [`VaultError::NotFound`] if the
    /// seed does not exist.
    pub fn seed_keys(
        &self,
        id: SeedId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PublicKey>, VaultError> {
        let _op = self.ops.add()?;
        self.require_unlocked()?;
        self.store.seed_keys(id, offset, limit)
    }

    /// Returns a page of seed metadata, ordered by creation time.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] if locked.
    pub fn seeds(&self, limit: usize, offset: usize) -> Result<Vec<SeedMeta>, VaultError> {
        let _op = self.ops.add()?;
        self.require_unlocked()?;
        self.store.seeds(limit, offset)
    }

    /// Refuses new operations, waits for in-flight ones to finish, and
    /// locks the vault.
    pub fn close(&self) {
        self.ops.close();
        self.lock();
    }

    fn require_unlocked(&self) -> Result<(), VaultError> {
        let keys = self.keys.lock().expect("vault mutex poisoned");
        if keys.is_none() {
            return Err(VaultError::Locked);
        }
        Ok(())
    }

    /// Decrypts the seed and derives the key at `index`. The caller must
    /// hold the unlocked capabilities.
    fn derive_private_key(
        &self,
        keys: &UnlockedKeys,
        id: SeedId,
        index: u64,
    ) -> Result<PrivateKey, VaultError> {
        let blob = self.store.seed(id)?;
        if blob.len() != ENCRYPTED_SEED_LEN {
            return Err(VaultError::InvalidSize);
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let mut plaintext = keys
            .aead
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Crypto("failed to decrypt seed".to_string()))?;
        if plaintext.len() != SEED_LEN {
            // The store returned a well-formed blob that decrypts to the
            // wrong length; a developer error, not a protocol state.
            plaintext.zeroize();
            return Err(VaultError::InvalidSize);
        }

        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&plaintext);
        plaintext.zeroize();
        let key = key_from_seed(&seed, index);
        seed.zeroize();
        Ok(key)
    }
}

/// Derives the 32-byte encryption key from a secret and salt with Argon2id.
fn derive_encryption_key(
    secret: &str,
    salt: &[u8; KEY_SALT_LEN],
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(32))
        .map_err(|err| VaultError::Crypto(format!("invalid KDF parameters: {err}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(secret.as_bytes(), salt, key.as_mut())
        .map_err(|err| VaultError::Crypto(format!("key derivation failed: {err}")))?;
    Ok(key)
}

/// Tracks in-flight operations so shutdown can refuse new work and wait for
/// outstanding work to complete.
#[derive(Default)]
struct OpTracker {
    state: Mutex<OpState>,
    done: Condvar,
}

#[derive(Default)]
struct OpState {
    closed: bool,
    in_flight: usize,
}

impl OpTracker {
    fn add(&self) -> Result<OpGuard<'_>, VaultError> {
        let mut state = self.state.lock().expect("op tracker mutex poisoned");
        if state.closed {
            return Err(VaultError::Closed);
        }
        state.in_flight += 1;
        Ok(OpGuard { tracker: self })
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("op tracker mutex poisoned");
        state.closed = true;
        while state.in_flight > 0 {
            state = self
                .done
                .wait(state)
                .expect("op tracker mutex poisoned");
        }
    }
}

struct OpGuard<'a> {
    tracker: &'a OpTracker,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let mut state = self
            .tracker
            .state
            .lock()
            .expect("op tracker mutex poisoned");
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.tracker.done.notify_all();
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! An in-memory store for exercising the vault without a database.

    use std::sync::Mutex;

    use chrono::Utc;

    use vaultd_types::{Hash256, PublicKey};

    use crate::store::{SeedId, SeedMeta, Store};
    use crate::VaultError;

    #[derive(Default)]
    pub struct MemStore {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        salt: Option<[u8; 32]>,
        seeds: Vec<(Hash256, Vec<u8>, chrono::DateTime<Utc>)>,
        keys: Vec<(PublicKey, SeedId, u64)>,
    }

    impl Inner {
        fn meta(&self, id: SeedId) -> Result<SeedMeta, VaultError> {
            let idx = usize::try_from(id.0 - 1).map_err(|_| VaultError::NotFound)?;
            let (_, _, created_at) = self.seeds.get(idx).ok_or(VaultError::NotFound)?;
            let last_index = self
                .keys
                .iter()
                .filter(|(_, seed, _)| *seed == id)
                .map(|&(_, _, index)| index)
                .max()
                .unwrap_or(0);
            Ok(SeedMeta {
                id,
                last_index,
                created_at: *created_at,
            })
        }
    }

    impl Store for MemStore {
        fn signing_key_index(&self, pk: PublicKey) -> Result<(SeedId, u64), VaultError> {
            let inner = self.inner.lock().unwrap();
            inner
                .keys
                .iter()
                .find(|(key, _, _)| *key == pk)
                .map(|&(_, id, index)| (id, index))
                .ok_or(VaultError::NotFound)
        }

        fn add_key_index(&self, id: SeedId, pk: PublicKey, index: u64) -> Result<(), VaultError> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.keys.iter().any(|(key, _, _)| *key == pk) {
                inner.keys.push((pk, id, index));
            }
            Ok(())
        }

        fn next_index(&self, id: SeedId) -> Result<u64, VaultError> {
            let inner = self.inner.lock().unwrap();
            inner.meta(id)?;
            Ok(inner
                .keys
                .iter()
                .filter(|(_, seed, _)| *seed == id)
                .map(|&(_, _, index)| index)
                .max()
                .map_or(0, |max| max + 1))
        }

        fn key_salt(&self) -> Result<Option<[u8; 32]>, VaultError> {
            Ok(self.inner.lock().unwrap().salt)
        }

        fn set_key_salt(&self, salt: &[u8; 32]) -> Result<(), VaultError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.salt.is_some() {
                return Err(VaultError::SaltSet);
            }
            inner.salt = Some(*salt);
            Ok(())
        }

        fn bytes_for_verify(&self) -> Result<Vec<u8>, VaultError> {
            let inner = self.inner.lock().unwrap();
            inner
                .seeds
                .first()
                .map(|(_, blob, _)| blob.clone())
                .ok_or(VaultError::NotFound)
        }

        fn add_seed(&self, mac: Hash256, encrypted_seed: &[u8]) -> Result<SeedMeta, VaultError> {
            let mut inner = self.inner.lock().unwrap();
            let id = match inner.seeds.iter().position(|(m, _, _)| *m == mac) {
                Some(idx) => SeedId(idx as i64 + 1),
                None => {
                    inner
                        .seeds
                        .push((mac, encrypted_seed.to_vec(), Utc::now()));
                    SeedId(inner.seeds.len() as i64)
                }
            };
            inner.meta(id)
        }

        fn seed(&self, id: SeedId) -> Result<Vec<u8>, VaultError> {
            let inner = self.inner.lock().unwrap();
            let idx = usize::try_from(id.0 - 1).map_err(|_| VaultError::NotFound)?;
            inner
                .seeds
                .get(idx)
                .map(|(_, blob, _)| blob.clone())
                .ok_or(VaultError::NotFound)
        }

        fn seed_meta(&self, id: SeedId) -> Result<SeedMeta, VaultError> {
            self.inner.lock().unwrap().meta(id)
        }

        fn seed_keys(
            &self,
            id: SeedId,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<PublicKey>, VaultError> {
            let inner = self.inner.lock().unwrap();
            inner.meta(id)?;
            let mut keys: Vec<(u64, PublicKey)> = inner
                .keys
                .iter()
                .filter(|(_, seed, _)| *seed == id)
                .map(|&(pk, _, index)| (index, pk))
                .collect();
            keys.sort_by_key(|&(index, _)| index);
            Ok(keys
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|(_, pk)| pk)
                .collect())
        }

        fn seeds(&self, limit: usize, offset: usize) -> Result<Vec<SeedMeta>, VaultError> {
            let inner = self.inner.lock().unwrap();
            (1..=inner.seeds.len() as i64)
                .skip(offset)
                .take(limit)
                .map(|id| inner.meta(SeedId(id)))
                .collect()
        }
    }
}
