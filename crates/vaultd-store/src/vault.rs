//! Seed and signing-key persistence.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use vaultd_core::{SeedId, SeedMeta, Store as VaultStore, VaultError, ENCRYPTED_SEED_LEN};
use vaultd_types::{Hash256, PublicKey};

use crate::{Store, TxError};

fn created_at(millis: i64) -> Result<DateTime<Utc>, TxError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TxError::Vault(VaultError::Database(format!("invalid timestamp {millis}"))))
}

fn scan_public_key(bytes: Vec<u8>) -> Result<PublicKey, TxError> {
    let buf: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TxError::Vault(VaultError::InvalidSize))?;
    Ok(PublicKey(buf))
}

/// Reads a seed's metadata inside a transaction.
fn seed_meta(tx: &rusqlite::Transaction<'_>, id: SeedId) -> Result<SeedMeta, TxError> {
    let millis: i64 = tx
        .query_row("SELECT date_created FROM seeds WHERE id = ?1", [id.0], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or(TxError::Vault(VaultError::NotFound))?;

    let last_index: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seed_index), 0) FROM signing_keys WHERE seed_id = ?1",
        [id.0],
        |row| row.get(0),
    )?;

    Ok(SeedMeta {
        id,
        last_index: last_index as u64,
        created_at: created_at(millis)?,
    })
}

fn check_seed_exists(tx: &rusqlite::Transaction<'_>, id: SeedId) -> Result<(), TxError> {
    let exists: Option<bool> = tx
        .query_row("SELECT true FROM seeds WHERE id = ?1", [id.0], |row| {
            row.get(0)
        })
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(TxError::Vault(VaultError::NotFound)),
    }
}

impl VaultStore for Store {
    fn signing_key_index(&self, pk: PublicKey) -> Result<(SeedId, u64), VaultError> {
        self.transaction(|tx| {
            let row: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT seed_id, seed_index FROM signing_keys WHERE public_key = ?1",
                    [pk.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (id, index) = row.ok_or(TxError::Vault(VaultError::NotFound))?;
            Ok((SeedId(id), index as u64))
        })
    }

    fn add_key_index(&self, id: SeedId, pk: PublicKey, index: u64) -> Result<(), VaultError> {
        self.transaction(|tx| {
            tx.execute(
                "INSERT INTO signing_keys (public_key, seed_id, seed_index) VALUES (?1, ?2, ?3)
                 ON CONFLICT (public_key) DO NOTHING",
                params![pk.as_bytes().as_slice(), id.0, index as i64],
            )?;
            Ok(())
        })
    }

    fn next_index(&self, id: SeedId) -> Result<u64, VaultError> {
        self.transaction(|tx| {
            check_seed_exists(tx, id)?;
            let highest: Option<i64> = tx
                .query_row(
                    "SELECT seed_index FROM signing_keys WHERE seed_id = ?1
                     ORDER BY seed_index DESC LIMIT 1",
                    [id.0],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(highest.map_or(0, |index| index as u64 + 1))
        })
    }

    fn key_salt(&self) -> Result<Option<[u8; 32]>, VaultError> {
        self.transaction(|tx| {
            let salt: Option<Vec<u8>> =
                tx.query_row("SELECT key_salt FROM global_settings", [], |row| row.get(0))?;
            match salt {
                Some(bytes) => {
                    let buf: [u8; 32] = bytes
                        .try_into()
                        .map_err(|_| TxError::Vault(VaultError::InvalidSize))?;
                    Ok(Some(buf))
                }
                None => Ok(None),
            }
        })
    }

    fn set_key_salt(&self, salt: &[u8; 32]) -> Result<(), VaultError> {
        self.transaction(|tx| {
            let updated = tx.execute(
                "UPDATE global_settings SET key_salt = ?1 WHERE key_salt IS NULL",
                [salt.as_slice()],
            )?;
            if updated == 0 {
                return Err(TxError::Vault(VaultError::SaltSet));
            }
            Ok(())
        })
    }

    fn bytes_for_verify(&self) -> Result<Vec<u8>, VaultError> {
        self.transaction(|tx| {
            tx.query_row("SELECT encrypted_seed FROM seeds LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(TxError::Vault(VaultError::NotFound))
        })
    }

    fn add_seed(&self, mac: Hash256, encrypted_seed: &[u8]) -> Result<SeedMeta, VaultError> {
        if encrypted_seed.len() != ENCRYPTED_SEED_LEN {
            return Err(VaultError::InvalidSize);
        }
        self.transaction(|tx| {
            let id: i64 = tx.query_row(
                "INSERT INTO seeds (seed_mac, encrypted_seed, date_created) VALUES (?1, ?2, ?3)
                 ON CONFLICT (seed_mac) DO UPDATE SET seed_mac = excluded.seed_mac
                 RETURNING id",
                params![
                    mac.as_bytes().as_slice(),
                    encrypted_seed,
                    Utc::now().timestamp_millis()
                ],
                |row| row.get(0),
            )?;
            seed_meta(tx, SeedId(id))
        })
    }

    fn seed(&self, id: SeedId) -> Result<Vec<u8>, VaultError> {
        self.transaction(|tx| {
            tx.query_row(
                "SELECT encrypted_seed FROM seeds WHERE id = ?1",
                [id.0],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(TxError::Vault(VaultError::NotFound))
        })
    }

    fn seed_meta(&self, id: SeedId) -> Result<SeedMeta, VaultError> {
        self.transaction(|tx| seed_meta(tx, id))
    }

    fn seed_keys(
        &self,
        id: SeedId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PublicKey>, VaultError> {
        self.transaction(|tx| {
            check_seed_exists(tx, id)?;
            let mut stmt = tx.prepare(
                "SELECT public_key FROM signing_keys WHERE seed_id = ?1
                 ORDER BY seed_index ASC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![id.0, limit as i64, offset as i64], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;
            rows.map(|row| scan_public_key(row?)).collect()
        })
    }

    fn seeds(&self, limit: usize, offset: usize) -> Result<Vec<SeedMeta>, VaultError> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(
                "SELECT s.id, s.date_created, COALESCE(MAX(k.seed_index), 0)
                 FROM seeds s
                 LEFT JOIN signing_keys k ON k.seed_id = s.id
                 GROUP BY s.id
                 ORDER BY s.date_created ASC, s.id ASC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            rows.map(|row| {
                let (id, millis, last_index) = row?;
                Ok(SeedMeta {
                    id: SeedId(id),
                    last_index: last_index as u64,
                    created_at: created_at(millis)?,
                })
            })
            .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("vaultd.sqlite3")).expect("open");
        (store, dir)
    }

    fn fake_mac(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    fn fake_blob(n: u8) -> Vec<u8> {
        vec![n; ENCRYPTED_SEED_LEN]
    }

    #[test]
    fn test_seed_lifecycle() {
        let (store, _dir) = open_store();

        assert!(store.seeds(100, 0).expect("seeds").is_empty());

        let meta = store.add_seed(fake_mac(1), &fake_blob(1)).expect("add");
        assert_eq!(meta.id, SeedId(1));
        assert_eq!(meta.last_index, 0);

        let seeds = store.seeds(100, 0).expect("seeds");
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].id, meta.id);
        assert_eq!(seeds[0].created_at, meta.created_at);
        assert_eq!(seeds[0].last_index, 0);

        for i in 0..100u64 {
            store
                .add_key_index(meta.id, PublicKey([i as u8; 32]), i)
                .expect("add key index");
        }

        let seeds = store.seeds(100, 0).expect("seeds");
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].last_index, 99);

        assert_eq!(store.seed(meta.id).expect("seed"), fake_blob(1));
    }

    #[test]
    fn test_add_seed_is_idempotent_on_mac() {
        let (store, _dir) = open_store();

        let first = store.add_seed(fake_mac(7), &fake_blob(1)).expect("add");
        let second = store.add_seed(fake_mac(7), &fake_blob(2)).expect("re-add");
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);

        // The original blob is preserved.
        assert_eq!(store.seed(first.id).expect("seed"), fake_blob(1));
        assert_eq!(store.seeds(100, 0).expect("seeds").len(), 1);
    }

    #[test]
    fn test_add_seed_rejects_bad_blob_length() {
        let (store, _dir) = open_store();
        assert!(matches!(
            store.add_seed(fake_mac(1), &[0u8; 10]),
            Err(VaultError::InvalidSize)
        ));
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let (store, _dir) = open_store();
        assert!(matches!(store.seed(SeedId(1)), Err(VaultError::NotFound)));
        assert!(matches!(
            store.seed_meta(SeedId(1)),
            Err(VaultError::NotFound)
        ));
        assert!(matches!(
            store.next_index(SeedId(1)),
            Err(VaultError::NotFound)
        ));
        assert!(matches!(
            store.seed_keys(SeedId(1), 0, 10),
            Err(VaultError::NotFound)
        ));
        assert!(matches!(
            store.signing_key_index(PublicKey([1u8; 32])),
            Err(VaultError::NotFound)
        ));
        assert!(matches!(
            store.bytes_for_verify(),
            Err(VaultError::NotFound)
        ));
    }

    #[test]
    fn test_key_salt_is_write_once() {
        let (store, _dir) = open_store();

        assert!(store.key_salt().expect("salt").is_none());
        store.set_key_salt(&[9u8; 32]).expect("set salt");
        assert_eq!(store.key_salt().expect("salt"), Some([9u8; 32]));

        assert!(matches!(
            store.set_key_salt(&[8u8; 32]),
            Err(VaultError::SaltSet)
        ));
        assert_eq!(store.key_salt().expect("salt"), Some([9u8; 32]));
    }

    #[test]
    fn test_next_index_and_key_lookup() {
        let (store, _dir) = open_store();
        let meta = store.add_seed(fake_mac(2), &fake_blob(2)).expect("add");

        assert_eq!(store.next_index(meta.id).expect("next index"), 0);

        let pk = PublicKey([3u8; 32]);
        store.add_key_index(meta.id, pk, 0).expect("add key");
        assert_eq!(store.next_index(meta.id).expect("next index"), 1);

        let (id, index) = store.signing_key_index(pk).expect("lookup");
        assert_eq!(id, meta.id);
        assert_eq!(index, 0);

        // Re-adding the same key is a no-op, even with a different index.
        store.add_key_index(meta.id, pk, 9).expect("re-add key");
        let (_, index) = store.signing_key_index(pk).expect("lookup");
        assert_eq!(index, 0);
    }

    #[test]
    fn test_seed_keys_pagination() {
        let (store, _dir) = open_store();
        let meta = store.add_seed(fake_mac(3), &fake_blob(3)).expect("add");

        for i in 0..5u64 {
            store
                .add_key_index(meta.id, PublicKey([i as u8 + 10; 32]), i)
                .expect("add key");
        }

        let all = store.seed_keys(meta.id, 0, 10).expect("keys");
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], PublicKey([10u8; 32]));

        let page = store.seed_keys(meta.id, 2, 2).expect("keys");
        assert_eq!(page, vec![PublicKey([12u8; 32]), PublicKey([13u8; 32])]);
    }

    #[test]
    fn test_bytes_for_verify_returns_a_blob() {
        let (store, _dir) = open_store();
        store.add_seed(fake_mac(4), &fake_blob(4)).expect("add");
        store.add_seed(fake_mac(5), &fake_blob(5)).expect("add");

        let blob = store.bytes_for_verify().expect("blob");
        assert_eq!(blob.len(), ENCRYPTED_SEED_LEN);
    }

    #[test]
    fn test_seeds_pagination_order() {
        let (store, _dir) = open_store();
        for i in 0..4u8 {
            store.add_seed(fake_mac(i), &fake_blob(i)).expect("add");
        }

        let page = store.seeds(2, 1).expect("seeds");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, SeedId(2));
        assert_eq!(page[1].id, SeedId(3));
    }
}
