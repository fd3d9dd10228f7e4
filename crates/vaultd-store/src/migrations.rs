//! Schema initialization and migrations.
//!
//! A fresh database is initialized directly to the final schema. Existing
//! databases are brought up to date by the migration list, one transaction
//! per step; the schema they converge to must be identical to the fresh
//! one. The current schema version is `1 + MIGRATIONS.len()`.

use tracing::debug;

use vaultd_core::VaultError;

use crate::Store;

/// The full, current schema. Changes here require a matching migration.
const INIT_SCHEMA: &str = "
CREATE TABLE global_settings (
    id INTEGER PRIMARY KEY NOT NULL DEFAULT 0 CHECK (id = 0), -- enforce a single row
    db_version INTEGER NOT NULL, -- used for migrations
    key_salt BLOB -- the salt used for deriving keys
);

CREATE TABLE seeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_mac BLOB UNIQUE NOT NULL,
    encrypted_seed BLOB NOT NULL,
    date_created INTEGER NOT NULL
);
CREATE INDEX seeds_date_created_idx ON seeds (date_created ASC);

CREATE TABLE signing_keys (
    public_key BLOB PRIMARY KEY NOT NULL,
    seed_id INTEGER NOT NULL REFERENCES seeds (id),
    seed_index INTEGER NOT NULL
);
CREATE INDEX signing_keys_seed_id_idx ON signing_keys (seed_id);
CREATE INDEX signing_keys_seed_id_seed_index_idx ON signing_keys (seed_id, seed_index);
";

/// A single migration step, run inside its own transaction.
type Migration = fn(&rusqlite::Transaction<'_>) -> rusqlite::Result<()>;

/// The append-only migration list. Entry `i` migrates schema version
/// `i + 1` to `i + 2`.
pub(crate) const MIGRATIONS: &[Migration] = &[migrate_v2_seeds_date_created_index];

// migration 1: add an index on the date created column of the seeds table
// to speed up sorting
fn migrate_v2_seeds_date_created_index(tx: &rusqlite::Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch("CREATE INDEX seeds_date_created_idx ON seeds (date_created ASC);")
}

/// Creates the schema on a fresh database, or migrates an existing one to
/// the current version.
pub(crate) fn init_database(store: &Store) -> Result<(), VaultError> {
    let target = MIGRATIONS.len() as i64 + 1;

    let version: i64 = store.transaction(|tx| {
        let exists: bool = tx
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='global_settings'",
                [],
                |row| row.get(0),
            )?;
        if !exists {
            tx.execute_batch(INIT_SCHEMA)?;
            tx.execute(
                "INSERT INTO global_settings (id, db_version) VALUES (0, ?1)",
                [target],
            )?;
            return Ok(target);
        }
        Ok(tx.query_row("SELECT db_version FROM global_settings", [], |row| row.get(0))?)
    })?;

    for from in version..target {
        store.transaction(|tx| {
            MIGRATIONS[(from - 1) as usize](tx)?;
            tx.execute("UPDATE global_settings SET db_version = ?1", [from + 1])?;
            Ok(())
        })?;
        debug!(from, to = from + 1, "applied migration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// The schema as it shipped at version 1, used to exercise the
    /// migration path from the oldest deployed database.
    const V1_SCHEMA: &str = "
CREATE TABLE global_settings (
    id INTEGER PRIMARY KEY NOT NULL DEFAULT 0 CHECK (id = 0), -- enforce a single row
    db_version INTEGER NOT NULL, -- used for migrations
    key_salt BLOB -- the salt used for deriving keys
);

CREATE TABLE seeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    seed_mac BLOB UNIQUE NOT NULL,
    encrypted_seed BLOB NOT NULL,
    date_created INTEGER NOT NULL
);

CREATE TABLE signing_keys (
    public_key BLOB PRIMARY KEY NOT NULL,
    seed_id INTEGER NOT NULL REFERENCES seeds (id),
    seed_index INTEGER NOT NULL
);
CREATE INDEX signing_keys_seed_id_idx ON signing_keys (seed_id);
CREATE INDEX signing_keys_seed_id_seed_index_idx ON signing_keys (seed_id, seed_index);
";

    fn db_version(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT db_version FROM global_settings", [], |row| row.get(0))
            .expect("db version")
    }

    fn schema_objects(conn: &rusqlite::Connection, kind: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare("SELECT name, tbl_name, COALESCE(sql, '') FROM sqlite_master WHERE type = ?1")
            .expect("prepare");
        let rows = stmt
            .query_map([kind], |row| {
                Ok(format!(
                    "{}.{}.{}",
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?
                ))
            })
            .expect("query");
        rows.map(|row| row.expect("row")).collect()
    }

    fn table_columns(conn: &rusqlite::Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare");
        let rows = stmt
            .query_map([], |row| {
                Ok(format!(
                    "{}.{}.{}.{}.{}",
                    row.get::<_, String>(1)?,        // name
                    row.get::<_, String>(2)?,        // type
                    row.get::<_, bool>(3)?,          // not null
                    row.get::<_, Option<String>>(4)?.unwrap_or_default(), // default
                    row.get::<_, i64>(5)?,           // primary key
                ))
            })
            .expect("query");
        rows.map(|row| row.expect("row")).collect()
    }

    #[test]
    fn test_migrations_converge_to_fresh_schema() {
        let dir = tempfile::tempdir().expect("tempdir");

        // A database initialized at schema version 1.
        let migrated_path = dir.path().join("migrated.sqlite3");
        {
            let conn = rusqlite::Connection::open(&migrated_path).expect("open");
            conn.execute_batch(V1_SCHEMA).expect("v1 schema");
            conn.execute(
                "INSERT INTO global_settings (id, db_version) VALUES (0, 1)",
                [],
            )
            .expect("settings row");
        }

        let expected_version = MIGRATIONS.len() as i64 + 1;
        let migrated = Store::open(&migrated_path).expect("open migrated");
        {
            let conn = migrated.conn.lock().expect("lock");
            assert_eq!(db_version(&conn), expected_version);
        }
        drop(migrated);

        // Reopening must not change the version.
        let migrated = Store::open(&migrated_path).expect("reopen");

        // A database initialized fresh at the current version.
        let fresh_path = dir.path().join("fresh.sqlite3");
        let fresh = Store::open(&fresh_path).expect("open fresh");

        let migrated_conn = migrated.conn.lock().expect("lock");
        let fresh_conn = fresh.conn.lock().expect("lock");
        assert_eq!(db_version(&migrated_conn), expected_version);

        // Tables, indices, and per-table columns must be identical.
        assert_eq!(
            schema_objects(&migrated_conn, "table"),
            schema_objects(&fresh_conn, "table")
        );
        assert_eq!(
            schema_objects(&migrated_conn, "index"),
            schema_objects(&fresh_conn, "index")
        );
        for table in ["global_settings", "seeds", "signing_keys"] {
            assert_eq!(
                table_columns(&migrated_conn, table),
                table_columns(&fresh_conn, table),
                "columns of {table}"
            );
        }
    }
}
