//! SQLite persistence for the vault.
//!
//! A single-writer store over one database file. Every public operation
//! runs in its own transaction; transactions that fail because the
//! database is busy are retried with jittered exponential backoff. The
//! store holds only ciphertext and public keys and performs no crypto.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod migrations;
mod vault;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use vaultd_core::VaultError;

pub(crate) use migrations::{init_database, MIGRATIONS};

const BACKOFF_FACTOR: f64 = 1.8;
const MAX_BACKOFF: Duration = Duration::from_secs(15);

/// Options for opening a [`Store`].
#[derive(Debug, Clone)]
pub struct Options {
    /// How many times a transaction is retried when the database is busy.
    pub max_retry_attempts: u32,
    /// How long a single statement waits for a lock before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_retry_attempts: 10,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

/// A persistent store backed by a SQLite database file.
pub struct Store {
    conn: Mutex<rusqlite::Connection>,
    max_retry_attempts: u32,
}

/// An error inside a store transaction: either a domain error to surface
/// as-is, or a database error that may be retried.
pub(crate) enum TxError {
    Vault(VaultError),
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for TxError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err)
    }
}

impl From<VaultError> for TxError {
    fn from(err: VaultError) -> Self {
        Self::Vault(err)
    }
}

impl Store {
    /// Opens (or creates) the database at `path` with default options and
    /// runs any pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the file cannot be opened or
    /// migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        Self::open_with(path, Options::default())
    }

    /// Opens the database with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Database`] if the file cannot be opened or
    /// migrated.
    pub fn open_with(path: impl AsRef<Path>, options: Options) -> Result<Self, VaultError> {
        let conn = rusqlite::Connection::open(path.as_ref()).map_err(db_err)?;
        configure_connection(&conn, options.busy_timeout).map_err(db_err)?;

        let store = Self {
            conn: Mutex::new(conn),
            max_retry_attempts: options.max_retry_attempts,
        };
        init_database(&store)?;
        debug!(
            schema_version = MIGRATIONS.len() + 1,
            path = %path.as_ref().display(),
            "database initialized"
        );
        Ok(store)
    }

    /// Runs `f` inside a transaction, committing on success. Busy errors
    /// are retried with exponential backoff (factor 1.8, 15 s cap) plus
    /// jitter, up to the configured attempt count.
    pub(crate) fn transaction<T>(
        &self,
        mut f: impl FnMut(&rusqlite::Transaction<'_>) -> Result<T, TxError>,
    ) -> Result<T, VaultError> {
        let mut last = None;
        for attempt in 1..self.max_retry_attempts {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            let result = conn
                .transaction()
                .map_err(TxError::from)
                .and_then(|tx| {
                    let value = f(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });
            drop(conn);

            match result {
                Ok(value) => return Ok(value),
                Err(TxError::Vault(err)) => return Err(err),
                Err(TxError::Sqlite(err)) => {
                    if !is_busy(&err) {
                        return Err(db_err(err));
                    }
                    let sleep = backoff(attempt);
                    debug!(attempt, retry_ms = sleep.as_millis() as u64, "database locked");
                    std::thread::sleep(sleep);
                    last = Some(err);
                }
            }
        }
        Err(VaultError::Database(format!(
            "transaction failed after {} attempts: {}",
            self.max_retry_attempts,
            last.map_or_else(|| "busy".to_string(), |err| err.to_string()),
        )))
    }
}

fn configure_connection(
    conn: &rusqlite::Connection,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    // journal_mode returns the resulting mode as a row.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "secure_delete", false)?;
    conn.pragma_update(None, "cache_size", -65536)?; // 64 MiB
    Ok(())
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn backoff(attempt: u32) -> Duration {
    let millis = BACKOFF_FACTOR.powi(attempt as i32);
    let base = Duration::from_millis(millis as u64).min(MAX_BACKOFF);
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis().max(1) as u64 / 2);
    base + Duration::from_millis(jitter)
}

pub(crate) fn db_err(err: rusqlite::Error) -> VaultError {
    VaultError::Database(err.to_string())
}
