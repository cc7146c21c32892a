//! Durable storage for the install-prompt suppression anchor.
//!
//! # Responsibility
//! - Define the string key-value contract durable client state relies on.
//! - Persist the last-dismissal timestamp as decimal epoch milliseconds.
//!
//! # Invariants
//! - Writes are last-write-wins; concurrent writers are not coordinated.
//! - `DismissalStore` never fails: storage errors and unparsable values read
//!   as "never dismissed" and are logged as warnings.

use crate::clock::EpochMs;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::observe::lock_unpoisoned;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Mutex;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    Unavailable(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "local storage failed: {err}"),
            Self::Unavailable(message) => write!(f, "local storage unavailable: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::from(value))
    }
}

/// Synchronous, process-wide string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Removing a missing key succeeds.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Volatile store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock_unpoisoned(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        lock_unpoisoned(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        lock_unpoisoned(&self.entries).remove(key);
        Ok(())
    }
}

/// Store backed by the `local_kv` table of a migrated SQLite database.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that already has migrations applied.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = lock_unpoisoned(&self.conn);
        let value = conn
            .query_row(
                "SELECT value FROM local_kv WHERE key = ?1;",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = lock_unpoisoned(&self.conn);
        conn.execute(
            "INSERT INTO local_kv (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = lock_unpoisoned(&self.conn);
        conn.execute("DELETE FROM local_kv WHERE key = ?1;", params![key])?;
        Ok(())
    }
}

/// Reads and writes the last-dismissal timestamp under one key.
pub struct DismissalStore<'a> {
    store: &'a dyn KeyValueStore,
    key: &'a str,
}

impl<'a> DismissalStore<'a> {
    pub fn new(store: &'a dyn KeyValueStore, key: &'a str) -> Self {
        Self { store, key }
    }

    /// Last dismissal time, or `None` when never dismissed.
    pub fn load(&self) -> Option<EpochMs> {
        let raw = match self.store.get(self.key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("event=install_dismissal_load module=install status=error error={err}");
                return None;
            }
        };

        match raw.trim().parse::<EpochMs>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    "event=install_dismissal_load module=install status=error reason=unparsable_value"
                );
                None
            }
        }
    }

    pub fn record(&self, at: EpochMs) {
        if let Err(err) = self.store.set(self.key, &at.to_string()) {
            warn!("event=install_dismissal_record module=install status=error error={err}");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.store.remove(self.key) {
            warn!("event=install_dismissal_clear module=install status=error error={err}");
        }
    }
}
