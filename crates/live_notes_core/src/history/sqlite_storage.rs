//! SQLite-backed storage implementation for version history.
//!
//! This module provides a persistent storage backend using SQLite. All keys of
//! all documents live in one table; batches run inside a transaction so a
//! recorded version, its list entry and the policy state land together.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use super::storage::{BatchOp, StorageResult, VersionStorage};
use crate::error::NotesError;

/// SQLite-backed version storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            -- Per-document key/value entries
            CREATE TABLE IF NOT EXISTS entries (
                doc_id TEXT NOT NULL,
                key TEXT NOT NULL CHECK (length(key) > 0),
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (doc_id, key)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NotesError::Storage("sqlite connection lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl VersionStorage for SqliteStorage {
    fn get(&self, doc_id: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE doc_id = ? AND key = ?",
                params![doc_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, doc_id: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT OR REPLACE INTO entries (doc_id, key, value, updated_at) VALUES (?, ?, ?, ?)",
            params![doc_id, key, value, now],
        )?;
        Ok(())
    }

    fn delete(&self, doc_id: &str, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM entries WHERE doc_id = ? AND key = ?",
            params![doc_id, key],
        )?;
        Ok(())
    }

    fn keys(&self, doc_id: &str) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM entries WHERE doc_id = ? ORDER BY key")?;
        let keys = stmt
            .query_map(params![doc_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn apply_batch(&self, doc_id: &str, ops: &[BatchOp]) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let now = chrono::Utc::now().timestamp_millis();

        // Use a SQL transaction for atomicity
        let tx = conn.transaction()?;
        {
            let mut put = tx.prepare(
                "INSERT OR REPLACE INTO entries (doc_id, key, value, updated_at) VALUES (?, ?, ?, ?)",
            )?;
            let mut delete = tx.prepare("DELETE FROM entries WHERE doc_id = ? AND key = ?")?;

            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        put.execute(params![doc_id, key, value, now])?;
                    }
                    BatchOp::Delete { key } => {
                        delete.execute(params![doc_id, key])?;
                    }
                }
            }
        }

        // Dropping the transaction on an early return rolls it back
        tx.commit()?;
        Ok(())
    }
}
