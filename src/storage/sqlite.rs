//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DedupStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DedupStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
///
/// The connection sits behind a mutex so parallel sessions can share one store.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl DedupStore for SqliteStorage {
    fn exists(&self, scope: &str, item_id: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE scope = ?1 AND item_id = ?2)",
            params![scope, item_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    fn insert(
        &self,
        scope: &str,
        item_id: &str,
        payload: &serde_json::Value,
    ) -> StorageResult<bool> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO items (scope, item_id, payload, stored_at) VALUES (?1, ?2, ?3, ?4)",
            params![scope, item_id, payload, now],
        )?;
        Ok(changed > 0)
    }

    // ===== Maintenance =====

    fn clear_scope(&self, scope: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM items WHERE scope = ?1", params![scope])?;
        Ok(removed as u64)
    }

    // ===== Statistics =====

    fn scope_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT scope, COUNT(*) FROM items GROUP BY scope ORDER BY scope")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    fn count_total(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
