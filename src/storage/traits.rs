//! Storage traits and error types
//!
//! This module defines the trait interface for dedup store backends and
//! associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent membership store behind incremental sync
///
/// Keys are `(scope, item_id)` pairs where `scope` is a `DedupScope` key such as
/// `post:MS4wLj`. Implementations must be safe to share between concurrently
/// running sessions.
pub trait DedupStore: Send + Sync {
    /// Checks whether an item was stored under a scope
    fn exists(&self, scope: &str, item_id: &str) -> StorageResult<bool>;

    /// Stores an item under a scope
    ///
    /// # Arguments
    ///
    /// * `scope` - Dedup scope key
    /// * `item_id` - Upstream item id
    /// * `payload` - Raw item, kept for inspection
    ///
    /// # Returns
    ///
    /// `true` if a new row was written, `false` if the pair was already present
    fn insert(&self, scope: &str, item_id: &str, payload: &serde_json::Value)
        -> StorageResult<bool>;

    // ===== Maintenance =====

    /// Removes every item stored under a scope, returning how many were removed
    fn clear_scope(&self, scope: &str) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts stored items per scope, sorted by scope
    fn scope_counts(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Counts all stored items
    fn count_total(&self) -> StorageResult<u64>;
}
