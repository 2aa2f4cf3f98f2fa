//! Database schema definitions
//!
//! This module contains the SQL schema for the Feed-Trawl dedup database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Items seen per dedup scope
CREATE TABLE IF NOT EXISTS items (
    scope TEXT NOT NULL,
    item_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (scope, item_id)
);

CREATE INDEX IF NOT EXISTS idx_items_scope ON items(scope);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
