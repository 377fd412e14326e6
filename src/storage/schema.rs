//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the tidemark database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Global attributes (crawl stage, ledger store names)
CREATE TABLE IF NOT EXISTS attributes (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Named key/value maps (processed, cached, dedup checksums)
CREATE TABLE IF NOT EXISTS map_entries (
    map_name TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (map_name, key)
);

-- Named priority queues (crawl queue, committer buffer)
CREATE TABLE IF NOT EXISTS queue_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name TEXT NOT NULL,
    key TEXT NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    value TEXT NOT NULL,
    UNIQUE(queue_name, key)
);

CREATE INDEX IF NOT EXISTS idx_queue_entries_order ON queue_entries(queue_name, priority, seq);

-- Named sets (run-once markers)
CREATE TABLE IF NOT EXISTS set_members (
    set_name TEXT NOT NULL,
    member TEXT NOT NULL,
    PRIMARY KEY (set_name, member)
);
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
    Ok(())
}
