//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
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

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    ///
    /// Nothing survives the process; useful for tests and throwaway crawls.
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Storage for SqliteStorage {
    // ===== Attributes =====

    fn get_attribute(&self, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM attributes WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_attribute(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO attributes (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ===== Maps =====

    fn map_get(&self, map: &str, key: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM map_entries WHERE map_name = ?1 AND key = ?2",
                params![map, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn map_put(&mut self, map: &str, key: &str, value: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO map_entries (map_name, key, value) VALUES (?1, ?2, ?3)",
            params![map, key, value],
        )?;
        Ok(())
    }

    fn map_put_if_absent(
        &mut self,
        map: &str,
        key: &str,
        value: &str,
    ) -> StorageResult<Option<String>> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO map_entries (map_name, key, value) VALUES (?1, ?2, ?3)",
            params![map, key, value],
        )?;
        if inserted > 0 {
            return Ok(None);
        }
        self.map_get(map, key)
    }

    fn map_remove(&mut self, map: &str, key: &str) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM map_entries WHERE map_name = ?1 AND key = ?2",
            params![map, key],
        )?;
        Ok(removed > 0)
    }

    fn map_contains(&self, map: &str, key: &str) -> StorageResult<bool> {
        Ok(self.map_get(map, key)?.is_some())
    }

    fn map_len(&self, map: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM map_entries WHERE map_name = ?1",
            params![map],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn map_clear(&mut self, map: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM map_entries WHERE map_name = ?1", params![map])?;
        Ok(())
    }

    fn map_entries(&self, map: &str) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM map_entries WHERE map_name = ?1 ORDER BY key")?;

        let entries = stmt
            .query_map(params![map], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // ===== Queues =====

    fn queue_offer(
        &mut self,
        queue: &str,
        key: &str,
        priority: i64,
        value: &str,
    ) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO queue_entries (queue_name, key, priority, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![queue, key, priority, value],
        )?;
        Ok(inserted > 0)
    }

    fn queue_poll(&mut self, queue: &str) -> StorageResult<Option<(String, String)>> {
        let next: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT seq, key, value FROM queue_entries WHERE queue_name = ?1
                 ORDER BY priority ASC, seq ASC LIMIT 1",
                params![queue],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match next {
            Some((seq, key, value)) => {
                self.conn
                    .execute("DELETE FROM queue_entries WHERE seq = ?1", params![seq])?;
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }

    fn queue_peek(&self, queue: &str, limit: usize) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM queue_entries WHERE queue_name = ?1
             ORDER BY priority ASC, seq ASC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![queue, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn queue_remove(&mut self, queue: &str, key: &str) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM queue_entries WHERE queue_name = ?1 AND key = ?2",
            params![queue, key],
        )?;
        Ok(removed > 0)
    }

    fn queue_contains(&self, queue: &str, key: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM queue_entries WHERE queue_name = ?1 AND key = ?2",
                params![queue, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn queue_len(&self, queue: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE queue_name = ?1",
            params![queue],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn queue_clear(&mut self, queue: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM queue_entries WHERE queue_name = ?1",
            params![queue],
        )?;
        Ok(())
    }

    // ===== Sets =====

    fn set_add(&mut self, set: &str, member: &str) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO set_members (set_name, member) VALUES (?1, ?2)",
            params![set, member],
        )?;
        Ok(inserted > 0)
    }

    fn set_contains(&self, set: &str, member: &str) -> StorageResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT member FROM set_members WHERE set_name = ?1 AND member = ?2",
                params![set, member],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn set_clear(&mut self, set: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM set_members WHERE set_name = ?1", params![set])?;
        Ok(())
    }

    // ===== Maintenance =====

    fn clear_all(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM attributes;
            DELETE FROM map_entries;
            DELETE FROM queue_entries;
            DELETE FROM set_members;
        ",
        )?;
        Ok(())
    }
}
