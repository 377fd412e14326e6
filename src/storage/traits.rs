//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types. Backends expose four primitive structures, each
//! addressed by name: attributes (global key/value), maps, priority queues
//! and sets. Values are opaque strings; callers decide the encoding.

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
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method is atomic with respect to other calls on the same backend.
/// Backends are shared between workers behind a mutex (see `SharedStorage`).
pub trait Storage: Send {
    // ===== Attributes =====

    /// Gets a global attribute
    fn get_attribute(&self, key: &str) -> StorageResult<Option<String>>;

    /// Sets a global attribute, replacing any previous value
    fn put_attribute(&mut self, key: &str, value: &str) -> StorageResult<()>;

    // ===== Maps =====

    /// Gets a value from a named map
    fn map_get(&self, map: &str, key: &str) -> StorageResult<Option<String>>;

    /// Puts a value into a named map, replacing any previous value
    fn map_put(&mut self, map: &str, key: &str, value: &str) -> StorageResult<()>;

    /// Puts a value only if the key is absent
    ///
    /// # Returns
    ///
    /// The value already present, or `None` if this call inserted
    fn map_put_if_absent(&mut self, map: &str, key: &str, value: &str)
        -> StorageResult<Option<String>>;

    /// Removes a key from a named map
    ///
    /// # Returns
    ///
    /// `true` if the key was present
    fn map_remove(&mut self, map: &str, key: &str) -> StorageResult<bool>;

    /// Checks whether a named map contains a key
    fn map_contains(&self, map: &str, key: &str) -> StorageResult<bool>;

    /// Counts the entries of a named map
    fn map_len(&self, map: &str) -> StorageResult<u64>;

    /// Removes every entry of a named map
    fn map_clear(&mut self, map: &str) -> StorageResult<()>;

    /// Returns all entries of a named map ordered by key
    fn map_entries(&self, map: &str) -> StorageResult<Vec<(String, String)>>;

    // ===== Queues =====

    /// Offers an entry to a named queue
    ///
    /// Entries are delivered by ascending priority, then insertion order.
    /// Keys are unique per queue: offering an existing key is a no-op.
    ///
    /// # Returns
    ///
    /// `true` if the entry was inserted
    fn queue_offer(&mut self, queue: &str, key: &str, priority: i64, value: &str)
        -> StorageResult<bool>;

    /// Removes and returns the next entry of a named queue
    fn queue_poll(&mut self, queue: &str) -> StorageResult<Option<(String, String)>>;

    /// Returns up to `limit` entries in delivery order without removing them
    fn queue_peek(&self, queue: &str, limit: usize) -> StorageResult<Vec<(String, String)>>;

    /// Removes an entry by key
    fn queue_remove(&mut self, queue: &str, key: &str) -> StorageResult<bool>;

    /// Checks whether a named queue holds a key
    fn queue_contains(&self, queue: &str, key: &str) -> StorageResult<bool>;

    /// Counts the entries of a named queue
    fn queue_len(&self, queue: &str) -> StorageResult<u64>;

    /// Removes every entry of a named queue
    fn queue_clear(&mut self, queue: &str) -> StorageResult<()>;

    // ===== Sets =====

    /// Adds a member to a named set
    ///
    /// # Returns
    ///
    /// `true` if the member was not present yet
    fn set_add(&mut self, set: &str, member: &str) -> StorageResult<bool>;

    /// Checks set membership
    fn set_contains(&self, set: &str, member: &str) -> StorageResult<bool>;

    /// Removes every member of a named set
    fn set_clear(&mut self, set: &str) -> StorageResult<()>;

    // ===== Maintenance =====

    /// Deletes everything the backend holds
    fn clear_all(&mut self) -> StorageResult<()>;
}
