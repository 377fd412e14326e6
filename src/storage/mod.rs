//! Storage module for persisting crawl state
//!
//! This module handles everything the crawler needs to survive a restart:
//! - SQLite database initialization and schema management
//! - Named maps, priority queues and sets used by the ledger and committer
//! - Global attributes such as the current crawl stage

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A storage backend shared by every worker of a crawl
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Wraps a backend so it can be shared across workers
pub fn shared<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SharedStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SharedStorage> {
    Ok(shared(SqliteStorage::new(path)?))
}

/// Locks a shared backend
///
/// A poisoned lock means a worker panicked mid-operation; it is reported as
/// an error rather than propagated as a panic.
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + 'static>> {
    storage.lock().map_err(|_| StorageError::Poisoned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_storage_lock() {
        let storage = shared(MemoryStorage::new());
        lock(&storage).unwrap().put_attribute("k", "v").unwrap();
        assert_eq!(
            lock(&storage).unwrap().get_attribute("k").unwrap(),
            Some("v".to_string())
        );
    }
}
