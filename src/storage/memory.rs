//! In-memory storage implementation
//!
//! Mirrors the SQLite backend's semantics without persistence. Handy for
//! tests and for crawls that never need to resume.

use crate::storage::traits::{Storage, StorageResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A priority queue with unique keys
#[derive(Debug, Default)]
struct MemoryQueue {
    /// (priority, sequence) -> key
    order: BTreeMap<(i64, u64), String>,
    /// key -> (priority, sequence, value)
    entries: HashMap<String, (i64, u64, String)>,
    next_seq: u64,
}

impl MemoryQueue {
    fn offer(&mut self, key: &str, priority: i64, value: &str) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((priority, seq), key.to_string());
        self.entries
            .insert(key.to_string(), (priority, seq, value.to_string()));
        true
    }

    fn poll(&mut self) -> Option<(String, String)> {
        let (_, key) = self.order.pop_first()?;
        let (_, _, value) = self.entries.remove(&key)?;
        Some((key, value))
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((priority, seq, _)) => {
                self.order.remove(&(priority, seq));
                true
            }
            None => false,
        }
    }
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    attributes: HashMap<String, String>,
    maps: HashMap<String, BTreeMap<String, String>>,
    queues: HashMap<String, MemoryQueue>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    // ===== Attributes =====

    fn get_attribute(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.attributes.get(key).cloned())
    }

    fn put_attribute(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.attributes.insert(key.to_string(), value.to_string());
        Ok(())
    }

    // ===== Maps =====

    fn map_get(&self, map: &str, key: &str) -> StorageResult<Option<String>> {
        Ok(self.maps.get(map).and_then(|m| m.get(key)).cloned())
    }

    fn map_put(&mut self, map: &str, key: &str, value: &str) -> StorageResult<()> {
        self.maps
            .entry(map.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn map_put_if_absent(
        &mut self,
        map: &str,
        key: &str,
        value: &str,
    ) -> StorageResult<Option<String>> {
        let entries = self.maps.entry(map.to_string()).or_default();
        if let Some(existing) = entries.get(key) {
            return Ok(Some(existing.clone()));
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(None)
    }

    fn map_remove(&mut self, map: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .maps
            .get_mut(map)
            .map(|m| m.remove(key).is_some())
            .unwrap_or(false))
    }

    fn map_contains(&self, map: &str, key: &str) -> StorageResult<bool> {
        Ok(self.maps.get(map).map(|m| m.contains_key(key)).unwrap_or(false))
    }

    fn map_len(&self, map: &str) -> StorageResult<u64> {
        Ok(self.maps.get(map).map(|m| m.len() as u64).unwrap_or(0))
    }

    fn map_clear(&mut self, map: &str) -> StorageResult<()> {
        self.maps.remove(map);
        Ok(())
    }

    fn map_entries(&self, map: &str) -> StorageResult<Vec<(String, String)>> {
        Ok(self
            .maps
            .get(map)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    // ===== Queues =====

    fn queue_offer(
        &mut self,
        queue: &str,
        key: &str,
        priority: i64,
        value: &str,
    ) -> StorageResult<bool> {
        Ok(self
            .queues
            .entry(queue.to_string())
            .or_default()
            .offer(key, priority, value))
    }

    fn queue_poll(&mut self, queue: &str) -> StorageResult<Option<(String, String)>> {
        Ok(self.queues.get_mut(queue).and_then(MemoryQueue::poll))
    }

    fn queue_peek(&self, queue: &str, limit: usize) -> StorageResult<Vec<(String, String)>> {
        let Some(q) = self.queues.get(queue) else {
            return Ok(Vec::new());
        };
        Ok(q.order
            .values()
            .take(limit)
            .filter_map(|key| {
                q.entries
                    .get(key)
                    .map(|(_, _, value)| (key.clone(), value.clone()))
            })
            .collect())
    }

    fn queue_remove(&mut self, queue: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .queues
            .get_mut(queue)
            .map(|q| q.remove(key))
            .unwrap_or(false))
    }

    fn queue_contains(&self, queue: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .queues
            .get(queue)
            .map(|q| q.entries.contains_key(key))
            .unwrap_or(false))
    }

    fn queue_len(&self, queue: &str) -> StorageResult<u64> {
        Ok(self
            .queues
            .get(queue)
            .map(|q| q.entries.len() as u64)
            .unwrap_or(0))
    }

    fn queue_clear(&mut self, queue: &str) -> StorageResult<()> {
        self.queues.remove(queue);
        Ok(())
    }

    // ===== Sets =====

    fn set_add(&mut self, set: &str, member: &str) -> StorageResult<bool> {
        Ok(self
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    fn set_contains(&self, set: &str, member: &str) -> StorageResult<bool> {
        Ok(self.sets.get(set).map(|s| s.contains(member)).unwrap_or(false))
    }

    fn set_clear(&mut self, set: &str) -> StorageResult<()> {
        self.sets.remove(set);
        Ok(())
    }

    // ===== Maintenance =====

    fn clear_all(&mut self) -> StorageResult<()> {
        self.attributes.clear();
        self.maps.clear();
        self.queues.clear();
        self.sets.clear();
        Ok(())
    }
}
