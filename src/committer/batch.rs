//! Durable batching in front of a committer
//!
//! Requests are buffered in a storage queue keyed by reference, so a crash
//! never loses an accepted request and a newer request for the same
//! reference replaces the buffered one. Once the buffer reaches the batch
//! size, the oldest batch is sent to the sink and removed only if the sink
//! accepted it.

use crate::committer::{Committer, CommitterRequest};
use crate::event::{CrawlerEvent, EventBus, EventKind};
use crate::storage::{lock, SharedStorage};
use crate::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage queue holding buffered requests
pub const COMMITTER_QUEUE: &str = "committer-queue";

/// Buffers committer requests and flushes them in batches
pub struct BatchCommitQueue {
    storage: SharedStorage,
    committer: Arc<dyn Committer>,
    events: EventBus,
    source: String,
    batch_size: usize,

    /// Serializes flushes so a batch is never sent twice
    flush_lock: Mutex<()>,
}

impl BatchCommitQueue {
    /// Creates a new batch queue
    ///
    /// # Arguments
    ///
    /// * `storage` - Where buffered requests are kept
    /// * `committer` - The sink batches are sent to
    /// * `events` - Bus for committer events
    /// * `source` - Crawler id used as event source
    /// * `batch_size` - Number of buffered requests that triggers a flush
    pub fn new(
        storage: SharedStorage,
        committer: Arc<dyn Committer>,
        events: EventBus,
        source: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            storage,
            committer,
            events,
            source: source.into(),
            batch_size: batch_size.max(1),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of buffered requests
    pub fn len(&self) -> Result<u64> {
        Ok(lock(&self.storage)?.queue_len(COMMITTER_QUEUE)?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Buffers a request, flushing a batch if the buffer is full
    pub async fn push(&self, request: CommitterRequest) -> Result<()> {
        let value = serde_json::to_string(&request)?;
        let len = {
            let mut storage = lock(&self.storage)?;
            storage.queue_remove(COMMITTER_QUEUE, request.reference())?;
            storage.queue_offer(COMMITTER_QUEUE, request.reference(), 0, &value)?;
            storage.queue_len(COMMITTER_QUEUE)?
        };

        if len >= self.batch_size as u64 {
            self.flush_batch(true).await?;
        }
        Ok(())
    }

    /// Flushes every buffered request
    pub async fn flush_all(&self) -> Result<()> {
        while !self.is_empty()? {
            self.flush_batch(false).await?;
        }
        Ok(())
    }

    /// Sends the oldest batch to the committer
    ///
    /// With `require_full`, nothing is sent unless a whole batch is buffered
    /// (another worker may have flushed it meanwhile).
    async fn flush_batch(&self, require_full: bool) -> Result<()> {
        let _guard = self.flush_lock.lock().await;

        let entries = lock(&self.storage)?.queue_peek(COMMITTER_QUEUE, self.batch_size)?;
        if entries.is_empty() || (require_full && entries.len() < self.batch_size) {
            return Ok(());
        }

        let batch = entries
            .iter()
            .map(|(_, value)| serde_json::from_str(value))
            .collect::<std::result::Result<Vec<CommitterRequest>, _>>()?;

        self.fire(EventKind::CommitterBatchBegin, batch.len());
        tracing::debug!("Committing batch of {} requests", batch.len());

        if let Err(e) = self.committer.commit_batch(&batch).await {
            tracing::error!("Committer batch failed: {}", e);
            self.events.fire(
                CrawlerEvent::new(EventKind::CommitterBatchError, &self.source)
                    .with_message(e.to_string()),
            );
            return Err(e.into());
        }

        {
            let mut storage = lock(&self.storage)?;
            let buffered = storage.queue_peek(COMMITTER_QUEUE, usize::MAX)?;
            for entry in &entries {
                // A newer request for the same reference may have replaced this one
                if buffered.contains(entry) {
                    storage.queue_remove(COMMITTER_QUEUE, &entry.0)?;
                }
            }
        }

        self.fire(EventKind::CommitterBatchEnd, batch.len());
        Ok(())
    }

    /// Drops buffered requests and cleans the committer
    pub async fn clean(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().await;
        lock(&self.storage)?.queue_clear(COMMITTER_QUEUE)?;
        self.committer.clean().await?;
        self.events
            .fire(CrawlerEvent::new(EventKind::CommitterClean, &self.source));
        Ok(())
    }

    fn fire(&self, kind: EventKind, count: usize) {
        self.events.fire(
            CrawlerEvent::new(kind, &self.source).with_message(format!("{} requests", count)),
        );
    }
}
