//! Per-reference processing ledger
//!
//! The ledger records where each reference sits in the current session
//! (queued, active, processed) and keeps the records of the previous completed
//! session as a cached baseline. It is what makes a crawl resumable and what
//! orphan detection iterates over.
//!
//! Layout in storage:
//! - a priority queue of queued references (priority = depth)
//! - a map of active references
//! - two maps that swap roles between sessions: "processed" for this session
//!   and "cached" for the previous one
//! - the persisted crawl stage and the run-once markers

use crate::doc::DocContext;
use crate::state::{CrawlStage, CrawlState, ProcessingStage};
use crate::storage::{lock, SharedStorage, Storage, StorageResult};
use crate::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub const QUEUE: &str = "ledger.queue";
pub const ACTIVE_MAP: &str = "ledger.active";

const PROCESSED_MAP_ATTR: &str = "ledger.processed.map";
const CACHED_MAP_ATTR: &str = "ledger.cached.map";
const MAP_A: &str = "ledger.processed-or-cached";
const MAP_B: &str = "ledger.cached-or-processed";

pub const RUN_ONCE_SET: &str = "session.run-once";
const CRAWL_STAGE_ATTR: &str = "session.crawl-stage";

/// Session-scoped deduplication maps, cleared on every fresh start
pub const METADATA_DEDUP_MAP: &str = "dedup.metadata";
pub const DOCUMENT_DEDUP_MAP: &str = "dedup.document";

/// Tracks the processing stage of every reference
pub struct DocumentLedger {
    storage: SharedStorage,
    max_processed_docs: AtomicI64,
}

impl std::fmt::Debug for DocumentLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLedger")
            .field("max_processed_docs", &self.max_processed_docs)
            .finish()
    }
}

impl DocumentLedger {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            max_processed_docs: AtomicI64::new(-1),
        }
    }

    // ===== Map roles =====

    fn processed_map(storage: &dyn Storage) -> StorageResult<String> {
        Ok(storage
            .get_attribute(PROCESSED_MAP_ATTR)?
            .unwrap_or_else(|| MAP_A.to_string()))
    }

    fn cached_map(storage: &dyn Storage) -> StorageResult<String> {
        Ok(storage
            .get_attribute(CACHED_MAP_ATTR)?
            .unwrap_or_else(|| MAP_B.to_string()))
    }

    // ===== Processing stages =====

    /// Returns where a reference sits in the current session, if anywhere
    pub fn get_processing_stage(&self, reference: &str) -> Result<Option<ProcessingStage>> {
        let storage = lock(&self.storage)?;
        Ok(Self::stage_of(&*storage, reference)?)
    }

    fn stage_of(storage: &dyn Storage, reference: &str) -> StorageResult<Option<ProcessingStage>> {
        if storage.map_contains(ACTIVE_MAP, reference)? {
            return Ok(Some(ProcessingStage::Active));
        }
        if storage.queue_contains(QUEUE, reference)? {
            return Ok(Some(ProcessingStage::Queued));
        }
        let processed = Self::processed_map(storage)?;
        if storage.map_contains(&processed, reference)? {
            return Ok(Some(ProcessingStage::Processed));
        }
        Ok(None)
    }

    /// Queues a reference for processing
    ///
    /// # Returns
    ///
    /// `false` if the reference already has a processing stage this session
    pub fn queue(&self, ctx: &DocContext) -> Result<bool> {
        let mut storage = lock(&self.storage)?;
        if let Some(stage) = Self::stage_of(&*storage, &ctx.reference)? {
            tracing::debug!("Not queuing {}: already {}", ctx.reference, stage);
            return Ok(false);
        }
        let value = serde_json::to_string(ctx)?;
        Ok(storage.queue_offer(QUEUE, &ctx.reference, i64::from(ctx.depth), &value)?)
    }

    /// Takes the next queued reference and marks it active
    ///
    /// Shallower references come first; equal depths come out in queuing order.
    pub fn poll_queue(&self) -> Result<Option<DocContext>> {
        let mut storage = lock(&self.storage)?;
        let Some((reference, value)) = storage.queue_poll(QUEUE)? else {
            return Ok(None);
        };
        storage.map_put(ACTIVE_MAP, &reference, &value)?;
        Ok(Some(serde_json::from_str(&value)?))
    }

    /// Marks a reference active
    ///
    /// # Returns
    ///
    /// `false` if the reference was already processed this session
    pub fn mark_active(&self, ctx: &DocContext) -> Result<bool> {
        let mut storage = lock(&self.storage)?;
        if Self::stage_of(&*storage, &ctx.reference)? == Some(ProcessingStage::Processed) {
            return Ok(false);
        }
        storage.queue_remove(QUEUE, &ctx.reference)?;
        storage.map_put(ACTIVE_MAP, &ctx.reference, &serde_json::to_string(ctx)?)?;
        Ok(true)
    }

    /// Stores the final record of a reference for the next session
    ///
    /// The reference leaves the queue, the active map and the cached
    /// baseline, so it is no orphan anymore.
    pub fn mark_processed(&self, ctx: &DocContext) -> Result<()> {
        let mut storage = lock(&self.storage)?;
        let processed = Self::processed_map(&*storage)?;
        let cached = Self::cached_map(&*storage)?;
        storage.map_put(&processed, &ctx.reference, &serde_json::to_string(ctx)?)?;
        storage.map_remove(ACTIVE_MAP, &ctx.reference)?;
        storage.queue_remove(QUEUE, &ctx.reference)?;
        storage.map_remove(&cached, &ctx.reference)?;
        Ok(())
    }

    // ===== Cached baseline =====

    /// Returns the previous session's record of a reference
    pub fn get_cached(&self, reference: &str) -> Result<Option<DocContext>> {
        let storage = lock(&self.storage)?;
        let cached = Self::cached_map(&*storage)?;
        match storage.map_get(&cached, reference)? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Visits every cached record until the visitor returns `false`
    ///
    /// The entries are read up front so the visitor may use the ledger.
    pub fn for_each_cached<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, DocContext) -> Result<bool>,
    {
        let entries = {
            let storage = lock(&self.storage)?;
            let cached = Self::cached_map(&*storage)?;
            storage.map_entries(&cached)?
        };
        for (reference, value) in entries {
            let ctx: DocContext = serde_json::from_str(&value)?;
            if !visitor(&reference, ctx)? {
                break;
            }
        }
        Ok(())
    }

    // ===== Counts =====

    pub fn queue_len(&self) -> Result<u64> {
        Ok(lock(&self.storage)?.queue_len(QUEUE)?)
    }

    pub fn is_queue_empty(&self) -> Result<bool> {
        Ok(self.queue_len()? == 0)
    }

    pub fn active_count(&self) -> Result<u64> {
        Ok(lock(&self.storage)?.map_len(ACTIVE_MAP)?)
    }

    pub fn processed_count(&self) -> Result<u64> {
        let storage = lock(&self.storage)?;
        let processed = Self::processed_map(&*storage)?;
        Ok(storage.map_len(&processed)?)
    }

    /// Counts processed records by final state
    pub fn processed_states(&self) -> Result<HashMap<CrawlState, u64>> {
        let entries = {
            let storage = lock(&self.storage)?;
            let processed = Self::processed_map(&*storage)?;
            storage.map_entries(&processed)?
        };
        let mut counts = HashMap::new();
        for (_, value) in entries {
            let ctx: DocContext = serde_json::from_str(&value)?;
            if let Some(state) = ctx.state {
                *counts.entry(state).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    pub fn cached_count(&self) -> Result<u64> {
        let storage = lock(&self.storage)?;
        let cached = Self::cached_map(&*storage)?;
        Ok(storage.map_len(&cached)?)
    }

    // ===== Session lifecycle =====

    /// Prepares the ledger for a crawl session
    ///
    /// An unfinished previous session (queued or active references left) is
    /// resumed: active references go back to the queue. Otherwise the
    /// previous processed records become the cached baseline and the session
    /// starts from an empty queue.
    ///
    /// # Returns
    ///
    /// `true` if the previous session is resumed
    pub fn prepare_for_crawl(&self) -> Result<bool> {
        let mut storage = lock(&self.storage)?;
        let resuming =
            storage.queue_len(QUEUE)? > 0 || storage.map_len(ACTIVE_MAP)? > 0;

        if resuming {
            let requeued = Self::requeue_active_locked(&mut *storage)?;
            tracing::info!(
                "Resuming previous session: {} queued, {} active re-queued",
                storage.queue_len(QUEUE)?.saturating_sub(requeued),
                requeued
            );
        } else {
            Self::cache_processed_locked(&mut *storage)?;
            storage.queue_clear(QUEUE)?;
            storage.map_clear(ACTIVE_MAP)?;
            storage.map_clear(METADATA_DEDUP_MAP)?;
            storage.map_clear(DOCUMENT_DEDUP_MAP)?;
            let cached = Self::cached_map(&*storage)?;
            tracing::info!(
                "Starting a new session with {} cached references",
                storage.map_len(&cached)?
            );
        }
        Ok(resuming)
    }

    /// Turns the processed records into the cached baseline
    ///
    /// The old baseline is dropped and the two maps swap roles.
    fn cache_processed_locked(storage: &mut dyn Storage) -> StorageResult<()> {
        let processed = Self::processed_map(storage)?;
        let cached = Self::cached_map(storage)?;
        storage.map_clear(&cached)?;
        storage.put_attribute(PROCESSED_MAP_ATTR, &cached)?;
        storage.put_attribute(CACHED_MAP_ATTR, &processed)?;
        Ok(())
    }

    /// Puts references left active by an interrupted session back in the queue
    ///
    /// # Returns
    ///
    /// The number of re-queued references
    pub fn requeue_active(&self) -> Result<u64> {
        let mut storage = lock(&self.storage)?;
        Ok(Self::requeue_active_locked(&mut *storage)?)
    }

    fn requeue_active_locked(storage: &mut dyn Storage) -> StorageResult<u64> {
        let mut count = 0;
        for (reference, value) in storage.map_entries(ACTIVE_MAP)? {
            let ctx: DocContext = serde_json::from_str(&value)?;
            storage.map_remove(ACTIVE_MAP, &reference)?;
            storage.queue_offer(QUEUE, &reference, i64::from(ctx.depth), &value)?;
            count += 1;
        }
        Ok(count)
    }

    /// Drops every queued and active reference
    pub fn discard_pending(&self) -> Result<()> {
        let mut storage = lock(&self.storage)?;
        storage.queue_clear(QUEUE)?;
        storage.map_clear(ACTIVE_MAP)?;
        Ok(())
    }

    /// Deletes everything the crawl stored
    pub fn clear_all(&self) -> Result<()> {
        lock(&self.storage)?.clear_all()?;
        Ok(())
    }

    // ===== Crawl stage =====

    /// Returns the persisted crawl stage, `Idle` when none was ever stored
    pub fn crawl_stage(&self) -> Result<CrawlStage> {
        let storage = lock(&self.storage)?;
        Ok(storage
            .get_attribute(CRAWL_STAGE_ATTR)?
            .and_then(|s| CrawlStage::from_db_string(&s))
            .unwrap_or(CrawlStage::Idle))
    }

    pub fn set_crawl_stage(&self, stage: CrawlStage) -> Result<()> {
        lock(&self.storage)?.put_attribute(CRAWL_STAGE_ATTR, stage.to_db_string())?;
        Ok(())
    }

    // ===== Run-once markers =====

    pub fn is_run_once_done(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.storage)?.set_contains(RUN_ONCE_SET, id)?)
    }

    pub fn mark_run_once(&self, id: &str) -> Result<()> {
        lock(&self.storage)?.set_add(RUN_ONCE_SET, id)?;
        Ok(())
    }

    pub fn clear_run_once(&self) -> Result<()> {
        lock(&self.storage)?.set_clear(RUN_ONCE_SET)?;
        Ok(())
    }

    // ===== Max documents =====

    /// Sets the processed documents budget, -1 for unlimited
    ///
    /// When resuming, documents already processed by the interrupted session
    /// do not count against the budget.
    pub fn set_max_processed_docs(&self, max: i64, resuming: bool) -> Result<()> {
        let mut budget = max;
        if resuming && max > -1 {
            let processed = i64::try_from(self.processed_count()?).unwrap_or(i64::MAX);
            budget = max.saturating_add(processed);
        }
        self.max_processed_docs.store(budget, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_max_docs_processed_reached(&self) -> Result<bool> {
        let max = self.max_processed_docs.load(Ordering::SeqCst);
        if max < 0 {
            return Ok(false);
        }
        let processed = i64::try_from(self.processed_count()?).unwrap_or(i64::MAX);
        Ok(processed >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, MemoryStorage};

    fn ledger() -> DocumentLedger {
        DocumentLedger::new(shared(MemoryStorage::new()))
    }

    fn processed(reference: &str, state: CrawlState) -> DocContext {
        let mut ctx = DocContext::new(reference);
        ctx.state = Some(state);
        ctx
    }

    /// Runs a full session over the given references
    fn complete_session(ledger: &DocumentLedger, references: &[&str]) {
        ledger.prepare_for_crawl().unwrap();
        for reference in references {
            ledger.queue(&DocContext::new(*reference)).unwrap();
        }
        while let Some(ctx) = ledger.poll_queue().unwrap() {
            ledger
                .mark_processed(&processed(&ctx.reference, CrawlState::New))
                .unwrap();
        }
    }

    #[test]
    fn test_stage_progression() {
        let ledger = ledger();
        let ctx = DocContext::new("http://a");
        assert_eq!(ledger.get_processing_stage("http://a").unwrap(), None);

        assert!(ledger.queue(&ctx).unwrap());
        assert_eq!(
            ledger.get_processing_stage("http://a").unwrap(),
            Some(ProcessingStage::Queued)
        );

        let polled = ledger.poll_queue().unwrap().unwrap();
        assert_eq!(polled.reference, "http://a");
        assert_eq!(
            ledger.get_processing_stage("http://a").unwrap(),
            Some(ProcessingStage::Active)
        );

        ledger
            .mark_processed(&processed("http://a", CrawlState::New))
            .unwrap();
        assert_eq!(
            ledger.get_processing_stage("http://a").unwrap(),
            Some(ProcessingStage::Processed)
        );
        assert_eq!(ledger.active_count().unwrap(), 0);
    }

    #[test]
    fn test_queue_is_idempotent() {
        let ledger = ledger();
        let ctx = DocContext::new("http://a");
        assert!(ledger.queue(&ctx).unwrap());
        assert!(!ledger.queue(&ctx).unwrap());
        assert_eq!(ledger.queue_len().unwrap(), 1);

        ledger.poll_queue().unwrap();
        assert!(!ledger.queue(&ctx).unwrap());

        ledger
            .mark_processed(&processed("http://a", CrawlState::New))
            .unwrap();
        assert!(!ledger.queue(&ctx).unwrap());
        assert_eq!(ledger.queue_len().unwrap(), 0);
    }

    #[test]
    fn test_processed_never_goes_back_to_active() {
        let ledger = ledger();
        ledger
            .mark_processed(&processed("http://a", CrawlState::New))
            .unwrap();
        assert!(!ledger.mark_active(&DocContext::new("http://a")).unwrap());
        assert_eq!(
            ledger.get_processing_stage("http://a").unwrap(),
            Some(ProcessingStage::Processed)
        );
    }

    #[test]
    fn test_poll_orders_by_depth() {
        let ledger = ledger();
        ledger.queue(&DocContext::with_depth("deep", 3)).unwrap();
        ledger.queue(&DocContext::with_depth("first", 1)).unwrap();
        ledger.queue(&DocContext::with_depth("second", 1)).unwrap();
        ledger.queue(&DocContext::new("root")).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| ledger.poll_queue().unwrap())
            .map(|c| c.reference)
            .collect();
        assert_eq!(order, vec!["root", "first", "second", "deep"]);
    }

    #[test]
    fn test_fresh_session_caches_previous_processed() {
        let ledger = ledger();
        complete_session(&ledger, &["http://a", "http://b"]);
        assert_eq!(ledger.processed_count().unwrap(), 2);

        assert!(!ledger.prepare_for_crawl().unwrap());
        assert_eq!(ledger.processed_count().unwrap(), 0);
        assert_eq!(ledger.cached_count().unwrap(), 2);
        assert_eq!(
            ledger.get_cached("http://a").unwrap().unwrap().state,
            Some(CrawlState::New)
        );

        // Processing removes the reference from the baseline
        ledger
            .mark_processed(&processed("http://a", CrawlState::Unmodified))
            .unwrap();
        assert!(ledger.get_cached("http://a").unwrap().is_none());
        assert_eq!(ledger.cached_count().unwrap(), 1);
    }

    #[test]
    fn test_cached_baseline_is_replaced_each_session() {
        let ledger = ledger();
        complete_session(&ledger, &["http://a", "http://b"]);
        complete_session(&ledger, &["http://a"]);

        // http://b was an orphan of the second session and is gone now
        ledger.prepare_for_crawl().unwrap();
        assert_eq!(ledger.cached_count().unwrap(), 1);
        assert!(ledger.get_cached("http://b").unwrap().is_none());
    }

    #[test]
    fn test_resume_requeues_active() {
        let ledger = ledger();
        ledger.prepare_for_crawl().unwrap();
        ledger.queue(&DocContext::new("http://a")).unwrap();
        ledger.queue(&DocContext::new("http://b")).unwrap();
        ledger.poll_queue().unwrap();
        assert_eq!(ledger.active_count().unwrap(), 1);

        assert!(ledger.prepare_for_crawl().unwrap());
        assert_eq!(ledger.active_count().unwrap(), 0);
        assert_eq!(ledger.queue_len().unwrap(), 2);
    }

    #[test]
    fn test_for_each_cached_stops_early() {
        let ledger = ledger();
        complete_session(&ledger, &["a", "b", "c"]);
        ledger.prepare_for_crawl().unwrap();

        let mut seen = Vec::new();
        ledger
            .for_each_cached(|reference, _| {
                seen.push(reference.to_string());
                Ok(seen.len() < 2)
            })
            .unwrap();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_crawl_stage_and_run_once() {
        let ledger = ledger();
        assert_eq!(ledger.crawl_stage().unwrap(), CrawlStage::Idle);
        ledger.set_crawl_stage(CrawlStage::Crawl).unwrap();
        assert_eq!(ledger.crawl_stage().unwrap(), CrawlStage::Crawl);

        assert!(!ledger.is_run_once_done("prepare").unwrap());
        ledger.mark_run_once("prepare").unwrap();
        assert!(ledger.is_run_once_done("prepare").unwrap());
        ledger.clear_run_once().unwrap();
        assert!(!ledger.is_run_once_done("prepare").unwrap());
    }

    #[test]
    fn test_max_docs() {
        let ledger = ledger();
        ledger.set_max_processed_docs(-1, false).unwrap();
        assert!(!ledger.is_max_docs_processed_reached().unwrap());

        ledger.set_max_processed_docs(1, false).unwrap();
        assert!(!ledger.is_max_docs_processed_reached().unwrap());
        ledger
            .mark_processed(&processed("a", CrawlState::New))
            .unwrap();
        assert!(ledger.is_max_docs_processed_reached().unwrap());

        // Resuming extends the budget by what was already processed
        ledger.set_max_processed_docs(1, true).unwrap();
        assert!(!ledger.is_max_docs_processed_reached().unwrap());
    }

    #[test]
    fn test_processed_states() {
        let ledger = ledger();
        for (reference, state) in [
            ("a", CrawlState::New),
            ("b", CrawlState::New),
            ("c", CrawlState::NotFound),
        ] {
            ledger.mark_processed(&processed(reference, state)).unwrap();
        }
        let states = ledger.processed_states().unwrap();
        assert_eq!(states.get(&CrawlState::New), Some(&2));
        assert_eq!(states.get(&CrawlState::NotFound), Some(&1));
        assert!(states.get(&CrawlState::Deleted).is_none());
    }
}
