//! Crawl session orchestration
//!
//! A session walks the crawl stages `INITIALIZE -> CRAWL -> HANDLE_ORPHANS`
//! and ends in `ENDED`. Each stage is persisted as it is entered, so a
//! session that crashed or was stopped resumes on the stage it was in:
//! completed stages are skipped, the current one runs again.

use crate::config::OrphansStrategy;
use crate::crawler::executor::{boxed, TaskExecutor, TaskFactory, TaskHandle, TaskOptions};
use crate::crawler::worker::{ProcessFlags, WorkerPool};
use crate::crawler::CrawlerContext;
use crate::doc::DocContext;
use crate::event::EventKind;
use crate::pipeline::queue_reference;
use crate::state::{CrawlStage, CrawlState};
use crate::{Result, TidemarkError};
use std::sync::Arc;
use std::time::Duration;

/// Run-once marker of the ledger preparation
const LEDGER_PREPARE_TASK: &str = "ledger-prepare";

/// Task id of the background seeding
const QUEUE_START_REFERENCES_TASK: &str = "queue-start-references";

/// Stages of a session, in order
const STAGES: [CrawlStage; 3] = [
    CrawlStage::Initialize,
    CrawlStage::Crawl,
    CrawlStage::HandleOrphans,
];

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every stage ran; the next session starts fresh
    Completed,
    /// A stop was requested; the next session resumes
    Stopped,
}

/// Drives one crawl session
pub struct CrawlSession {
    crawler: Arc<CrawlerContext>,
    executor: Arc<dyn TaskExecutor>,
    resuming: bool,
    seeding: Option<TaskHandle>,
}

impl CrawlSession {
    pub fn new(crawler: Arc<CrawlerContext>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            crawler,
            executor,
            resuming: false,
            seeding: None,
        }
    }

    pub fn crawler(&self) -> &Arc<CrawlerContext> {
        &self.crawler
    }

    /// Runs the session until it ends or is stopped
    ///
    /// # Returns
    ///
    /// * `Ok(SessionOutcome)` - How the session ended
    /// * `Err(TidemarkError)` - A fatal failure; the current stage stays
    ///   persisted so the next session resumes it
    pub async fn run(&mut self) -> Result<SessionOutcome> {
        let crawler = self.crawler.clone();
        let mut current = crawler.ledger.crawl_stage()?;

        if current.is_restartable() {
            tracing::info!("Starting crawler \"{}\"", crawler.id());
            crawler.ledger.clear_run_once()?;
            crawler.ledger.set_crawl_stage(CrawlStage::Idle)?;
            current = CrawlStage::Idle;
            self.resuming = false;
        } else {
            tracing::info!(
                "Resuming crawler \"{}\" at stage {}",
                crawler.id(),
                current
            );
            self.resuming = true;
            let requeued = crawler.ledger.requeue_active()?;
            if requeued > 0 {
                tracing::info!("Re-queued {} references left active", requeued);
            }
            crawler.set_queue_initialized(current > CrawlStage::Initialize);
            crawler
                .ledger
                .set_max_processed_docs(crawler.config.crawler.max_documents, true)?;
        }

        for stage in STAGES {
            if crawler.is_stopping() {
                break;
            }
            if stage < current {
                tracing::debug!("Skipping completed stage {}", stage);
                continue;
            }

            crawler.ledger.set_crawl_stage(stage)?;
            let (begin, end) = stage_events(stage);
            crawler.fire(crawler.event(begin));
            match stage {
                CrawlStage::Initialize => self.initialize().await?,
                CrawlStage::Crawl => self.crawl().await?,
                CrawlStage::HandleOrphans => self.handle_orphans().await?,
                CrawlStage::Idle | CrawlStage::Ended => {}
            }
            crawler.fire(crawler.event(end));
        }

        if crawler.is_stopping() {
            self.abandon_seeding();
            crawler.fire(crawler.event(EventKind::CrawlerStopEnd));
            tracing::info!(
                "Crawler \"{}\" stopped. Run it again to resume.",
                crawler.id()
            );
            return Ok(SessionOutcome::Stopped);
        }

        crawler.ledger.set_crawl_stage(CrawlStage::Ended)?;
        tracing::info!("Crawler \"{}\" completed", crawler.id());
        crawler.metrics.log_summary();
        Ok(SessionOutcome::Completed)
    }

    // ===== Initialize =====

    async fn initialize(&mut self) -> Result<()> {
        let crawler = self.crawler.clone();

        if !crawler.ledger.is_run_once_done(LEDGER_PREPARE_TASK)? {
            // A finished session may still have left references queued
            if crawler.ledger.prepare_for_crawl()? {
                self.resuming = true;
            }
            crawler.ledger.mark_run_once(LEDGER_PREPARE_TASK)?;
        }
        crawler
            .ledger
            .set_max_processed_docs(crawler.config.crawler.max_documents, self.resuming)?;

        let references = crawler.config.crawler.start_references.clone();
        if crawler.config.crawler.start_references_async {
            tracing::info!(
                "Queuing {} start references in the background",
                references.len()
            );
            crawler.set_queue_initialized(false);
            let seeder = crawler.clone();
            self.seeding = Some(self.executor.execute_on_one(
                QUEUE_START_REFERENCES_TASK,
                boxed(async move {
                    let result = queue_start_references(&seeder, references).await;
                    if result.is_err() {
                        seeder.stop();
                    }
                    seeder.set_queue_initialized(true);
                    result
                }),
            ));
        } else {
            queue_start_references(&crawler, references).await?;
            crawler.set_queue_initialized(true);
        }
        Ok(())
    }

    // ===== Crawl =====

    async fn crawl(&mut self) -> Result<()> {
        let crawler = self.crawler.clone();
        self.process_queue(ProcessFlags::default()).await?;
        crawler.committer.flush_all().await?;

        if let Some(seeding) = self.seeding.take() {
            let timeout = Duration::from_secs(crawler.config.crawler.queue_init_timeout_secs);
            seeding.join_timeout(timeout).await?;
        }
        Ok(())
    }

    /// Runs a crawl pass on every node and waits for it
    async fn process_queue(&self, flags: ProcessFlags) -> Result<()> {
        let crawler = self.crawler.clone();
        let size = crawler.config.crawler.num_threads as usize;
        let task_id = format!("crawl-{}", flags.label());

        let factory: TaskFactory = Arc::new(move || {
            let pool = WorkerPool::new(crawler.clone(), size);
            boxed(async move { pool.run(flags).await })
        });
        self.executor
            .execute_on_all(&task_id, factory, TaskOptions::named(task_id.clone()))
            .join()
            .await
    }

    fn abandon_seeding(&mut self) {
        if let Some(seeding) = self.seeding.take() {
            if !seeding.is_finished() {
                tracing::debug!("Start references not fully queued; the next session resumes");
            }
        }
    }

    // ===== Orphans =====

    async fn handle_orphans(&mut self) -> Result<()> {
        let crawler = self.crawler.clone();
        match crawler.config.crawler.orphans_strategy {
            OrphansStrategy::Process => self.reprocess_orphans().await?,
            OrphansStrategy::Delete => self.delete_orphans().await?,
            OrphansStrategy::Ignore => {
                tracing::debug!("Ignoring orphans");
            }
        }
        crawler.committer.flush_all().await
    }

    async fn reprocess_orphans(&self) -> Result<()> {
        let crawler = self.crawler.clone();
        if crawler.ledger.is_max_docs_processed_reached()? {
            tracing::info!(
                "Max documents reached. Not reprocessing orphans (if any). Run the crawler again to resume."
            );
            return Ok(());
        }

        let mut orphans = Vec::new();
        crawler.ledger.for_each_cached(|reference, cached| {
            let mut orphan = DocContext::with_depth(reference, cached.depth);
            orphan.parent_reference = cached.parent_reference;
            orphans.push(orphan);
            Ok(true)
        })?;

        if orphans.is_empty() {
            return Ok(());
        }
        tracing::info!("Reprocessing {} orphan references", orphans.len());
        for orphan in orphans {
            match queue_reference(&crawler, orphan).await {
                Ok(_) => {}
                Err(TidemarkError::Interrupted) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        self.process_queue(ProcessFlags::orphan()).await
    }

    async fn delete_orphans(&self) -> Result<()> {
        let crawler = self.crawler.clone();
        let ledger = &crawler.ledger;

        // Orphans queued by an interrupted pass count as well
        let mut count = 0u64;
        ledger.for_each_cached(|_, cached| {
            // Already deleted by an earlier session
            if cached.state == Some(CrawlState::Deleted) {
                return Ok(true);
            }
            ledger.queue(&cached)?;
            count += 1;
            Ok(true)
        })?;

        if count == 0 {
            return Ok(());
        }
        tracing::info!("Deleting {} orphan references", count);
        self.process_queue(ProcessFlags::delete()).await
    }

    // ===== Clean =====

    /// Wipes everything the crawler stored and cleans the committer
    pub async fn clean(crawler: &CrawlerContext) -> Result<()> {
        crawler.fire(crawler.event(EventKind::CrawlerCleanBegin));
        crawler.ledger.clear_all()?;
        crawler.committer.clean().await?;
        crawler.fire(crawler.event(EventKind::CrawlerCleanEnd));
        tracing::info!("Crawler \"{}\" cleaned", crawler.id());
        Ok(())
    }
}

/// Queues start references through the queue pipeline
///
/// A stop request ends the seeding early without error; the queue is
/// completed when the session resumes.
async fn queue_start_references(
    crawler: &Arc<CrawlerContext>,
    references: Vec<String>,
) -> Result<()> {
    let mut queued = 0usize;
    for reference in references {
        match queue_reference(crawler, DocContext::new(reference)).await {
            Ok(_) => queued += 1,
            Err(TidemarkError::Interrupted) => {
                tracing::info!("Queuing of start references interrupted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!("Queued {} start references", queued);
    Ok(())
}

fn stage_events(stage: CrawlStage) -> (EventKind, EventKind) {
    match stage {
        CrawlStage::Initialize => (EventKind::CrawlerInitBegin, EventKind::CrawlerInitEnd),
        CrawlStage::HandleOrphans => (EventKind::CrawlerOrphansBegin, EventKind::CrawlerOrphansEnd),
        CrawlStage::Idle | CrawlStage::Crawl | CrawlStage::Ended => {
            (EventKind::CrawlerCrawlBegin, EventKind::CrawlerCrawlEnd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_are_ordered() {
        assert!(STAGES.windows(2).all(|w| w[0] < w[1]));
        assert!(CrawlStage::Idle < STAGES[0]);
        assert!(STAGES[2] < CrawlStage::Ended);
    }

    #[test]
    fn test_stage_events() {
        assert_eq!(
            stage_events(CrawlStage::Initialize),
            (EventKind::CrawlerInitBegin, EventKind::CrawlerInitEnd)
        );
        assert_eq!(
            stage_events(CrawlStage::Crawl),
            (EventKind::CrawlerCrawlBegin, EventKind::CrawlerCrawlEnd)
        );
        assert_eq!(
            stage_events(CrawlStage::HandleOrphans),
            (EventKind::CrawlerOrphansBegin, EventKind::CrawlerOrphansEnd)
        );
    }
}
