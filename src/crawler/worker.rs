//! Worker pool draining the ledger queue
//!
//! Each worker polls a reference (which marks it active), runs it through the
//! import and commit pipelines, then finalizes it: spoiled references go
//! through the strategizer and the final record is stored as processed.

use crate::committer::CommitterRequest;
use crate::crawler::CrawlerContext;
use crate::doc::{CrawlDoc, DocContext};
use crate::event::EventKind;
use crate::pipeline::DocPipelineContext;
use crate::spoil::SpoiledAction;
use crate::state::CrawlState;
use crate::{Result, TidemarkError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Flags of a crawl pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessFlags {
    /// Every polled reference is deleted instead of fetched
    pub delete: bool,

    /// Polled references are orphans of the previous session
    pub orphan: bool,
}

impl ProcessFlags {
    pub fn delete() -> Self {
        Self {
            delete: true,
            orphan: false,
        }
    }

    pub fn orphan() -> Self {
        Self {
            delete: false,
            orphan: true,
        }
    }

    /// Label of the pass, used in task ids and logs
    pub fn label(&self) -> &'static str {
        if self.delete {
            "delete"
        } else if self.orphan {
            "orphan"
        } else {
            "main"
        }
    }
}

/// Why a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Nothing queued and nothing active
    QueueEmpty,
    /// The processed documents budget is spent
    MaxReached,
    /// A stop was requested
    Stopped,
}

/// A single worker
struct DocProcessor {
    id: usize,
    crawler: Arc<CrawlerContext>,
    flags: ProcessFlags,
}

impl DocProcessor {
    async fn run(self) -> Result<WorkerExit> {
        let crawler = self.crawler.clone();
        crawler.fire(
            crawler
                .event(EventKind::CrawlerRunThreadBegin)
                .with_message(format!("worker-{} ({})", self.id, self.flags.label())),
        );

        let exit = self.run_loop().await;

        crawler.fire(
            crawler
                .event(EventKind::CrawlerRunThreadEnd)
                .with_message(format!("worker-{} ({})", self.id, self.flags.label())),
        );
        match &exit {
            Ok(reason) => tracing::debug!("Worker {} exited: {:?}", self.id, reason),
            Err(e) => tracing::error!("Worker {} failed: {}", self.id, e),
        }
        exit
    }

    async fn run_loop(&self) -> Result<WorkerExit> {
        let crawler = &self.crawler;
        let idle = Duration::from_millis(crawler.config.crawler.idle_poll_millis);

        loop {
            if crawler.is_stopping() {
                return Ok(WorkerExit::Stopped);
            }
            if !self.flags.delete && crawler.ledger.is_max_docs_processed_reached()? {
                tracing::info!("Maximum documents processed reached");
                return Ok(WorkerExit::MaxReached);
            }

            let Some(ctx) = crawler.ledger.poll_queue()? else {
                if crawler.ledger.active_count()? == 0
                    && crawler.ledger.is_queue_empty()?
                    && crawler.is_queue_initialized()
                {
                    return Ok(WorkerExit::QueueEmpty);
                }
                tokio::time::sleep(idle).await;
                continue;
            };

            if !self.process(ctx).await? {
                return Ok(WorkerExit::Stopped);
            }
        }
    }

    /// Processes one polled reference
    ///
    /// # Returns
    ///
    /// `false` if processing was interrupted by a stop request. The
    /// reference is then left active so the next session re-queues it.
    async fn process(&self, ctx: DocContext) -> Result<bool> {
        let crawler = self.crawler.clone();
        tracing::debug!("Processing {}", ctx.reference);

        let cached = crawler.ledger.get_cached(&ctx.reference)?;
        let doc = CrawlDoc::new(ctx, cached, self.flags.orphan);
        let mut pipeline_ctx = DocPipelineContext::new(crawler.clone(), doc);

        match self.run_pipelines(&mut pipeline_ctx).await {
            Ok(()) => {}
            Err(TidemarkError::Interrupted) => {
                tracing::debug!(
                    "Interrupted while processing {}",
                    pipeline_ctx.doc.reference()
                );
                return Ok(false);
            }
            Err(e) if e.is_document_error() => {
                tracing::warn!("Could not process {}: {}", pipeline_ctx.doc.reference(), e);
                pipeline_ctx.doc.context.state = Some(CrawlState::Error);
                crawler.fire(
                    crawler
                        .event(EventKind::RejectedError)
                        .with_doc(&pipeline_ctx.doc.context)
                        .with_message(e.to_string()),
                );
            }
            Err(e) => {
                crawler.fire(
                    crawler
                        .event(EventKind::CrawlerError)
                        .with_doc(&pipeline_ctx.doc.context)
                        .with_message(e.to_string()),
                );
                crawler.stop();
                return Err(e);
            }
        }

        finalize(&crawler, pipeline_ctx.doc).await?;
        Ok(true)
    }

    async fn run_pipelines(&self, ctx: &mut DocPipelineContext) -> Result<()> {
        let crawler = ctx.crawler.clone();

        if self.flags.delete {
            ctx.doc.context.state = Some(CrawlState::Deleted);
            let request = CommitterRequest::Delete {
                reference: ctx.doc.reference().to_string(),
                metadata: ctx.doc.metadata.clone(),
            };
            return crawler.commit(request, &ctx.doc.context).await;
        }

        let imported = crawler.pipelines.import.run(ctx).await?;
        if imported && ctx.doc.context.is_good_state() {
            crawler.pipelines.commit.run(ctx).await?;
        } else if !imported && ctx.doc.context.is_new_or_modified() {
            ctx.doc.context.state = Some(CrawlState::Rejected);
        }
        Ok(())
    }
}

/// Stores the outcome of a processed document
///
/// Applies the spoiled reference policy to documents ending in a bad state
/// and moves the reference (and the one it was redirected from) to processed.
async fn finalize(crawler: &Arc<CrawlerContext>, mut doc: CrawlDoc) -> Result<()> {
    if doc.context.state.is_none() {
        doc.context.state = Some(CrawlState::BadStatus);
    }

    if !doc.context.is_new_or_modified() {
        if let Some(cached) = doc.cached.as_ref() {
            doc.context.copy_missing_from(cached);
        }
    }

    let state = doc.context.state_or_bad_status();
    if state.is_spoiled() {
        match crawler
            .strategizer
            .decide(doc.reference(), state, doc.cached.as_ref())
        {
            SpoiledAction::Delete => {
                tracing::debug!("Deleting spoiled reference {} ({})", doc.reference(), state);
                doc.context.state = Some(CrawlState::Deleted);
                let request = CommitterRequest::Delete {
                    reference: doc.reference().to_string(),
                    metadata: doc.metadata.clone(),
                };
                crawler.commit(request, &doc.context).await?;
            }
            SpoiledAction::Grace => {
                tracing::info!(
                    "Spoiled reference graced once: {} ({})",
                    doc.reference(),
                    state
                );
            }
            SpoiledAction::Ignore => {
                tracing::debug!("Spoiled reference ignored: {} ({})", doc.reference(), state);
            }
        }
    }

    crawler.ledger.mark_processed(&doc.context)?;
    if let Some(original) = doc.context.original_reference.as_ref() {
        if original != doc.reference() {
            let mut variation = doc.context.clone();
            variation.reference = original.clone();
            crawler.ledger.mark_processed(&variation)?;
        }
    }

    crawler.fire(
        crawler
            .event(EventKind::DocumentProcessed)
            .with_doc(&doc.context),
    );
    Ok(())
}

/// Fixed-size pool of workers
pub struct WorkerPool {
    crawler: Arc<CrawlerContext>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool of `size` workers (at least one)
    pub fn new(crawler: Arc<CrawlerContext>, size: usize) -> Self {
        Self {
            crawler,
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs the workers until they all exit
    ///
    /// Once a stop is requested, workers get `shutdown-timeout-secs` to
    /// finish the document they hold before being aborted.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every worker exited
    /// * `Err(TidemarkError)` - The first worker failure, or a shutdown timeout
    pub async fn run(&self, flags: ProcessFlags) -> Result<()> {
        tracing::info!(
            "Starting {} workers ({} pass)",
            self.size,
            flags.label()
        );

        let mut workers = JoinSet::new();
        for id in 0..self.size {
            let processor = DocProcessor {
                id,
                crawler: self.crawler.clone(),
                flags,
            };
            workers.spawn(processor.run());
        }

        let shutdown_timeout =
            Duration::from_secs(self.crawler.config.crawler.shutdown_timeout_secs);
        let mut stop_seen: Option<Instant> = None;
        let mut first_error: Option<TidemarkError> = None;

        loop {
            if stop_seen.is_none() && self.crawler.is_stopping() {
                stop_seen = Some(Instant::now());
            }
            if let Some(since) = stop_seen {
                if since.elapsed() >= shutdown_timeout {
                    tracing::error!(
                        "{} workers still running after {:?}, aborting",
                        workers.len(),
                        shutdown_timeout
                    );
                    workers.abort_all();
                    return Err(TidemarkError::ShutdownTimeout {
                        timeout_secs: shutdown_timeout.as_secs(),
                    });
                }
            }

            let joined =
                match tokio::time::timeout(Duration::from_millis(500), workers.join_next()).await {
                    Ok(Some(joined)) => joined,
                    Ok(None) => break,
                    Err(_) => continue,
                };

            let outcome = joined.map_err(|e| TidemarkError::Task {
                task_id: format!("crawl-{}", flags.label()),
                message: e.to_string(),
            });
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) | Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
