//! Document pipelines
//!
//! A reference goes through three chains of stages:
//! - the queue pipeline decides whether it enters the crawl queue
//! - the import pipeline fetches it and filters it
//! - the commit pipeline detects changes and sends it to the committer
//!
//! Each chain is an explicit ordered list of enum stages (see [`StageChain`]).

mod chain;
mod checksum;
mod commit;
mod dedup;
mod importer;
mod queue;

pub use chain::{Stage, StageChain, StageContext};
pub use checksum::{resolve_checksum, ChecksumKind, DocumentChecksummer, MetadataChecksummer};
pub use commit::{commit_pipeline, CommitterStage};
pub use importer::{import_pipeline, should_continue_on_bad_status, ImporterStage};
pub use queue::{queue_pipeline, QueueStage};

use crate::crawler::CrawlerContext;
use crate::doc::{CrawlDoc, DocContext};
use crate::Result;
use std::sync::Arc;

/// Transforms a document as it goes through the pipelines
///
/// Pre-processors run at the end of the import pipeline, post-processors
/// right before the document is committed. Returning
/// `TidemarkError::Processing` puts the document in the `Error` state.
pub trait DocumentProcessor: Send + Sync {
    fn process_document(&self, doc: &mut CrawlDoc) -> Result<()>;
}

/// The three chains every crawler runs
#[derive(Debug, Clone)]
pub struct Pipelines {
    pub queue: StageChain<QueueStage>,
    pub import: StageChain<ImporterStage>,
    pub commit: StageChain<CommitterStage>,
}

impl Default for Pipelines {
    fn default() -> Self {
        Self {
            queue: queue_pipeline(),
            import: import_pipeline(),
            commit: commit_pipeline(),
        }
    }
}

/// Context of the queue pipeline
pub struct QueuePipelineContext {
    pub crawler: Arc<CrawlerContext>,
    pub doc: DocContext,
}

impl StageContext for QueuePipelineContext {
    fn is_stop_requested(&self) -> bool {
        self.crawler.is_stopping()
    }
}

/// Context of the import and commit pipelines
pub struct DocPipelineContext {
    pub crawler: Arc<CrawlerContext>,
    pub doc: CrawlDoc,
}

impl DocPipelineContext {
    pub fn new(crawler: Arc<CrawlerContext>, doc: CrawlDoc) -> Self {
        Self { crawler, doc }
    }
}

impl StageContext for DocPipelineContext {
    fn is_stop_requested(&self) -> bool {
        self.crawler.is_stopping()
    }
}

/// Runs a reference through the queue pipeline
///
/// # Returns
///
/// The context after the pipeline ran, with a state set if it was rejected
pub async fn queue_reference(crawler: &Arc<CrawlerContext>, doc: DocContext) -> Result<DocContext> {
    let mut ctx = QueuePipelineContext {
        crawler: Arc::clone(crawler),
        doc,
    };
    crawler.pipelines.queue.run(&mut ctx).await?;
    Ok(ctx.doc)
}
