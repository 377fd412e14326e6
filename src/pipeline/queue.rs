//! Queue pipeline: decides whether a reference enters the crawl queue

use crate::event::EventKind;
use crate::filter::resolve_on_match;
use crate::pipeline::{QueuePipelineContext, Stage, StageChain};
use crate::state::CrawlState;
use crate::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStage {
    /// Rejects references deeper than the configured max depth
    DepthValidation,

    /// Applies the reference filters
    ReferenceFilters,

    /// Records the reference in the ledger queue
    QueueReference,
}

/// Builds the queue pipeline
pub fn queue_pipeline() -> StageChain<QueueStage> {
    StageChain::new(
        "queue-pipeline",
        vec![
            QueueStage::DepthValidation,
            QueueStage::ReferenceFilters,
            QueueStage::QueueReference,
        ],
    )
}

#[async_trait]
impl Stage<QueuePipelineContext> for QueueStage {
    fn name(&self) -> &'static str {
        match self {
            Self::DepthValidation => "depth-validation",
            Self::ReferenceFilters => "reference-filters",
            Self::QueueReference => "queue-reference",
        }
    }

    async fn execute(&self, ctx: &mut QueuePipelineContext) -> Result<bool> {
        match self {
            Self::DepthValidation => Ok(validate_depth(ctx)),
            Self::ReferenceFilters => Ok(filter_reference(ctx)),
            Self::QueueReference => queue_reference(ctx),
        }
    }
}

fn validate_depth(ctx: &mut QueuePipelineContext) -> bool {
    let max_depth = ctx.crawler.config.crawler.max_depth;
    if max_depth >= 0 && i64::from(ctx.doc.depth) > i64::from(max_depth) {
        tracing::debug!(
            "Too deep ({} > {}): {}",
            ctx.doc.depth,
            max_depth,
            ctx.doc.reference
        );
        ctx.doc.state = Some(CrawlState::TooDeep);
        let event = ctx
            .crawler
            .event(EventKind::RejectedTooDeep)
            .with_doc(&ctx.doc)
            .with_subject(ctx.doc.depth.to_string());
        ctx.crawler.fire(event);
        return false;
    }
    true
}

fn filter_reference(ctx: &mut QueuePipelineContext) -> bool {
    let crawler = &ctx.crawler;
    let reference = &ctx.doc.reference;
    let outcome = resolve_on_match(&crawler.reference_filters, |f| f.test(reference));
    if outcome.is_accepted() {
        return true;
    }

    ctx.doc.state = Some(CrawlState::Rejected);
    let mut event = crawler.event(EventKind::RejectedFilter).with_doc(&ctx.doc);
    if let crate::filter::FilterOutcome::Rejected(Some(filter)) = outcome {
        event = event.with_subject(filter.to_string());
    }
    if let Some(message) = outcome.rejection_message() {
        event = event.with_message(message);
    }
    crawler.fire(event);
    false
}

fn queue_reference(ctx: &mut QueuePipelineContext) -> Result<bool> {
    if ctx.doc.reference.trim().is_empty() {
        tracing::warn!("Ignoring blank reference (parent: {:?})", ctx.doc.parent_reference);
        return Ok(true);
    }

    if ctx.crawler.ledger.queue(&ctx.doc)? {
        let event = ctx
            .crawler
            .event(EventKind::DocumentQueued)
            .with_doc(&ctx.doc);
        ctx.crawler.fire(event);
    }
    Ok(true)
}
