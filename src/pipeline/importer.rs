//! Import pipeline: fetches a document and decides whether it is worth committing
//!
//! Stages come in per-directive pairs. The metadata directive (a cheap probe
//! such as an HTTP HEAD) runs first, then the document directive. Stages
//! derived from metadata run once: after the metadata fetch when it
//! succeeded, after the document fetch otherwise.

use crate::doc::CrawlDoc;
use crate::event::EventKind;
use crate::fetch::{FetchDirective, FetchResponse, FetchSupport};
use crate::filter::{resolve_on_match, FilterOutcome, OnMatchFilter};
use crate::ledger::METADATA_DEDUP_MAP;
use crate::pipeline::checksum::{apply_checksum, ChecksumKind};
use crate::pipeline::dedup::check_duplicate;
use crate::pipeline::{queue_reference, DocPipelineContext, Stage, StageChain};
use crate::state::CrawlState;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImporterStage {
    Fetch(FetchDirective),
    MetadataFilters(FetchDirective),
    MetadataChecksum(FetchDirective),
    MetadataDedup(FetchDirective),
    /// Queues references discovered by the document fetch
    QueueChildren,
    DocumentFilters,
    DocumentPreProcessing,
}

/// Builds the import pipeline
pub fn import_pipeline() -> StageChain<ImporterStage> {
    use FetchDirective::{Document, Metadata};
    StageChain::new(
        "import-pipeline",
        vec![
            ImporterStage::Fetch(Metadata),
            ImporterStage::MetadataFilters(Metadata),
            ImporterStage::MetadataChecksum(Metadata),
            ImporterStage::MetadataDedup(Metadata),
            ImporterStage::Fetch(Document),
            ImporterStage::QueueChildren,
            ImporterStage::MetadataFilters(Document),
            ImporterStage::MetadataChecksum(Document),
            ImporterStage::MetadataDedup(Document),
            ImporterStage::DocumentFilters,
            ImporterStage::DocumentPreProcessing,
        ],
    )
}

/// Decides whether a bad fetch still lets the pipeline go on
///
/// A failed metadata probe is tolerated only when metadata support is
/// optional. A failed document fetch is tolerated only when document support
/// is optional and the document was in a good state before the fetch.
///
/// # Arguments
///
/// * `original_state` - Document state before the failed fetch
/// * `metadata_support` - Configured metadata directive support
/// * `document_support` - Configured document directive support
/// * `directive` - Directive whose fetch failed
pub fn should_continue_on_bad_status(
    original_state: CrawlState,
    metadata_support: FetchSupport,
    document_support: FetchSupport,
    directive: FetchDirective,
) -> bool {
    match directive {
        FetchDirective::Metadata => metadata_support == FetchSupport::Optional,
        FetchDirective::Document => {
            original_state.is_good_state() && document_support == FetchSupport::Optional
        }
    }
}

#[async_trait]
impl Stage<DocPipelineContext> for ImporterStage {
    fn name(&self) -> &'static str {
        match self {
            Self::Fetch(FetchDirective::Metadata) => "metadata-fetch",
            Self::Fetch(FetchDirective::Document) => "document-fetch",
            Self::MetadataFilters(_) => "metadata-filters",
            Self::MetadataChecksum(_) => "metadata-checksum",
            Self::MetadataDedup(_) => "metadata-dedup",
            Self::QueueChildren => "queue-children",
            Self::DocumentFilters => "document-filters",
            Self::DocumentPreProcessing => "document-pre-processing",
        }
    }

    async fn execute(&self, ctx: &mut DocPipelineContext) -> Result<bool> {
        match *self {
            Self::Fetch(directive) => fetch(ctx, directive).await,
            Self::MetadataFilters(directive) => {
                if !runs_metadata_stages(ctx, directive) {
                    return Ok(true);
                }
                Ok(filter_metadata(ctx))
            }
            Self::MetadataChecksum(directive) => {
                if !runs_metadata_stages(ctx, directive) {
                    return Ok(true);
                }
                let Some(checksummer) = ctx.crawler.metadata_checksummer.as_ref() else {
                    return Ok(true);
                };
                let checksum = checksummer.checksum(&ctx.doc);
                Ok(apply_checksum(ctx, ChecksumKind::Metadata, checksum))
            }
            Self::MetadataDedup(directive) => {
                if !runs_metadata_stages(ctx, directive)
                    || !ctx.crawler.config.crawler.metadata_deduplicate
                {
                    return Ok(true);
                }
                match ctx.doc.context.meta_checksum.clone() {
                    Some(checksum) => check_duplicate(ctx, METADATA_DEDUP_MAP, &checksum),
                    None => Ok(true),
                }
            }
            Self::QueueChildren => {
                queue_children(ctx).await?;
                Ok(true)
            }
            Self::DocumentFilters => Ok(filter_document(ctx)),
            Self::DocumentPreProcessing => {
                let crawler = ctx.crawler.clone();
                for processor in &crawler.pre_processors {
                    processor.process_document(&mut ctx.doc)?;
                }
                Ok(true)
            }
        }
    }
}

/// Metadata stages run for the directive that first fetched successfully
fn runs_metadata_stages(ctx: &DocPipelineContext, directive: FetchDirective) -> bool {
    if !ctx.doc.is_directive_executed(directive) {
        return false;
    }
    directive == FetchDirective::Metadata
        || !ctx.doc.is_directive_executed(FetchDirective::Metadata)
}

// ===== Fetch =====

async fn fetch(ctx: &mut DocPipelineContext, directive: FetchDirective) -> Result<bool> {
    let crawler = ctx.crawler.clone();
    let support = crawler.fetch_support(directive);
    if !support.is_enabled() || ctx.doc.is_directive_executed(directive) {
        return Ok(true);
    }

    let original_state = ctx.doc.context.state_or_bad_status();
    let response = crawler
        .fetcher
        .fetch(ctx.doc.reference(), directive)
        .await?;
    ctx.doc.context.crawl_date = Some(Utc::now());

    if let Some(target) = response.final_reference.clone() {
        if target != ctx.doc.reference() && !follow_redirect(ctx, &target)? {
            return Ok(false);
        }
    }

    if response.state.is_good_state() {
        accept_response(ctx, directive, response);
        let kind = match directive {
            FetchDirective::Metadata => EventKind::DocumentMetadataFetched,
            FetchDirective::Document => EventKind::DocumentFetched,
        };
        crawler.fire(crawler.event(kind).with_doc(&ctx.doc.context));
        return Ok(true);
    }

    ctx.doc.context.state = Some(response.state);
    let kind = match response.state {
        CrawlState::NotFound => EventKind::RejectedNotFound,
        _ => EventKind::RejectedBadStatus,
    };
    crawler.fire(
        crawler
            .event(kind)
            .with_doc(&ctx.doc.context)
            .with_subject(directive.to_string())
            .with_message(response.status_line()),
    );

    Ok(should_continue_on_bad_status(
        original_state,
        crawler.fetch_support(FetchDirective::Metadata),
        crawler.fetch_support(FetchDirective::Document),
        directive,
    ))
}

/// Copies what a successful fetch returned onto the document
fn accept_response(ctx: &mut DocPipelineContext, directive: FetchDirective, response: FetchResponse) {
    let doc = &mut ctx.doc;

    // Keep a state decided after the metadata fetch (e.g. by its checksum)
    let decided = directive == FetchDirective::Document
        && doc.is_directive_executed(FetchDirective::Metadata)
        && doc.context.is_good_state();
    if !decided {
        doc.context.state = Some(response.state);
    }
    doc.mark_directive_executed(directive);

    for (name, values) in response.headers {
        doc.metadata.insert(name, values);
    }
    if let Some(content_type) = doc.metadata_value("content-type").map(str::to_string) {
        doc.context.content_type = Some(content_type);
    }
    if let Some(body) = response.body {
        doc.content = Some(body);
    }
    doc.child_references.extend(response.child_references);
}

/// Re-keys a redirected document on its target
///
/// # Returns
///
/// `false` if the target is already handled by this session, after
/// rejecting the document as a duplicate
fn follow_redirect(ctx: &mut DocPipelineContext, target: &str) -> Result<bool> {
    let crawler = ctx.crawler.clone();
    let source = ctx.doc.reference().to_string();

    let mut redirected = ctx.doc.context.clone();
    redirected.redirect_trail.push(source.clone());
    redirected
        .original_reference
        .get_or_insert_with(|| source.clone());
    redirected.reference = target.to_string();

    let claimed = crawler.ledger.get_processing_stage(target)?.is_none()
        && crawler.ledger.mark_active(&redirected)?;
    if !claimed {
        tracing::debug!("Redirect target already handled: {} -> {}", source, target);
        ctx.doc.context.state = Some(CrawlState::Rejected);
        crawler.fire(
            crawler
                .event(EventKind::RejectedDuplicate)
                .with_doc(&ctx.doc.context)
                .with_subject(target.to_string())
                .with_message(format!("Redirected to {}", target)),
        );
        return Ok(false);
    }

    tracing::debug!("Redirected: {} -> {}", source, target);
    ctx.doc.context = redirected;
    Ok(true)
}

// ===== Children =====

async fn queue_children(ctx: &mut DocPipelineContext) -> Result<()> {
    let children = std::mem::take(&mut ctx.doc.child_references);
    if children.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        "Queuing {} references found in {}",
        children.len(),
        ctx.doc.reference()
    );
    for child in children {
        let child_ctx = ctx.doc.context.child(child);
        queue_reference(&ctx.crawler, child_ctx).await?;
    }
    Ok(())
}

// ===== Filters =====

fn reject_by_filter(ctx: &mut DocPipelineContext, outcome: FilterOutcome<'_>) {
    let crawler = ctx.crawler.clone();
    ctx.doc.context.state = Some(CrawlState::Rejected);
    let mut event = crawler
        .event(EventKind::RejectedFilter)
        .with_doc(&ctx.doc.context);
    if let FilterOutcome::Rejected(Some(filter)) = outcome {
        event = event.with_subject(filter.to_string());
    }
    if let Some(message) = outcome.rejection_message() {
        event = event.with_message(message);
    }
    crawler.fire(event);
}

/// Tests a filter against the metadata field it targets
fn test_field(doc: &CrawlDoc, filter: &OnMatchFilter, field: &str) -> bool {
    filter.test_any(doc.metadata_values(field).unwrap_or_default())
}

fn filter_metadata(ctx: &mut DocPipelineContext) -> bool {
    let crawler = ctx.crawler.clone();
    let doc = &ctx.doc;
    let outcome = resolve_on_match(&crawler.metadata_filters, |f| match &f.field {
        Some(field) => test_field(doc, f, field),
        None => f.test(doc.reference()),
    });
    if outcome.is_accepted() {
        return true;
    }
    reject_by_filter(ctx, outcome);
    false
}

fn filter_document(ctx: &mut DocPipelineContext) -> bool {
    let crawler = ctx.crawler.clone();
    if crawler.document_filters.is_empty() {
        return true;
    }
    let doc = &ctx.doc;
    let content = doc.content_text().unwrap_or_default();
    let outcome = resolve_on_match(&crawler.document_filters, |f| match &f.field {
        Some(field) => test_field(doc, f, field),
        None => f.test(&content),
    });
    if outcome.is_accepted() {
        return true;
    }
    reject_by_filter(ctx, outcome);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use FetchDirective::{Document, Metadata};
    use FetchSupport::{Disabled, Optional, Required};

    #[test]
    fn test_continue_on_bad_status_table() {
        assert!(should_continue_on_bad_status(
            CrawlState::New,
            Optional,
            Required,
            Metadata
        ));
        assert!(!should_continue_on_bad_status(
            CrawlState::BadStatus,
            Required,
            Optional,
            Document
        ));
        assert!(should_continue_on_bad_status(
            CrawlState::New,
            Required,
            Optional,
            Document
        ));
    }

    #[test]
    fn test_required_support_never_continues() {
        for state in CrawlState::all_states() {
            assert!(!should_continue_on_bad_status(
                state, Required, Required, Metadata
            ));
            assert!(!should_continue_on_bad_status(
                state, Required, Required, Document
            ));
        }
    }

    #[test]
    fn test_metadata_continuation_ignores_original_state() {
        assert!(should_continue_on_bad_status(
            CrawlState::Error,
            Optional,
            Disabled,
            Metadata
        ));
        assert!(!should_continue_on_bad_status(
            CrawlState::New,
            Disabled,
            Optional,
            Metadata
        ));
    }

    #[test]
    fn test_pipeline_order() {
        let pipeline = import_pipeline();
        let stages = pipeline.stages();
        assert_eq!(stages.first(), Some(&ImporterStage::Fetch(Metadata)));
        let metadata_fetch = stages
            .iter()
            .position(|s| *s == ImporterStage::Fetch(Metadata));
        let document_fetch = stages
            .iter()
            .position(|s| *s == ImporterStage::Fetch(Document));
        assert!(metadata_fetch < document_fetch);
        assert_eq!(stages.last(), Some(&ImporterStage::DocumentPreProcessing));
    }
}
