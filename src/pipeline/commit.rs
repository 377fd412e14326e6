//! Commit pipeline: detects changes and hands documents to the committer

use crate::committer::CommitterRequest;
use crate::ledger::DOCUMENT_DEDUP_MAP;
use crate::pipeline::checksum::{apply_checksum, ChecksumKind};
use crate::pipeline::dedup::check_duplicate;
use crate::pipeline::{DocPipelineContext, Stage, StageChain};
use crate::state::CrawlState;
use crate::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitterStage {
    DocumentChecksum,
    DocumentDedup,
    PostProcessing,
    /// Sends an upsert or a deletion to the committer
    CommitModule,
}

/// Builds the commit pipeline
pub fn commit_pipeline() -> StageChain<CommitterStage> {
    StageChain::new(
        "commit-pipeline",
        vec![
            CommitterStage::DocumentChecksum,
            CommitterStage::DocumentDedup,
            CommitterStage::PostProcessing,
            CommitterStage::CommitModule,
        ],
    )
}

#[async_trait]
impl Stage<DocPipelineContext> for CommitterStage {
    fn name(&self) -> &'static str {
        match self {
            Self::DocumentChecksum => "document-checksum",
            Self::DocumentDedup => "document-dedup",
            Self::PostProcessing => "post-processing",
            Self::CommitModule => "commit-module",
        }
    }

    async fn execute(&self, ctx: &mut DocPipelineContext) -> Result<bool> {
        match self {
            Self::DocumentChecksum => {
                let Some(checksummer) = ctx.crawler.document_checksummer else {
                    return Ok(true);
                };
                let checksum = checksummer.checksum(&ctx.doc);
                Ok(apply_checksum(ctx, ChecksumKind::Document, checksum))
            }
            Self::DocumentDedup => {
                if !ctx.crawler.config.crawler.document_deduplicate {
                    return Ok(true);
                }
                match ctx.doc.context.content_checksum.clone() {
                    Some(checksum) => check_duplicate(ctx, DOCUMENT_DEDUP_MAP, &checksum),
                    None => Ok(true),
                }
            }
            Self::PostProcessing => {
                let crawler = ctx.crawler.clone();
                for processor in &crawler.post_processors {
                    processor.process_document(&mut ctx.doc)?;
                }
                Ok(true)
            }
            Self::CommitModule => {
                commit(ctx).await?;
                Ok(true)
            }
        }
    }
}

/// Turns the document into a committer request, if its state calls for one
pub(crate) fn to_request(ctx: &DocPipelineContext) -> Option<CommitterRequest> {
    let doc = &ctx.doc;
    match doc.context.state? {
        CrawlState::New | CrawlState::Modified => Some(CommitterRequest::Upsert {
            reference: doc.reference().to_string(),
            metadata: doc.metadata.clone(),
            content: doc.content.clone().unwrap_or_default(),
        }),
        CrawlState::Deleted => Some(CommitterRequest::Delete {
            reference: doc.reference().to_string(),
            metadata: doc.metadata.clone(),
        }),
        _ => None,
    }
}

async fn commit(ctx: &mut DocPipelineContext) -> Result<()> {
    match to_request(ctx) {
        Some(request) => {
            let crawler = ctx.crawler.clone();
            crawler.commit(request, &ctx.doc.context).await
        }
        None => {
            tracing::debug!(
                "Nothing to commit for {} ({:?})",
                ctx.doc.reference(),
                ctx.doc.context.state
            );
            Ok(())
        }
    }
}
