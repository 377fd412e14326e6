//! Checksum creation and change detection

use crate::doc::{CrawlDoc, DocContext};
use crate::event::EventKind;
use crate::pipeline::DocPipelineContext;
use crate::state::CrawlState;
use sha2::{Digest, Sha256};

/// Which checksum of a document is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Metadata,
    Document,
}

impl ChecksumKind {
    /// Reads this checksum from a record
    pub fn of(self, ctx: &DocContext) -> Option<&str> {
        match self {
            Self::Metadata => ctx.meta_checksum.as_deref(),
            Self::Document => ctx.content_checksum.as_deref(),
        }
    }

    fn set(self, ctx: &mut DocContext, checksum: Option<String>) {
        match self {
            Self::Metadata => ctx.meta_checksum = checksum,
            Self::Document => ctx.content_checksum = checksum,
        }
    }
}

/// Derives a document state from its new checksum and its cached record
///
/// | cached record | checksums                | state      |
/// |---------------|--------------------------|------------|
/// | none          | any                      | NEW        |
/// | present       | both missing             | MODIFIED   |
/// | present       | different                | MODIFIED   |
/// | present       | equal                    | UNMODIFIED |
pub fn resolve_checksum(
    kind: ChecksumKind,
    new_checksum: Option<&str>,
    cached: Option<&DocContext>,
) -> CrawlState {
    let Some(cached) = cached else {
        return CrawlState::New;
    };
    match (new_checksum, kind.of(cached)) {
        (None, None) => CrawlState::Modified,
        (new, old) if new != old => CrawlState::Modified,
        _ => CrawlState::Unmodified,
    }
}

/// Stores a new checksum on the document and resolves its state
///
/// # Returns
///
/// `false` if the document is unmodified, after firing `REJECTED_UNMODIFIED`
pub(crate) fn apply_checksum(
    ctx: &mut DocPipelineContext,
    kind: ChecksumKind,
    checksum: Option<String>,
) -> bool {
    let state = resolve_checksum(kind, checksum.as_deref(), ctx.doc.cached.as_ref());
    kind.set(&mut ctx.doc.context, checksum);
    ctx.doc.context.state = Some(state);

    if state == CrawlState::Unmodified {
        let event = ctx
            .crawler
            .event(EventKind::RejectedUnmodified)
            .with_doc(&ctx.doc.context)
            .with_subject(format!("{:?} checksum", kind));
        ctx.crawler.fire(event);
        return false;
    }
    true
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Creates a checksum from selected metadata fields
#[derive(Debug, Clone)]
pub struct MetadataChecksummer {
    fields: Vec<String>,
}

impl MetadataChecksummer {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Hashes the configured fields present on the document
    ///
    /// Returns `None` when none of them is present.
    pub fn checksum(&self, doc: &CrawlDoc) -> Option<String> {
        let parts: Vec<String> = self
            .fields
            .iter()
            .filter_map(|field| {
                doc.metadata_values(field)
                    .filter(|values| !values.is_empty())
                    .map(|values| format!("{}={}", field.to_lowercase(), values.join(",")))
            })
            .collect();

        if parts.is_empty() {
            return None;
        }
        Some(sha256_hex(parts.join(";").as_bytes()))
    }
}

/// Creates a checksum from the document content
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentChecksummer;

impl DocumentChecksummer {
    /// SHA-256 of the content, `None` if the document has none
    pub fn checksum(&self, doc: &CrawlDoc) -> Option<String> {
        doc.content.as_deref().map(sha256_hex)
    }
}
