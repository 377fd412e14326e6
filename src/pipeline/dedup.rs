//! Session-scoped duplicate detection
//!
//! The first reference seen with a given checksum wins. Registration goes
//! through `map_put_if_absent`, so two workers racing on the same checksum
//! cannot both register it.

use crate::event::EventKind;
use crate::pipeline::DocPipelineContext;
use crate::state::CrawlState;
use crate::storage::lock;
use crate::Result;

/// Registers a checksum or rejects the document as a duplicate
///
/// # Arguments
///
/// * `ctx` - The document being processed
/// * `map` - Dedup map for this kind of checksum
/// * `checksum` - The document's checksum
///
/// # Returns
///
/// `false` if another reference registered the checksum first
pub(crate) fn check_duplicate(
    ctx: &mut DocPipelineContext,
    map: &str,
    checksum: &str,
) -> Result<bool> {
    let reference = ctx.doc.reference().to_string();
    let existing = lock(&ctx.crawler.storage)?.map_put_if_absent(map, checksum, &reference)?;

    match existing {
        Some(original) if original != reference => {
            ctx.doc.context.state = Some(CrawlState::Rejected);
            let event = ctx
                .crawler
                .event(EventKind::RejectedDuplicate)
                .with_doc(&ctx.doc.context)
                .with_subject(original.clone())
                .with_message(format!("Duplicate of {}", original));
            ctx.crawler.fire(event);
            Ok(false)
        }
        _ => Ok(true),
    }
}
