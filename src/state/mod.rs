//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlState`: The outcome of crawling a reference (new, modified, not found, etc.)
//! - `ProcessingStage`: Where a reference sits in the ledger (queued, active, processed)
//! - `CrawlStage`: The persisted session stage (initialize, crawl, handle orphans, ended)

mod crawl_state;
mod stages;

// Re-export main types
pub use crawl_state::CrawlState;
pub use stages::{CrawlStage, ProcessingStage};
