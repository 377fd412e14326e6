//! Statistics read from the crawl storage
//!
//! This module provides functionality for extracting and displaying what a
//! crawler stored: where its session stands and how its references ended.

use crate::crawler::CrawlerContext;
use crate::state::{CrawlStage, CrawlState};
use crate::Result;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Persisted crawl stage
    pub stage: CrawlStage,

    /// References waiting in the queue
    pub queued: u64,

    /// References being processed (or left active by a crash)
    pub active: u64,

    /// References processed this session
    pub processed: u64,

    /// Records of the previous session not visited yet
    pub cached: u64,

    /// Committer requests not flushed yet
    pub buffered: u64,

    /// Count of processed references by final state
    pub processed_by_state: HashMap<CrawlState, u64>,
}

/// Loads statistics from the crawler storage
///
/// # Arguments
///
/// * `crawler` - The crawler whose storage is queried
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(TidemarkError)` - Failed to query storage
pub fn load_statistics(crawler: &CrawlerContext) -> Result<CrawlStatistics> {
    let ledger = &crawler.ledger;
    Ok(CrawlStatistics {
        stage: ledger.crawl_stage()?,
        queued: ledger.queue_len()?,
        active: ledger.active_count()?,
        processed: ledger.processed_count()?,
        cached: ledger.cached_count()?,
        buffered: crawler.committer.len()?,
        processed_by_state: ledger.processed_states()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Session:");
    println!("  Stage: {}", stats.stage);
    if !stats.stage.is_restartable() {
        println!("  (unfinished, the next run resumes it)");
    }
    println!();

    println!("References:");
    println!("  Queued: {}", stats.queued);
    println!("  Active: {}", stats.active);
    println!("  Processed: {}", stats.processed);
    println!("  Cached from previous session: {}", stats.cached);
    println!("  Buffered committer requests: {}", stats.buffered);
    println!();

    if !stats.processed_by_state.is_empty() {
        println!("Processed by State:");
        let mut state_counts: Vec<_> = stats.processed_by_state.iter().collect();
        state_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.to_db_string().cmp(b.0.to_db_string())));

        for (state, count) in state_counts {
            let percentage = if stats.processed > 0 {
                (*count as f64 / stats.processed as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", state, count, percentage);
        }
        println!();
    }

    let good: u64 = stats
        .processed_by_state
        .iter()
        .filter(|(state, _)| state.is_good_state())
        .map(|(_, count)| count)
        .sum();
    let success_rate = if stats.processed > 0 {
        (good as f64 / stats.processed as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} references in a good state)",
        success_rate, good, stats.processed
    );
}
