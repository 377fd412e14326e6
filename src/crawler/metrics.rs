//! Crawl metrics accumulated from events

use crate::event::{CrawlerEvent, EventKind, EventListener};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counts events and reports progress
#[derive(Debug)]
pub struct CrawlMetrics {
    counts: Mutex<HashMap<EventKind, u64>>,
    started: Instant,
    progress_interval: u64,
}

/// Snapshot of the metrics at one point of a crawl
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSummary {
    pub processed: u64,
    pub queued: u64,
    pub upserts: u64,
    pub deletions: u64,
    pub rejected: u64,

    /// Every event kind seen, most frequent first
    pub events: Vec<(EventKind, u64)>,

    pub elapsed: Duration,
}

impl ExecutionSummary {
    /// Documents processed per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

impl CrawlMetrics {
    /// Creates metrics logging progress every `progress_interval` processed documents
    pub fn new(progress_interval: u64) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            started: Instant::now(),
            progress_interval: progress_interval.max(1),
        }
    }

    /// Number of events of a kind seen so far
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn summary(&self) -> ExecutionSummary {
        let mut events: Vec<(EventKind, u64)> = self
            .counts
            .lock()
            .map(|counts| counts.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        events.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

        let rejected = events
            .iter()
            .filter(|(kind, _)| kind.is_rejection())
            .map(|(_, count)| count)
            .sum();

        ExecutionSummary {
            processed: self.count(EventKind::DocumentProcessed),
            queued: self.count(EventKind::DocumentQueued),
            upserts: self.count(EventKind::DocumentCommittedUpsert),
            deletions: self.count(EventKind::DocumentCommittedDelete),
            rejected,
            events,
            elapsed: self.started.elapsed(),
        }
    }

    /// Logs the execution summary
    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Execution summary: {} processed, {} queued, {} upserts, {} deletions, {} rejections in {:?} ({:.2} docs/sec)",
            summary.processed,
            summary.queued,
            summary.upserts,
            summary.deletions,
            summary.rejected,
            summary.elapsed,
            summary.rate()
        );
        for (kind, count) in &summary.events {
            tracing::info!("  {}: {}", kind, count);
        }
    }
}

impl EventListener for CrawlMetrics {
    fn on_event(&self, event: &CrawlerEvent) {
        let count = match self.counts.lock() {
            Ok(mut counts) => {
                let count = counts.entry(event.kind).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => return,
        };

        if event.kind == EventKind::DocumentProcessed && count % self.progress_interval == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                count as f64 / elapsed
            } else {
                0.0
            };
            tracing::info!(
                "Progress: {} documents processed, {:.2} docs/sec",
                count,
                rate
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(metrics: &CrawlMetrics, kind: EventKind, times: usize) {
        for _ in 0..times {
            metrics.on_event(&CrawlerEvent::new(kind, "test"));
        }
    }

    #[test]
    fn test_counts_events() {
        let metrics = CrawlMetrics::new(10);
        fire(&metrics, EventKind::DocumentProcessed, 3);
        fire(&metrics, EventKind::DocumentCommittedUpsert, 2);
        fire(&metrics, EventKind::RejectedTooDeep, 1);
        fire(&metrics, EventKind::RejectedNotFound, 1);

        let summary = metrics.summary();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.upserts, 2);
        assert_eq!(summary.deletions, 0);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.events[0], (EventKind::DocumentProcessed, 3));
    }

    #[test]
    fn test_unseen_kind_is_zero() {
        let metrics = CrawlMetrics::new(1);
        assert_eq!(metrics.count(EventKind::CrawlerError), 0);
    }
}
