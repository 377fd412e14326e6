//! Crawler runtime
//!
//! This module contains everything that drives a crawl:
//! - The shared crawler state and its builder
//! - The session stage machine (initialize, crawl, handle orphans)
//! - The worker pool draining the ledger queue
//! - Task execution, metrics and statistics

mod context;
mod executor;
mod metrics;
mod session;
mod stats;
mod worker;

pub use context::{CrawlerBuilder, CrawlerContext};
pub use executor::{
    boxed, LocalTaskExecutor, TaskExecutor, TaskFactory, TaskFuture, TaskHandle, TaskOptions,
};
pub use metrics::{CrawlMetrics, ExecutionSummary};
pub use session::{CrawlSession, SessionOutcome};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use worker::{ProcessFlags, WorkerExit, WorkerPool};
