use std::fmt;

/// Where a reference sits in the ledger during the current session
///
/// Transitions are `Queued -> Active -> Processed` and never go backwards
/// within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessingStage {
    /// Waiting in the durable queue
    Queued,

    /// Claimed by a worker
    Active,

    /// Finished for this session
    Processed,
}

impl ProcessingStage {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Processed => "processed",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Session-level crawl stage
///
/// A crawl session walks these stages in declaration order. The current value
/// is persisted on entry so an interrupted session can resume at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CrawlStage {
    Idle,
    Initialize,
    Crawl,
    HandleOrphans,
    Ended,
}

impl CrawlStage {
    /// Returns true if a session found in this stage starts from scratch
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Initialize => "INITIALIZE",
            Self::Crawl => "CRAWL",
            Self::HandleOrphans => "HANDLE_ORPHANS",
            Self::Ended => "ENDED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(Self::Idle),
            "INITIALIZE" => Some(Self::Initialize),
            "CRAWL" => Some(Self::Crawl),
            "HANDLE_ORPHANS" => Some(Self::HandleOrphans),
            "ENDED" => Some(Self::Ended),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
