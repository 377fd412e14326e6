/// Document lifecycle states
///
/// This module defines the terminal outcome recorded for every reference a crawl touches.
use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of crawling a single reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlState {
    // ===== Good States =====
    /// Reference was never seen in a previous session
    New,

    /// Reference was seen before and its checksum changed
    Modified,

    /// Reference was seen before and nothing changed
    Unmodified,

    // ===== Rejection States =====
    /// Rejected by a filter or a duplicate check
    Rejected,

    /// Deeper than the configured maximum depth
    TooDeep,

    // ===== Failure States =====
    /// The fetcher returned an unexpected status
    BadStatus,

    /// Processing raised an error
    Error,

    /// The reference no longer exists at its source
    NotFound,

    // ===== Special States =====
    /// A deletion was sent to the committer
    Deleted,
}

impl CrawlState {
    /// Returns true for states whose document can be committed or kept as-is
    ///
    /// Good states are `New`, `Modified` and `Unmodified`.
    pub fn is_good_state(&self) -> bool {
        matches!(self, Self::New | Self::Modified | Self::Unmodified)
    }

    /// Returns true if the document should be sent to the committer as an upsert
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }

    /// Returns true for failure states subject to the spoiled reference policy
    ///
    /// `Deleted` is not spoiled: the deletion already happened.
    pub fn is_spoiled(&self) -> bool {
        !self.is_good_state() && *self != Self::Deleted
    }

    /// Converts the state to its persisted string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Modified => "MODIFIED",
            Self::Unmodified => "UNMODIFIED",
            Self::Rejected => "REJECTED",
            Self::TooDeep => "TOO_DEEP",
            Self::BadStatus => "BAD_STATUS",
            Self::Error => "ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Deleted => "DELETED",
        }
    }

    /// Parses a state from its persisted string representation
    ///
    /// Matching is case-insensitive and accepts `-` in place of `_` so the
    /// configuration file can use kebab-case keys (`not-found`).
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NEW" => Some(Self::New),
            "MODIFIED" => Some(Self::Modified),
            "UNMODIFIED" => Some(Self::Unmodified),
            "REJECTED" => Some(Self::Rejected),
            "TOO_DEEP" => Some(Self::TooDeep),
            "BAD_STATUS" => Some(Self::BadStatus),
            "ERROR" => Some(Self::Error),
            "NOT_FOUND" => Some(Self::NotFound),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Returns all possible crawl states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::New,
            Self::Modified,
            Self::Unmodified,
            Self::Rejected,
            Self::TooDeep,
            Self::BadStatus,
            Self::Error,
            Self::NotFound,
            Self::Deleted,
        ]
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_good_state() {
        assert!(CrawlState::New.is_good_state());
        assert!(CrawlState::Modified.is_good_state());
        assert!(CrawlState::Unmodified.is_good_state());

        assert!(!CrawlState::Rejected.is_good_state());
        assert!(!CrawlState::TooDeep.is_good_state());
        assert!(!CrawlState::BadStatus.is_good_state());
        assert!(!CrawlState::Error.is_good_state());
        assert!(!CrawlState::NotFound.is_good_state());
        assert!(!CrawlState::Deleted.is_good_state());
    }

    #[test]
    fn test_is_new_or_modified() {
        assert!(CrawlState::New.is_new_or_modified());
        assert!(CrawlState::Modified.is_new_or_modified());
        assert!(!CrawlState::Unmodified.is_new_or_modified());
        assert!(!CrawlState::Deleted.is_new_or_modified());
    }

    #[test]
    fn test_is_spoiled() {
        assert!(CrawlState::BadStatus.is_spoiled());
        assert!(CrawlState::NotFound.is_spoiled());
        assert!(CrawlState::Error.is_spoiled());
        assert!(CrawlState::TooDeep.is_spoiled());

        assert!(!CrawlState::Deleted.is_spoiled());
        assert!(!CrawlState::Unmodified.is_spoiled());
    }

    #[test]
    fn test_from_db_string_accepts_kebab_case() {
        assert_eq!(
            CrawlState::from_db_string("not-found"),
            Some(CrawlState::NotFound)
        );
        assert_eq!(
            CrawlState::from_db_string("bad_status"),
            Some(CrawlState::BadStatus)
        );
        assert_eq!(CrawlState::from_db_string("invalid"), None);
    }

    #[test]
    fn test_roundtrip_db_string() {
        for state in CrawlState::all_states() {
            let db_str = state.to_db_string();
            let parsed = CrawlState::from_db_string(db_str);
            assert_eq!(Some(state), parsed, "Failed roundtrip for {:?}", state);
        }
    }

    #[test]
    fn test_serde_uses_db_names() {
        let json = serde_json::to_string(&CrawlState::TooDeep).unwrap();
        assert_eq!(json, "\"TOO_DEEP\"");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CrawlState::New), "NEW");
        assert_eq!(format!("{}", CrawlState::NotFound), "NOT_FOUND");
    }

    #[test]
    fn test_all_states_complete() {
        let all = CrawlState::all_states();
        assert_eq!(all.len(), 9);

        for i in 0..all.len() {
            for j in (i + 1)..all.len() {
                assert_ne!(all[i], all[j], "Duplicate state found");
            }
        }
    }
}
