//! Spoiled reference handling
//!
//! A reference is spoiled when its crawl ends in a bad state (not found, bad
//! status, error...). The strategizer decides whether the committer should be
//! told to delete it.

use crate::config::SpoiledReferencesConfig;
use crate::doc::DocContext;
use crate::state::CrawlState;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// What to do with a spoiled reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpoiledReferenceStrategy {
    /// Delete it from the committer right away
    Delete,

    /// Give it one more session; delete if it is still bad then
    GraceOnce,

    /// Never delete it
    Ignore,
}

impl fmt::Display for SpoiledReferenceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "DELETE"),
            Self::GraceOnce => write!(f, "GRACE_ONCE"),
            Self::Ignore => write!(f, "IGNORE"),
        }
    }
}

/// Decision taken for one spoiled document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoiledAction {
    /// Send a deletion to the committer
    Delete,

    /// Leave it uncommitted so the next session retries it
    Grace,

    /// Do nothing
    Ignore,
}

/// Maps bad crawl states to a strategy
#[derive(Debug, Clone)]
pub struct SpoiledReferenceStrategizer {
    mappings: HashMap<CrawlState, SpoiledReferenceStrategy>,
    fallback: SpoiledReferenceStrategy,
}

impl Default for SpoiledReferenceStrategizer {
    fn default() -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(CrawlState::NotFound, SpoiledReferenceStrategy::Delete);
        mappings.insert(CrawlState::BadStatus, SpoiledReferenceStrategy::GraceOnce);
        mappings.insert(CrawlState::Error, SpoiledReferenceStrategy::GraceOnce);
        Self {
            mappings,
            fallback: SpoiledReferenceStrategy::Delete,
        }
    }
}

impl SpoiledReferenceStrategizer {
    /// Builds a strategizer with configured mappings merged over the defaults
    ///
    /// Unknown state names are skipped; validation rejects them earlier.
    pub fn from_config(config: &SpoiledReferencesConfig) -> Self {
        let mut strategizer = Self::default();
        for (name, strategy) in &config.mappings {
            if let Some(state) = CrawlState::from_db_string(name) {
                strategizer.mappings.insert(state, *strategy);
            }
        }
        if let Some(fallback) = config.fallback {
            strategizer.fallback = fallback;
        }
        strategizer
    }

    pub fn with_mapping(mut self, state: CrawlState, strategy: SpoiledReferenceStrategy) -> Self {
        self.mappings.insert(state, strategy);
        self
    }

    pub fn with_fallback(mut self, strategy: SpoiledReferenceStrategy) -> Self {
        self.fallback = strategy;
        self
    }

    /// Returns the strategy for a reference that ended in `state`
    pub fn resolve(&self, reference: &str, state: CrawlState) -> SpoiledReferenceStrategy {
        let strategy = self.mappings.get(&state).copied().unwrap_or(self.fallback);
        tracing::debug!(
            "Spoiled reference strategy for \"{}\" ({}): {}",
            reference,
            state,
            strategy
        );
        strategy
    }

    /// Decides what happens to a spoiled document
    ///
    /// Deletions are only worth sending for references the committer may
    /// hold: ones with a cached record that was not already deleted.
    ///
    /// # Arguments
    ///
    /// * `reference` - The spoiled reference
    /// * `state` - Its bad end state
    /// * `cached` - Its record from the previous session, if any
    pub fn decide(
        &self,
        reference: &str,
        state: CrawlState,
        cached: Option<&DocContext>,
    ) -> SpoiledAction {
        let previous = cached
            .and_then(|c| c.state)
            .filter(|s| *s != CrawlState::Deleted);

        match self.resolve(reference, state) {
            SpoiledReferenceStrategy::Ignore => SpoiledAction::Ignore,
            SpoiledReferenceStrategy::Delete => match previous {
                Some(_) => SpoiledAction::Delete,
                None => SpoiledAction::Ignore,
            },
            SpoiledReferenceStrategy::GraceOnce => match previous {
                Some(previous) if !previous.is_good_state() => SpoiledAction::Delete,
                Some(_) => SpoiledAction::Grace,
                None => SpoiledAction::Ignore,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_with(state: CrawlState) -> DocContext {
        let mut ctx = DocContext::new("ref");
        ctx.state = Some(state);
        ctx
    }

    #[test]
    fn test_defaults() {
        let strategizer = SpoiledReferenceStrategizer::default();
        assert_eq!(
            strategizer.resolve("ref", CrawlState::NotFound),
            SpoiledReferenceStrategy::Delete
        );
        assert_eq!(
            strategizer.resolve("ref", CrawlState::BadStatus),
            SpoiledReferenceStrategy::GraceOnce
        );
        assert_eq!(
            strategizer.resolve("ref", CrawlState::Error),
            SpoiledReferenceStrategy::GraceOnce
        );
        assert_eq!(
            strategizer.resolve("ref", CrawlState::TooDeep),
            SpoiledReferenceStrategy::Delete
        );
    }

    #[test]
    fn test_fallback_override() {
        let strategizer =
            SpoiledReferenceStrategizer::default().with_fallback(SpoiledReferenceStrategy::Ignore);
        assert_eq!(
            strategizer.resolve("ref", CrawlState::Rejected),
            SpoiledReferenceStrategy::Ignore
        );
    }

    #[test]
    fn test_grace_once_first_failure_is_graced() {
        let strategizer = SpoiledReferenceStrategizer::default();
        let cached = cached_with(CrawlState::New);
        assert_eq!(
            strategizer.decide("ref", CrawlState::BadStatus, Some(&cached)),
            SpoiledAction::Grace
        );
    }

    #[test]
    fn test_grace_once_escalates_on_second_failure() {
        let strategizer = SpoiledReferenceStrategizer::default();
        let cached = cached_with(CrawlState::BadStatus);
        assert_eq!(
            strategizer.decide("ref", CrawlState::BadStatus, Some(&cached)),
            SpoiledAction::Delete
        );
    }

    #[test]
    fn test_delete_requires_a_committed_record() {
        let strategizer = SpoiledReferenceStrategizer::default();
        assert_eq!(
            strategizer.decide("ref", CrawlState::NotFound, None),
            SpoiledAction::Ignore
        );

        let deleted = cached_with(CrawlState::Deleted);
        assert_eq!(
            strategizer.decide("ref", CrawlState::NotFound, Some(&deleted)),
            SpoiledAction::Ignore
        );

        let cached = cached_with(CrawlState::Unmodified);
        assert_eq!(
            strategizer.decide("ref", CrawlState::NotFound, Some(&cached)),
            SpoiledAction::Delete
        );
    }

    #[test]
    fn test_ignore_never_deletes() {
        let strategizer = SpoiledReferenceStrategizer::default()
            .with_mapping(CrawlState::NotFound, SpoiledReferenceStrategy::Ignore);
        let cached = cached_with(CrawlState::NotFound);
        assert_eq!(
            strategizer.decide("ref", CrawlState::NotFound, Some(&cached)),
            SpoiledAction::Ignore
        );
    }

    #[test]
    fn test_from_config_merges_over_defaults() {
        let mut config = SpoiledReferencesConfig::default();
        config
            .mappings
            .insert("bad-status".to_string(), SpoiledReferenceStrategy::Delete);

        let strategizer = SpoiledReferenceStrategizer::from_config(&config);
        assert_eq!(
            strategizer.resolve("ref", CrawlState::BadStatus),
            SpoiledReferenceStrategy::Delete
        );
        assert_eq!(
            strategizer.resolve("ref", CrawlState::Error),
            SpoiledReferenceStrategy::GraceOnce
        );
    }
}
