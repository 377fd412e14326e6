//! Include/exclude filters
//!
//! Filters are evaluated in order by [`resolve_on_match`]:
//! - a matching EXCLUDE filter rejects immediately
//! - a matching INCLUDE filter accepts immediately
//! - a filter that does not match makes no decision
//!
//! When no filter decided, the subject is accepted only if the list holds no
//! INCLUDE filter at all.

mod matcher;

pub use matcher::matches_wildcard;

use serde::Deserialize;
use std::fmt;

/// What a filter does with a subject it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMatch {
    #[default]
    Include,
    Exclude,
}

impl fmt::Display for OnMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => write!(f, "INCLUDE"),
            Self::Exclude => write!(f, "EXCLUDE"),
        }
    }
}

/// A wildcard filter with an include/exclude decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnMatchFilter {
    pub expression: String,
    pub on_match: OnMatch,

    /// Metadata field to test instead of the default subject
    pub field: Option<String>,

    pub ignore_case: bool,
}

impl OnMatchFilter {
    pub fn new(expression: impl Into<String>, on_match: OnMatch) -> Self {
        Self {
            expression: expression.into(),
            on_match,
            field: None,
            ignore_case: false,
        }
    }

    pub fn include(expression: impl Into<String>) -> Self {
        Self::new(expression, OnMatch::Include)
    }

    pub fn exclude(expression: impl Into<String>) -> Self {
        Self::new(expression, OnMatch::Exclude)
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Tests a single subject against the expression
    pub fn test(&self, subject: &str) -> bool {
        matches_wildcard(&self.expression, subject, self.ignore_case)
    }

    /// Tests several values; any match counts
    ///
    /// With no values only a blank expression matches.
    pub fn test_any<'a, I>(&self, values: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            return self.expression.trim().is_empty();
        }
        values.any(|v| self.test(v))
    }
}

impl fmt::Display for OnMatchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(
                f,
                "OnMatchFilter[onMatch={}, field={}, expression={}]",
                self.on_match, field, self.expression
            ),
            None => write!(
                f,
                "OnMatchFilter[onMatch={}, expression={}]",
                self.on_match, self.expression
            ),
        }
    }
}

/// Outcome of evaluating a filter list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome<'a> {
    Accepted,

    /// Rejected by an EXCLUDE filter, or by no INCLUDE filter matching (`None`)
    Rejected(Option<&'a OnMatchFilter>),
}

impl<'a> FilterOutcome<'a> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Describes the rejection for events and logs
    pub fn rejection_message(&self) -> Option<String> {
        match self {
            Self::Accepted => None,
            Self::Rejected(Some(filter)) => Some(format!("Rejected by {}", filter)),
            Self::Rejected(None) => Some("No \"include\" filters matched.".to_string()),
        }
    }
}

/// Evaluates filters in order and decides on a subject
///
/// # Arguments
///
/// * `filters` - The ordered filter list
/// * `accepts` - Tests one filter against the subject
///
/// # Returns
///
/// The decision, carrying the rejecting filter when there is one
pub fn resolve_on_match<'a, F>(filters: &'a [OnMatchFilter], mut accepts: F) -> FilterOutcome<'a>
where
    F: FnMut(&OnMatchFilter) -> bool,
{
    let mut has_includes = false;

    for filter in filters {
        if filter.on_match == OnMatch::Include {
            has_includes = true;
        }
        if accepts(filter) {
            return match filter.on_match {
                OnMatch::Exclude => FilterOutcome::Rejected(Some(filter)),
                OnMatch::Include => FilterOutcome::Accepted,
            };
        }
    }

    if has_includes {
        FilterOutcome::Rejected(None)
    } else {
        FilterOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_reference<'a>(filters: &'a [OnMatchFilter], reference: &str) -> FilterOutcome<'a> {
        resolve_on_match(filters, |f| f.test(reference))
    }

    #[test]
    fn test_matching_include_accepts() {
        let filters = vec![OnMatchFilter::include("ref")];
        assert!(resolve_reference(&filters, "ref").is_accepted());
    }

    #[test]
    fn test_matching_exclude_rejects() {
        let filters = vec![OnMatchFilter::exclude("ref")];
        let outcome = resolve_reference(&filters, "ref");
        assert_eq!(outcome, FilterOutcome::Rejected(Some(&filters[0])));
    }

    #[test]
    fn test_unmatched_include_rejects() {
        let filters = vec![OnMatchFilter::include("other")];
        assert_eq!(resolve_reference(&filters, "ref"), FilterOutcome::Rejected(None));
    }

    #[test]
    fn test_no_filters_accepts() {
        assert!(resolve_reference(&[], "ref").is_accepted());
    }

    #[test]
    fn test_unmatched_exclude_accepts() {
        let filters = vec![OnMatchFilter::exclude("*.pdf")];
        assert!(resolve_reference(&filters, "page.html").is_accepted());
    }

    #[test]
    fn test_first_decision_wins() {
        let filters = vec![
            OnMatchFilter::include("http://a/*"),
            OnMatchFilter::exclude("*.pdf"),
        ];
        assert!(resolve_reference(&filters, "http://a/doc.pdf").is_accepted());

        let filters = vec![
            OnMatchFilter::exclude("*.pdf"),
            OnMatchFilter::include("http://a/*"),
        ];
        assert!(!resolve_reference(&filters, "http://a/doc.pdf").is_accepted());
    }

    #[test]
    fn test_blank_expression_is_universal() {
        let filters = vec![OnMatchFilter::exclude("")];
        assert!(!resolve_reference(&filters, "anything").is_accepted());
    }

    #[test]
    fn test_include_after_unmatched_exclude() {
        let filters = vec![
            OnMatchFilter::exclude("*.pdf"),
            OnMatchFilter::include("http://b/*"),
        ];
        assert_eq!(
            resolve_reference(&filters, "http://a/page"),
            FilterOutcome::Rejected(None)
        );
    }

    #[test]
    fn test_any_value_matches() {
        let filter = OnMatchFilter::include("text/*").on_field("Content-Type");
        let values = vec!["application/pdf".to_string(), "text/html".to_string()];
        assert!(filter.test_any(&values));
        assert!(!filter.test_any(&Vec::new()));
        assert!(OnMatchFilter::include("").test_any(&Vec::new()));
    }

    #[test]
    fn test_rejection_messages() {
        let filters = vec![OnMatchFilter::exclude("ref")];
        let outcome = resolve_reference(&filters, "ref");
        assert_eq!(
            outcome.rejection_message().unwrap(),
            "Rejected by OnMatchFilter[onMatch=EXCLUDE, expression=ref]"
        );
        assert!(FilterOutcome::Accepted.rejection_message().is_none());
    }
}
