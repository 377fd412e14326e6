use crate::config::types::{
    CommitterConfig, Config, CrawlerConfig, FilterConfig, SpoiledReferencesConfig, StorageConfig,
    UserAgentConfig,
};
use crate::state::CrawlState;
use crate::ConfigError;
use reqwest::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    if let Some(user_agent) = &config.user_agent {
        validate_user_agent_config(user_agent)?;
    }
    validate_storage_config(&config.storage)?;
    validate_committer_config(&config.committer)?;
    validate_reference_filters(&config.reference_filters)?;
    validate_field_filters("metadata", &config.metadata_filters)?;
    validate_field_filters("document", &config.document_filters)?;
    validate_spoiled_references(&config.spoiled_references)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.id.is_empty() {
        return Err(ConfigError::Validation("id cannot be empty".to_string()));
    }

    if !config
        .id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "id must contain only alphanumeric characters, '-', '_' and '.', got '{}'",
            config.id
        )));
    }

    if config.num_threads < 1 || config.num_threads > 256 {
        return Err(ConfigError::Validation(format!(
            "num_threads must be between 1 and 256, got {}",
            config.num_threads
        )));
    }

    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be -1 (unlimited) or >= 0, got {}",
            config.max_depth
        )));
    }

    if config.max_documents < -1 {
        return Err(ConfigError::Validation(format!(
            "max_documents must be -1 (unlimited) or >= 0, got {}",
            config.max_documents
        )));
    }

    if !config.metadata_fetch_support.is_enabled() && !config.document_fetch_support.is_enabled()
    {
        return Err(ConfigError::Validation(
            "metadata_fetch_support and document_fetch_support cannot both be disabled"
                .to_string(),
        ));
    }

    for reference in &config.start_references {
        if reference.trim().is_empty() {
            return Err(ConfigError::Validation(
                "start_references cannot contain blank references".to_string(),
            ));
        }
    }

    if config.idle_poll_millis < 1 {
        return Err(ConfigError::Validation(
            "idle_poll_millis must be >= 1".to_string(),
        ));
    }

    if config.shutdown_timeout_secs < 1 || config.queue_init_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "shutdown_timeout_secs and queue_init_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates committer configuration
fn validate_committer_config(config: &CommitterConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.output_path.is_empty() {
        return Err(ConfigError::Validation(
            "output_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Reference filters always test the reference itself
fn validate_reference_filters(filters: &[FilterConfig]) -> Result<(), ConfigError> {
    for filter in filters {
        if let Some(field) = &filter.field {
            return Err(ConfigError::InvalidPattern(format!(
                "reference filter '{}' cannot target field '{}'",
                filter.expression, field
            )));
        }
    }
    Ok(())
}

/// Validates metadata/document filters
fn validate_field_filters(kind: &str, filters: &[FilterConfig]) -> Result<(), ConfigError> {
    for filter in filters {
        if let Some(field) = &filter.field {
            if field.trim().is_empty() {
                return Err(ConfigError::InvalidPattern(format!(
                    "{} filter '{}' has a blank field name",
                    kind, filter.expression
                )));
            }
        }
    }
    Ok(())
}

/// Validates spoiled reference mappings
///
/// Keys must name a crawl state that can actually end up spoiled.
fn validate_spoiled_references(config: &SpoiledReferencesConfig) -> Result<(), ConfigError> {
    for key in config.mappings.keys() {
        let state = CrawlState::from_db_string(key).ok_or_else(|| {
            ConfigError::Validation(format!("Unknown crawl state in spoiled-references: '{}'", key))
        })?;

        if !state.is_spoiled() {
            return Err(ConfigError::Validation(format!(
                "State '{}' is never spoiled and cannot have a strategy",
                state
            )));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchSupport;
    use crate::spoil::SpoiledReferenceStrategy;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.crawler.id = "test".to_string();
        config.crawler.start_references = vec!["http://a".to_string()];
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_crawler_id() {
        let mut config = valid_config();
        config.crawler.id = "has space".to_string();
        assert!(validate(&config).is_err());

        config.crawler.id = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_depth_and_documents() {
        let mut config = valid_config();
        config.crawler.max_depth = -2;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.crawler.max_documents = -5;
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.crawler.max_depth = 0;
        config.crawler.max_documents = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_both_directives_disabled() {
        let mut config = valid_config();
        config.crawler.document_fetch_support = FetchSupport::Disabled;
        assert!(validate(&config).is_err());

        config.crawler.metadata_fetch_support = FetchSupport::Required;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_blank_start_reference() {
        let mut config = valid_config();
        config.crawler.start_references.push("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_reference_filter_cannot_target_field() {
        let mut config = valid_config();
        config.reference_filters.push(FilterConfig {
            expression: "*".to_string(),
            on_match: Default::default(),
            field: Some("Content-Type".to_string()),
            ignore_case: false,
        });
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_spoiled_reference_mappings() {
        let mut config = valid_config();
        config
            .spoiled_references
            .mappings
            .insert("not-found".to_string(), SpoiledReferenceStrategy::Ignore);
        assert!(validate(&config).is_ok());

        config
            .spoiled_references
            .mappings
            .insert("new".to_string(), SpoiledReferenceStrategy::Delete);
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config
            .spoiled_references
            .mappings
            .insert("sideways".to_string(), SpoiledReferenceStrategy::Delete);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_user_agent() {
        let mut config = valid_config();
        config.user_agent = Some(UserAgentConfig {
            crawler_name: "Bad Name".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com".to_string(),
            contact_email: "a@example.com".to_string(),
        });
        assert!(validate(&config).is_err());
    }
}
