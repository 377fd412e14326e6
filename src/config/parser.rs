use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tidemark::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is logged at startup so runs made with different settings can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrphansStrategy;
    use crate::fetch::FetchSupport;
    use crate::filter::OnMatch;
    use crate::spoil::SpoiledReferenceStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
id = "docs-crawler"
start-references = ["https://example.com/"]
num-threads = 4
max-depth = 3
max-documents = 500
orphans-strategy = "delete"
metadata-fetch-support = "optional"
metadata-checksum-fields = ["ETag", "Last-Modified"]

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[storage]
database-path = "./test.db"

[committer]
batch-size = 50
output-path = "./out.jsonl"

[[reference-filter]]
expression = "*.pdf"
on-match = "exclude"

[[metadata-filter]]
field = "Content-Type"
expression = "text/*"

[spoiled-references]
fallback = "ignore"

[spoiled-references.mappings]
not-found = "grace-once"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.id, "docs-crawler");
        assert_eq!(config.crawler.num_threads, 4);
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_documents, 500);
        assert_eq!(config.crawler.orphans_strategy, OrphansStrategy::Delete);
        assert_eq!(
            config.crawler.metadata_fetch_support,
            FetchSupport::Optional
        );
        assert_eq!(
            config.crawler.document_fetch_support,
            FetchSupport::Required
        );
        assert_eq!(config.committer.batch_size, 50);
        assert_eq!(config.reference_filters[0].on_match, OnMatch::Exclude);
        assert_eq!(config.metadata_filters[0].on_match, OnMatch::Include);
        assert_eq!(
            config.metadata_filters[0].field.as_deref(),
            Some("Content-Type")
        );
        assert_eq!(
            config.spoiled_references.fallback,
            Some(SpoiledReferenceStrategy::Ignore)
        );
        assert_eq!(
            config.spoiled_references.mappings.get("not-found"),
            Some(&SpoiledReferenceStrategy::GraceOnce)
        );
        assert_eq!(config.user_agent.unwrap().crawler_name, "TestCrawler");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
[crawler]
id = "minimal"
start-references = ["https://example.com/"]
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.num_threads, 2);
        assert_eq!(config.crawler.max_depth, -1);
        assert_eq!(config.crawler.max_documents, -1);
        assert_eq!(config.crawler.orphans_strategy, OrphansStrategy::Process);
        assert!(config.crawler.document_checksum);
        assert!(config.user_agent.is_none());
        assert_eq!(config.committer.batch_size, 20);
        assert_eq!(config.storage.database_path, "./tidemark.db");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
id = "bad"
start-references = ["https://example.com/"]
num-threads = 0
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
