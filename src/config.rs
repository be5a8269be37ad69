//! Configuration file parser for feedpatch.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields`
//! off), though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::util::{validate_base_url, UrlValidationError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// The image base address is not a usable http(s) URL.
    #[error("Invalid image_base_url: {0}")]
    InvalidBaseUrl(#[from] UrlValidationError),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Matching conditions for one promotional label. An offer receives the
/// label when any name substring matches case-insensitively, any url
/// substring matches case-insensitively, or the offer id appears exactly
/// in `id`. All lists default to empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelRule {
    pub name: Vec<String>,
    pub url: Vec<String>,
    pub id: Vec<String>,
}

impl LabelRule {
    /// `name_lower` and `url_lower` must already be lowercased by the
    /// caller; id comparison is exact.
    pub fn matches(&self, name_lower: &str, url_lower: &str, id: &str) -> bool {
        self.name
            .iter()
            .any(|sub| name_lower.contains(&sub.to_lowercase()))
            || self
                .url
                .iter()
                .any(|sub| url_lower.contains(&sub.to_lowercase()))
            || self.id.iter().any(|candidate| candidate == id)
    }
}

/// Which offers to flip and what value the `available` attribute gets.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AvailabilityRule {
    pub ids: Vec<String>,
    pub flag: String,
}

impl Default for AvailabilityRule {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            flag: "false".to_string(),
        }
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding the source feed files.
    pub feeds_dir: PathBuf,

    /// Folder edited feeds are written to.
    pub output_dir: PathBuf,

    /// Folder scanned for replacement images (one file per offer id, or
    /// `<id>_promo` for promo images).
    pub image_dir: PathBuf,

    /// URL prefix prepended to replacement image filenames.
    pub image_base_url: String,

    /// Path to the SQLite report database (`:memory:` works for tests).
    pub database_path: String,

    /// Offer ids whose `available` attribute gets rewritten, and the value.
    pub availability: AvailabilityRule,

    /// Offer ids removed from every feed.
    pub delete_ids: Vec<String>,

    /// Label name -> matching conditions. A BTreeMap so index allocation,
    /// which depends on rule iteration order, is deterministic.
    pub labels: BTreeMap<String, LabelRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds_dir: PathBuf::from("feeds"),
            output_dir: PathBuf::from("feeds_out"),
            image_dir: PathBuf::from("images"),
            image_base_url: "https://images.example.com/feeds".to_string(),
            database_path: "feedpatch.db".to_string(),
            availability: AvailabilityRule::default(),
            delete_ids: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged
    ///   as warning
    /// - `image_base_url` is validated (http/https) and normalized: any
    ///   trailing `/` is trimmed so image paths are joined with exactly one
    ///   separator
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading: a corrupted or hostile config must
        // not exhaust memory.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "feeds_dir",
                "output_dir",
                "image_dir",
                "image_base_url",
                "database_path",
                "availability",
                "delete_ids",
                "labels",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        config.image_base_url = validate_base_url(&config.image_base_url)?;
        tracing::info!(
            path = %path.display(),
            feeds_dir = %config.feeds_dir.display(),
            labels = config.labels.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feeds_dir, PathBuf::from("feeds"));
        assert_eq!(config.output_dir, PathBuf::from("feeds_out"));
        assert_eq!(config.image_dir, PathBuf::from("images"));
        assert_eq!(config.image_base_url, "https://images.example.com/feeds");
        assert_eq!(config.database_path, "feedpatch.db");
        assert!(config.availability.ids.is_empty());
        assert_eq!(config.availability.flag, "false");
        assert!(config.delete_ids.is_empty());
        assert!(config.labels.is_empty());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedpatch_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.feeds_dir, PathBuf::from("feeds"));
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database_path, "feedpatch.db");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "feeds_dir = \"downloads\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds_dir, PathBuf::from("downloads"));
        assert_eq!(config.output_dir, PathBuf::from("feeds_out")); // default
        assert_eq!(config.availability.flag, "false"); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
feeds_dir = "in"
output_dir = "out"
image_dir = "img"
image_base_url = "https://cdn.example.com/promo/"
database_path = "reports.db"
delete_ids = ["900", "901"]

[availability]
ids = ["1", "2"]
flag = "true"

[labels.SALE]
name = ["clearance", "outlet"]
url = ["/sale/"]

[labels.NEW]
id = ["42"]
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds_dir, PathBuf::from("in"));
        assert_eq!(config.database_path, "reports.db");
        // trailing slash trimmed
        assert_eq!(config.image_base_url, "https://cdn.example.com/promo");
        assert_eq!(config.availability.ids, vec!["1", "2"]);
        assert_eq!(config.availability.flag, "true");
        assert_eq!(config.delete_ids, vec!["900", "901"]);

        let sale = config.labels.get("SALE").unwrap();
        assert_eq!(sale.name, vec!["clearance", "outlet"]);
        assert_eq!(sale.url, vec!["/sale/"]);
        assert!(sale.id.is_empty());
        let new = config.labels.get("NEW").unwrap();
        assert_eq!(new.id, vec!["42"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
feeds_dir = "feeds"
totally_fake_key = "should not fail"
another_unknown = 42
"#;
        std::fs::write(&path, content).unwrap();

        // Should succeed (unknown keys ignored)
        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds_dir, PathBuf::from("feeds"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_wrongtype");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        // delete_ids should be a list, not an integer
        std::fs::write(&path, "delete_ids = 42\n").unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_badurl");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "image_base_url = \"ftp://cdn.example.com\"\n").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("feedpatch_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        // Write a file just over 1MB
        let content = "a".repeat(1_048_577);
        std::fs::write(&path, content).unwrap();

        let result = Config::load(&path);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_label_rule_matching() {
        let rule = LabelRule {
            name: vec!["Clearance".to_string()],
            url: vec!["/SALE/".to_string()],
            id: vec!["7".to_string()],
        };
        // substring conditions are case-insensitive
        assert!(rule.matches("winter clearance jacket", "", "1"));
        assert!(rule.matches("", "https://shop.example.com/sale/7", "1"));
        // id condition is exact
        assert!(rule.matches("", "", "7"));
        assert!(!rule.matches("", "", "77"));
        assert!(!rule.matches("plain shirt", "https://shop.example.com/new", "1"));
    }

    #[test]
    fn test_empty_label_rule_matches_nothing() {
        let rule = LabelRule::default();
        assert!(!rule.matches("anything", "https://anywhere", "1"));
    }
}
