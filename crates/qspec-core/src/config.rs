//! Configuration types and loading
//!
//! Limits applied to externally supplied filter payloads, paging bounds, and
//! the policy for textual values that fail to parse.

use serde::{Deserialize, Serialize};

/// What the filter compiler does with a value that does not parse as the
/// field's type
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailurePolicy {
    /// Substitute the type's default value (zero, empty, false, epoch)
    #[default]
    DefaultValue,
    /// Turn the whole condition into a constant non-match
    NoMatch,
}

impl ParseFailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default_value" | "default" | "lenient" => Some(Self::DefaultValue),
            "no_match" | "strict" => Some(Self::NoMatch),
            _ => None,
        }
    }
}

/// Query compilation configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueryConfig {
    /// More top-level filter items than this compiles to "match nothing"
    pub max_filter_items: usize,
    /// More filter groups than this compiles to "match nothing"
    pub max_filter_groups: usize,
    /// Maximum items inside one filter group
    pub max_group_items: usize,
    /// Maximum entries in an `in`/`not-in` list
    pub max_set_values: usize,
    /// Maximum length of a textual filter value or search term
    pub max_value_length: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub parse_failure: ParseFailurePolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_filter_items: 64,
            max_filter_groups: 16,
            max_group_items: 64,
            max_set_values: 256,
            max_value_length: 1024,
            default_page_size: 20,
            max_page_size: 1000,
            parse_failure: ParseFailurePolicy::DefaultValue,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl QueryConfig {
    /// Load `.env` (if present), then read `QSPEC_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let read_usize = |key: &str, target: &mut usize| -> Result<(), ConfigError> {
            if let Some(raw) = lookup(key) {
                *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected a non-negative integer, got {:?}", raw),
                })?;
            }
            Ok(())
        };

        read_usize("QSPEC_MAX_FILTER_ITEMS", &mut config.max_filter_items)?;
        read_usize("QSPEC_MAX_FILTER_GROUPS", &mut config.max_filter_groups)?;
        read_usize("QSPEC_MAX_GROUP_ITEMS", &mut config.max_group_items)?;
        read_usize("QSPEC_MAX_SET_VALUES", &mut config.max_set_values)?;
        read_usize("QSPEC_MAX_VALUE_LENGTH", &mut config.max_value_length)?;
        read_usize("QSPEC_DEFAULT_PAGE_SIZE", &mut config.default_page_size)?;
        read_usize("QSPEC_MAX_PAGE_SIZE", &mut config.max_page_size)?;

        if let Some(raw) = lookup("QSPEC_PARSE_FAILURE") {
            config.parse_failure =
                ParseFailurePolicy::from_str(raw.trim()).ok_or_else(|| ConfigError::InvalidValue {
                    key: "QSPEC_PARSE_FAILURE".to_string(),
                    message: format!("expected default_value or no_match, got {:?}", raw),
                })?;
        }

        if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
            return Err(ConfigError::InvalidValue {
                key: "QSPEC_DEFAULT_PAGE_SIZE".to_string(),
                message: format!(
                    "must be between 1 and max_page_size ({})",
                    config.max_page_size
                ),
            });
        }

        tracing::debug!(?config, "Query configuration loaded");
        Ok(config)
    }
}
