//! Repository configuration.

use crate::entity::DateFormats;
use crate::error::{ConfigError, ConfigErrorKind, Error, Result};
use serde::Deserialize;

/// Settings shared by every repository built over one catalog.
///
/// Every field has a default, so an empty JSON object is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Default chrono format for reading date attributes.
    pub date_format_get: String,
    /// Default chrono format for writing date attributes.
    pub date_format_store: String,
    /// Column stamped on insert when an entity keeps timestamps.
    pub created_at: String,
    /// Column stamped on insert and update when an entity keeps timestamps.
    pub updated_at: String,
    /// Page size of lookup (type-ahead) queries.
    pub lookup_page_size: u64,
    /// Separator between the parts of a composite grid column.
    pub virtual_separator: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let formats = DateFormats::default();
        Self {
            date_format_get: formats.get,
            date_format_store: formats.store,
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
            lookup_page_size: 30,
            virtual_separator: " / ".to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            Error::Config(ConfigError {
                kind: ConfigErrorKind::Invalid,
                message: format!("invalid repository configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })?;
        if config.lookup_page_size == 0 {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                "lookup_page_size must be positive",
            ));
        }
        Ok(config)
    }

    /// Default date formats as a pair.
    pub fn date_formats(&self) -> DateFormats {
        DateFormats {
            get: self.date_format_get.clone(),
            store: self.date_format_store.clone(),
        }
    }
}
