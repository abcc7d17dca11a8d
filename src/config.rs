//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::store::{ReadConcern, ReadPreference, TransactionOptions, WriteConcern};

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub transaction: TransactionConfig,

    /// Instance-level existence policy (default: false)
    #[serde(default)]
    pub raise_document_existence_errors: bool,
}

/// How schema registries shape and bind their collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Add identifier, version, soft-delete and timestamp fields (default: true)
    #[serde(default = "default_true")]
    pub add_common_properties: bool,

    /// Attach the definition as a store validator (default: true)
    #[serde(default = "default_true")]
    pub validation_enabled: bool,
}

/// Options for engine-owned transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default = "default_read_concern")]
    pub read_concern: ReadConcern,

    #[serde(default = "default_write_concern")]
    pub write_concern: WriteConcern,

    #[serde(default = "default_read_preference")]
    pub read_preference: ReadPreference,

    /// Attempts made when a transaction fails with a transient error (default: 3)
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

fn default_true() -> bool {
    true
}

fn default_read_concern() -> ReadConcern {
    ReadConcern::Majority
}

fn default_write_concern() -> WriteConcern {
    WriteConcern::Majority
}

fn default_read_preference() -> ReadPreference {
    ReadPreference::Primary
}

fn default_max_commit_attempts() -> u32 {
    3
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            add_common_properties: default_true(),
            validation_enabled: default_true(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            read_concern: default_read_concern(),
            write_concern: default_write_concern(),
            read_preference: default_read_preference(),
            max_commit_attempts: default_max_commit_attempts(),
        }
    }
}

impl TransactionConfig {
    /// Options passed to the store when a transaction starts.
    pub fn options(&self) -> TransactionOptions {
        TransactionOptions {
            read_concern: self.read_concern,
            write_concern: self.write_concern,
            read_preference: self.read_preference,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema: SchemaConfig::default(),
            transaction: TransactionConfig::default(),
            raise_document_existence_errors: false,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON configuration.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_argument(format!("Invalid configuration: {}", e)))
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::invalid_argument(format!(
                "Failed to read configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Same defaults, with the existence policy switched on.
    pub fn with_existence_errors() -> Self {
        Self {
            raise_document_existence_errors: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.schema.add_common_properties);
        assert!(config.schema.validation_enabled);
        assert!(!config.raise_document_existence_errors);
        assert_eq!(config.transaction.max_commit_attempts, 3);
        assert_eq!(config.transaction.options(), TransactionOptions::default());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json_str(
            r#"{"schema": {"validation_enabled": false}, "transaction": {"read_preference": "primaryPreferred"}}"#,
        )
        .unwrap();
        assert!(!config.schema.validation_enabled);
        assert!(config.schema.add_common_properties);
        assert_eq!(config.transaction.read_preference, ReadPreference::PrimaryPreferred);
        assert_eq!(config.transaction.read_concern, ReadConcern::Majority);
    }

    #[test]
    fn test_invalid_json() {
        let err = EngineConfig::from_json_str("{\"schema\": 5}").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"raise_document_existence_errors": true}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert!(config.raise_document_existence_errors);

        assert!(EngineConfig::from_file(Path::new("/nonexistent/aerodoc.json")).is_err());
    }
}
