//! Configuration management for the PMML predictor

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// How batch tables are handed to the scoring engine
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Use the engine's vectorized path when it offers one, else score row by row
    #[default]
    Auto,
    /// Always score one row at a time
    RowByRow,
}

/// What the coercer does with inputs whose declared type is unknown
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTypePolicy {
    /// Coerce as a float (most declarative models are numeric-majority)
    #[default]
    Float,
    /// Refuse until the caller declares a type for the field
    RequireDeclared,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub table: TableConfig,
    pub manual_entry: ManualEntryConfig,
    pub logging: LoggingConfig,
}

/// Scoring behaviour
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    pub batch_mode: BatchMode,
    pub unknown_type: UnknownTypePolicy,
}

/// Delimited table I/O
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Field delimiter for batch input and export
    pub delimiter: char,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

/// Degraded manual-entry mode, used when a model exposes no input fields
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManualEntryConfig {
    /// Number of fields offered by default
    pub default_fields: usize,
    /// Upper bound on the number of user-declared fields
    pub max_fields: usize,
}

impl Default for ManualEntryConfig {
    fn default() -> Self {
        Self {
            default_fields: 5,
            max_fields: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new("config/config.toml");
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
