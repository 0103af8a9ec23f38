//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the legal archive, supporting TOML
//! files with validation and type-safe access to all system settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), defaults
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation, dependency verification
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Configuration files
//! 2. Default values
//!
//! ## Usage
//! ```rust,ignore
//! use crate::config::Config;
//!
//! let config = Config::from_file("archive.toml")?;
//! println!("Database: {:?}", config.storage.db_path);
//! ```

use crate::errors::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Storage and database settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Format adapter settings
    #[serde(default)]
    pub adapters: AdapterConfig,
    /// Search behavior
    #[serde(default)]
    pub search: SearchConfig,
    /// Logging and monitoring
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage and database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Compress stored version payloads with gzip
    pub enable_compression: bool,
    /// Flush the database to disk after every committed version
    pub flush_on_commit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/archive.db"),
            enable_compression: true,
            flush_on_commit: true,
        }
    }
}

/// Format adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Maximum nesting depth tolerated in a source document
    pub max_structural_depth: usize,
    /// Skip malformed fragments instead of rejecting the whole document
    pub tolerate_partial_fragments: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_structural_depth: 64,
            tolerate_partial_fragments: true,
        }
    }
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default maximum number of results
    pub max_results: usize,
    /// Minimum query length in characters
    pub min_query_length: usize,
    /// Snippet length in characters
    pub snippet_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            min_query_length: 2,
            snippet_length: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "lawarchive=debug")
    pub filter: String,
    /// Emit logs as JSON
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ArchiveError::Config {
            message: format!("Cannot read config file {:?}: {}", path.as_ref(), e),
        })?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.adapters.max_structural_depth == 0 {
            return Err(ArchiveError::Config {
                message: "adapters.max_structural_depth must be at least 1".to_string(),
            });
        }

        if self.search.max_results == 0 {
            return Err(ArchiveError::Config {
                message: "search.max_results must be at least 1".to_string(),
            });
        }

        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ArchiveError::Config {
                message: "storage.db_path must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Initialize tracing from the logging configuration.
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
