//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the legal archive, providing one structured
//! error taxonomy shared by citation parsing, format adapters, transclusion,
//! versioning, and the storage/index engine.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from various system components
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Citation, Adapter, Transclusion, Versioning, Storage
//!
//! ## Key Features
//! - Hierarchical error types with detailed context
//! - Automatic error conversion and chaining
//! - Fatal/per-document classification driving batch ingestion policy
//! - Structured logging integration
//!
//! ## Usage
//! ```rust,ignore
//! use crate::errors::{ArchiveError, Result};
//!
//! fn parse_operation(text: &str) -> Result<()> {
//!     Err(ArchiveError::MalformedCitation {
//!         text: text.to_string(),
//!         reason: "no recognized grammar".to_string(),
//!     })
//! }
//! ```

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Comprehensive error types for the legal archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    // Citation addressing errors
    #[error("Malformed citation '{text}': {reason}")]
    MalformedCitation { text: String, reason: String },

    #[error("Ambiguous citation '{text}': matches {candidates:?}")]
    AmbiguousCitation {
        text: String,
        candidates: Vec<String>,
    },

    // Format adapter errors
    #[error("No adapter claims document from {source_url}: {details}")]
    UnknownSchema { source_url: String, details: String },

    #[error("Adapter '{adapter}' rejected document: {details}")]
    SchemaMismatch { adapter: String, details: String },

    #[error("Document structure exceeds depth limit: {depth} > {limit}")]
    StructuralDepthExceeded { depth: usize, limit: usize },

    // Transclusion errors
    #[error("Circular include chain: {chain:?}")]
    CircularInclude { chain: Vec<String> },

    // Versioning errors
    #[error("Concurrent write detected on version chain for {citation}")]
    VersionChainConflict { citation: String },

    // Storage and index errors
    #[error("Full-text index write failed: {details}")]
    IndexWriteFailure { details: String },

    #[error("Storage corruption detected: {location} - {details}")]
    StorageCorrupted { location: String, details: String },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// XML parsing errors
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ArchiveError {
    /// Whether the error aborts an entire ingestion batch.
    ///
    /// Per-document errors (bad citation, unknown schema, cycle) are collected
    /// into the batch report; storage and index failures are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::IndexWriteFailure { .. }
                | ArchiveError::StorageCorrupted { .. }
                | ArchiveError::Database(_)
                | ArchiveError::Io(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            ArchiveError::MalformedCitation { .. } | ArchiveError::AmbiguousCitation { .. } => {
                "citation"
            }
            ArchiveError::UnknownSchema { .. }
            | ArchiveError::SchemaMismatch { .. }
            | ArchiveError::StructuralDepthExceeded { .. }
            | ArchiveError::Xml(_) => "adapter",
            ArchiveError::CircularInclude { .. } => "transclusion",
            ArchiveError::VersionChainConflict { .. } => "versioning",
            ArchiveError::IndexWriteFailure { .. }
            | ArchiveError::StorageCorrupted { .. }
            | ArchiveError::Database(_)
            | ArchiveError::Serialization(_) => "storage",
            ArchiveError::Config { .. } | ArchiveError::Toml(_) => "configuration",
            ArchiveError::Io(_) | ArchiveError::Internal { .. } => "generic",
        }
    }
}

// Helper macro for internal errors
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::ArchiveError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::ArchiveError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}
