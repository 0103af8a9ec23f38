//! # Legal Document Archive
//!
//! ## Overview
//! This library archives heterogeneous legal-document sources (federal USLM
//! statute XML, DC Council code XML, UK CLML, Canada Justice/LIMS) as a
//! single citation-addressable, versioned, searchable corpus with
//! point-in-time retrieval and a resolvable cross-reference graph.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `citation`: Jurisdiction-qualified citation parsing and canonical paths
//! - `adapters`: One format adapter per source schema, selected by sniffing
//! - `model`: The canonical Container/Section/Leaf document tree
//! - `transclusion`: Cross-file include resolution with cycle detection
//! - `version`: Immutable version chains and the content-hash diff engine
//! - `crossref`: Citation-shaped span extraction into graph edges
//! - `storage`: Sled-backed version/edge/index persistence and queries
//! - `text`: Tokenization and normalization feeding the full-text index
//! - `archive`: The facade tying the pipeline together
//! - `config`: Configuration management and settings
//! - `errors`: Centralized error handling and types
//!
//! ## Input/Output Specification
//! - **Input**: Raw fetched XML documents (bytes + source URL + timestamp),
//!   citation text, search queries
//! - **Output**: Committed immutable versions, point-in-time documents,
//!   ranked search results, reference-graph edges
//! - **Guarantees**: Idempotent ingestion, per-version transactional commits,
//!   index always rebuildable from versions
//!
//! ## Usage
//! ```rust,no_run
//! use lawarchive::{Archive, Config, RawDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("archive.toml")?;
//!     let archive = Archive::open(config)?;
//!     let raw = RawDocument::new(std::fs::read("usc26s32.xml")?, "https://uscode.house.gov/usc26s32.xml");
//!     let outcome = archive.ingest(&raw).await?;
//!     println!("committed {} as {:?}", outcome.version.citation, outcome.change);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod adapters;
pub mod archive;
pub mod citation;
pub mod config;
pub mod crossref;
pub mod errors;
pub mod model;
pub mod storage;
pub mod text;
pub mod transclusion;
pub mod version;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use adapters::RawDocument;
pub use archive::{Archive, CancelFlag, IngestOptions, IngestOutcome, IngestReport};
pub use citation::Citation;
pub use config::Config;
pub use crossref::{CrossReference, Direction, RelationKind, ResolutionState};
pub use errors::{ArchiveError, Result};
pub use model::{CanonicalDocument, DocNode, NodeId, NodeKind};
pub use storage::{SearchFilters, SearchHit};
pub use transclusion::SourceGraph;
pub use version::{ChangeKind, Version};
