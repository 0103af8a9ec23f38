//! # Archive Facade
//!
//! ## Purpose
//! The boundary the outside world consumes: ingest raw documents, retrieve a
//! citation as of a date, search the corpus, and walk the reference graph.
//! Fetch/scrape tooling, CLIs, and transports sit above this module and never
//! touch the pipeline pieces directly.
//!
//! ## Input/Output Specification
//! - **Input**: Raw fetched documents (bytes + source URL + retrieval time),
//!   citation text, search queries
//! - **Output**: Committed versions, point-in-time documents, ranked search
//!   hits, reference edges, structured batch reports
//!
//! ## Pipeline
//! raw document → adapter normalization → transclusion resolution →
//! cross-reference extraction → transactional commit (version + edges +
//! index) → pending-edge resolution

use crate::adapters::{AdapterRegistry, RawDocument};
use crate::citation::Citation;
use crate::config::Config;
use crate::crossref::{self, CrossReference, Direction};
use crate::errors::Result;
use crate::storage::{ArchiveStore, SearchFilters, SearchHit, StoreStats};
use crate::transclusion::{self, IncludeWarning, SourceGraph};
use crate::version::{ChangeKind, Version};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Character cap on a failure reason in the batch report; adapter errors can
/// embed whole source fragments.
const MAX_FAILURE_REASON_CHARS: usize = 240;

/// Cooperative cancellation signal for batch ingestion, checked at document
/// boundaries. Already-committed versions survive cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extra per-document ingestion parameters
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Legal effective date, when the caller knows it
    pub effective_date: Option<NaiveDate>,
    /// Record the new version as an explicit correction
    pub correction: bool,
}

/// Result of ingesting one document
#[derive(Debug)]
pub struct IngestOutcome {
    pub version: Version,
    /// What this ingestion did to the chain (`Unchanged` wrote nothing)
    pub change: ChangeKind,
    /// Includes whose targets were missing; placeholders remain in the tree
    pub include_warnings: Vec<IncludeWarning>,
}

/// Structured summary of a batch ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub created: usize,
    pub amended: usize,
    pub repealed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// (source URL, reason) per failed document
    pub failures: Vec<(String, String)>,
    /// Whether the batch stopped early on the cancellation flag
    pub cancelled: bool,
}

impl IngestReport {
    fn record(&mut self, change: ChangeKind) {
        match change {
            ChangeKind::Created => self.created += 1,
            ChangeKind::Amended | ChangeKind::Correction => self.amended += 1,
            ChangeKind::Repealed => self.repealed += 1,
            ChangeKind::Unchanged => self.unchanged += 1,
        }
    }
}

/// The legal-document archive
pub struct Archive {
    registry: AdapterRegistry,
    store: Arc<ArchiveStore>,
}

impl Archive {
    /// Open (or create) an archive with the given configuration
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(ArchiveStore::open(&config)?);
        Ok(Self {
            registry: AdapterRegistry::with_defaults(config.adapters),
            store,
        })
    }

    /// Ingest one raw document with no companion fragments
    pub async fn ingest(&self, raw: &RawDocument) -> Result<IngestOutcome> {
        self.ingest_with_sources(raw, &SourceGraph::new()).await
    }

    /// Ingest one raw document whose includes may refer to `graph` fragments
    pub async fn ingest_with_sources(
        &self,
        raw: &RawDocument,
        graph: &SourceGraph,
    ) -> Result<IngestOutcome> {
        self.ingest_with_options(raw, graph, IngestOptions::default())
            .await
    }

    /// Full-control ingestion entry point
    pub async fn ingest_with_options(
        &self,
        raw: &RawDocument,
        graph: &SourceGraph,
        options: IngestOptions,
    ) -> Result<IngestOutcome> {
        let normalized = self.registry.normalize(raw)?;
        let (document, include_warnings) = transclusion::resolve(normalized, graph)?;
        let edges = crossref::extract(&document.root, &document.citation);
        let (version, change) = self
            .store
            .commit(&document, edges, options.effective_date, options.correction)
            .await?;
        Ok(IngestOutcome {
            version,
            change,
            include_warnings,
        })
    }

    /// Ingest a batch of documents, collecting per-document failures.
    ///
    /// Per-document errors (bad citation, unknown schema, cycles) go into the
    /// report and never abort sibling documents; fatal storage/index errors
    /// abort the batch. The cancellation flag is checked between documents.
    pub async fn ingest_batch(
        &self,
        documents: Vec<RawDocument>,
        graph: &SourceGraph,
        cancel: &CancelFlag,
    ) -> Result<IngestReport> {
        let timer = crate::utils::Timer::new("ingest_batch");
        let mut report = IngestReport::default();
        for raw in documents {
            if cancel.is_cancelled() {
                tracing::info!("batch ingestion cancelled");
                report.cancelled = true;
                break;
            }
            match self.ingest_with_sources(&raw, graph).await {
                Ok(outcome) => report.record(outcome.change),
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, url = %raw.source_url, "fatal error, aborting batch");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, category = e.category(), url = %raw.source_url, "document failed");
                    report.failed += 1;
                    report.failures.push((
                        raw.source_url.clone(),
                        crate::utils::truncate(&e.to_string(), MAX_FAILURE_REASON_CHARS),
                    ));
                }
            }
        }
        tracing::info!(
            created = report.created,
            amended = report.amended,
            repealed = report.repealed,
            unchanged = report.unchanged,
            failed = report.failed,
            elapsed_ms = timer.stop(),
            "batch ingestion finished"
        );
        Ok(report)
    }

    /// Retrieve a citation's document, optionally as of a date.
    ///
    /// An `@YYYY-MM-DD` suffix in the citation text acts as the as-of date
    /// unless an explicit `as_of` overrides it. Absent citations return
    /// `Ok(None)`.
    pub async fn get(&self, citation_text: &str, as_of: Option<NaiveDate>) -> Result<Option<Version>> {
        let citation = Citation::parse(citation_text)?;
        let date = as_of.or(citation.as_of);
        self.store.get_as_of(&citation, date)
    }

    /// Ranked keyword search over the latest versions
    pub async fn search(&self, query: &str, filters: SearchFilters) -> Result<Vec<SearchHit>> {
        self.store.search(query, &filters)
    }

    /// Reference edges touching a citation, outgoing or incoming
    pub async fn cross_references(
        &self,
        citation_text: &str,
        direction: Direction,
    ) -> Result<Vec<CrossReference>> {
        let citation = Citation::parse(citation_text)?;
        self.store.walk_references(&citation, direction)
    }

    /// Regenerate the full-text index from stored versions
    pub async fn rebuild_index(&self) -> Result<()> {
        self.store.rebuild_index()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}
