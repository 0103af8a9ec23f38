//! # Storage & Index Engine
//!
//! ## Purpose
//! Persists version chains, the cross-reference graph, and the full-text
//! postings index in an embedded sled database, and answers point-in-time,
//! keyword, and graph queries over them.
//!
//! ## Input/Output Specification
//! - **Input**: Normalized documents with extracted reference edges
//! - **Output**: Committed immutable versions; query results
//! - **Storage**: Sled embedded database, one tree per concern
//!
//! ## Key Features
//! - Version + edges + postings commit in one multi-tree transaction
//! - Per-citation write serialization; readers never block writers
//! - Unresolved edges retried automatically when their target is ingested
//! - Optional gzip compression of stored version payloads
//! - The postings index is a derived cache, rebuildable from versions
//!
//! ## Tree Layout
//! - `versions`: version ID → version record
//! - `chains`: citation chain key → ordered version IDs
//! - `postings`: index term → (chain key → term frequency), latest versions
//! - `edges_out` / `edges_in`: chain key → reference edges
//! - `unresolved`: target chain key → source chain keys awaiting resolution
//! - `meta`: corpus metadata (tracked jurisdictions)

use crate::citation::Citation;
use crate::config::{Config, SearchConfig, StorageConfig};
use crate::crossref::{CrossReference, Direction, ResolutionState};
use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, NodeId};
use crate::text;
use crate::version::{plan_commit, ChangeKind, CommitPlan, Version};
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;
use uuid::Uuid;

const META_JURISDICTIONS: &str = "jurisdictions";

/// Storage marker bytes distinguishing plain from gzip version payloads
const PAYLOAD_PLAIN: u8 = 0;
const PAYLOAD_GZIP: u8 = 1;

/// Query filters for full-text search
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub jurisdiction: Option<String>,
    pub title: Option<String>,
    /// Inclusive range over the version's effective/retrieved date
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// One ranked search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub version: Version,
    pub score: f32,
    pub snippet: String,
}

/// In-memory corpus counters
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total_versions: u64,
    pub total_citations: u64,
}

/// The storage and index engine
pub struct ArchiveStore {
    config: StorageConfig,
    search_config: SearchConfig,
    db: sled::Db,
    versions: sled::Tree,
    chains: sled::Tree,
    postings: sled::Tree,
    edges_out: sled::Tree,
    edges_in: sled::Tree,
    unresolved: sled::Tree,
    meta: sled::Tree,
    /// Per-citation write locks serializing chain appends
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    stats: parking_lot::RwLock<StoreStats>,
}

impl ArchiveStore {
    /// Open (or create) the archive database
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.storage.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = sled::open(&config.storage.db_path)?;

        let store = Self {
            config: config.storage.clone(),
            search_config: config.search.clone(),
            versions: db.open_tree("versions")?,
            chains: db.open_tree("chains")?,
            postings: db.open_tree("postings")?,
            edges_out: db.open_tree("edges_out")?,
            edges_in: db.open_tree("edges_in")?,
            unresolved: db.open_tree("unresolved")?,
            meta: db.open_tree("meta")?,
            db,
            locks: DashMap::new(),
            stats: parking_lot::RwLock::new(StoreStats::default()),
        };
        store.refresh_stats();
        tracing::info!(
            citations = store.stats.read().total_citations,
            versions = store.stats.read().total_versions,
            "archive store opened"
        );
        Ok(store)
    }

    pub fn stats(&self) -> StoreStats {
        *self.stats.read()
    }

    fn refresh_stats(&self) {
        let mut stats = self.stats.write();
        stats.total_versions = self.versions.len() as u64;
        stats.total_citations = self.chains.len() as u64;
    }

    fn lock_for(&self, chain_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(chain_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Commit a normalized document with its extracted reference edges.
    ///
    /// Serializes against other writers of the same citation, diffs against
    /// the latest version, and applies the plan in one transaction covering
    /// the version, its chain entry, the postings index, and the edge trees.
    /// Idempotent: re-committing identical content returns the existing
    /// latest version with change kind `Unchanged`.
    pub async fn commit(
        &self,
        doc: &CanonicalDocument,
        mut edges: Vec<CrossReference>,
        effective_date: Option<NaiveDate>,
        correction: bool,
    ) -> Result<(Version, ChangeKind)> {
        let chain_key = doc.citation.chain_key();
        let lock = self.lock_for(&chain_key);
        let _guard = lock.lock().await;

        let previous = self.latest(&chain_key)?;
        let version = match plan_commit(previous.as_ref(), doc, effective_date, correction) {
            CommitPlan::Unchanged => {
                let latest = previous.ok_or_else(|| {
                    crate::internal_error!("unchanged plan without a stored version for {}", chain_key)
                })?;
                tracing::debug!(citation = %doc.citation, "content unchanged, no version written");
                return Ok((latest, ChangeKind::Unchanged));
            }
            CommitPlan::Append(version) => *version,
        };
        let change = version.change;

        self.settle_edge_states(&chain_key, &mut edges)?;

        // Everything the transaction writes is computed up front; the closure
        // may retry and must stay pure over these captures.
        let new_terms = text::term_frequencies(&version.root.collect_text());
        let prev_terms = previous
            .as_ref()
            .map(|p| text::term_frequencies(&p.root.collect_text()))
            .unwrap_or_default();
        let mut touched_terms: HashSet<&String> = new_terms.keys().collect();
        touched_terms.extend(prev_terms.keys());

        let prev_edges: Vec<CrossReference> = self.read_edges(&self.edges_out, &chain_key)?;
        let mut touched_targets: HashSet<String> =
            prev_edges.iter().map(|e| e.target.chain_key()).collect();
        touched_targets.extend(edges.iter().map(|e| e.target.chain_key()));

        let payload = self.encode_version(&version)?;
        let mut chain_ids = self.read_chain(&chain_key)?;
        chain_ids.push(version.id);

        let trees = (
            &self.versions,
            &self.chains,
            &self.postings,
            &self.edges_out,
            &self.edges_in,
            &self.unresolved,
            &self.meta,
        );
        let outcome = trees.transaction(
            |(tv, tc, tp, teo, tei, tu, tm): &(
                TransactionalTree,
                TransactionalTree,
                TransactionalTree,
                TransactionalTree,
                TransactionalTree,
                TransactionalTree,
                TransactionalTree,
            )| {
                tv.insert(version.id.as_bytes().to_vec(), payload.clone())?;

                // The chain tail was read under the per-citation lock; any
                // other stored tail means a writer slipped in between that
                // read and this transaction.
                let stored_chain: Vec<Uuid> = match tc.get(chain_key.as_bytes())? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => Vec::new(),
                };
                verify_chain_tail(&stored_chain, &chain_ids[..chain_ids.len() - 1], &chain_key)
                    .map_err(ConflictableTransactionError::Abort)?;
                tc.insert(chain_key.as_bytes(), tx_encode(&chain_ids)?)?;

                // Postings: replace this chain's contribution term by term.
                for term in &touched_terms {
                    let mut map: HashMap<String, u32> = match tp.get(term.as_bytes())? {
                        Some(bytes) => tx_decode(&bytes)?,
                        None => HashMap::new(),
                    };
                    match new_terms.get(*term) {
                        Some(freq) => {
                            map.insert(chain_key.clone(), *freq);
                        }
                        None => {
                            map.remove(&chain_key);
                        }
                    }
                    if map.is_empty() {
                        tp.remove(term.as_bytes())?;
                    } else {
                        tp.insert(term.as_bytes(), tx_encode(&map)?)?;
                    }
                }

                if edges.is_empty() {
                    teo.remove(chain_key.as_bytes())?;
                } else {
                    teo.insert(chain_key.as_bytes(), tx_encode(&edges)?)?;
                }

                // Incoming edges and the unresolved queue, per touched target.
                for target in &touched_targets {
                    let mut incoming: Vec<CrossReference> = match tei.get(target.as_bytes())? {
                        Some(bytes) => tx_decode(&bytes)?,
                        None => Vec::new(),
                    };
                    incoming.retain(|e| !node_in_chain(&e.source_node, &chain_key));
                    incoming.extend(
                        edges
                            .iter()
                            .filter(|e| &e.target.chain_key() == target)
                            .cloned(),
                    );
                    if incoming.is_empty() {
                        tei.remove(target.as_bytes())?;
                    } else {
                        tei.insert(target.as_bytes(), tx_encode(&incoming)?)?;
                    }

                    let mut waiting: Vec<String> = match tu.get(target.as_bytes())? {
                        Some(bytes) => tx_decode(&bytes)?,
                        None => Vec::new(),
                    };
                    waiting.retain(|source| source != &chain_key);
                    let still_unresolved = edges.iter().any(|e| {
                        &e.target.chain_key() == target && e.state == ResolutionState::Unresolved
                    });
                    if still_unresolved {
                        waiting.push(chain_key.clone());
                    }
                    if waiting.is_empty() {
                        tu.remove(target.as_bytes())?;
                    } else {
                        tu.insert(target.as_bytes(), tx_encode(&waiting)?)?;
                    }
                }

                let mut jurisdictions: HashSet<String> = match tm.get(META_JURISDICTIONS)? {
                    Some(bytes) => tx_decode(&bytes)?,
                    None => HashSet::new(),
                };
                jurisdictions.insert(version.citation.jurisdiction.clone());
                tm.insert(META_JURISDICTIONS.as_bytes(), tx_encode(&jurisdictions)?)?;

                Ok(())
            },
        );
        map_transaction_result(outcome)?;

        self.resolve_waiting(&doc.citation)?;

        if self.config.flush_on_commit {
            self.db.flush_async().await?;
        }
        self.refresh_stats();
        tracing::info!(
            citation = %doc.citation,
            change = ?change,
            sequence = version.sequence,
            "version committed"
        );
        Ok((version, change))
    }

    /// Settle the resolution state of outgoing edges at commit time.
    ///
    /// Target present in the corpus (or the committing document itself) →
    /// resolved-internal; target jurisdiction never seen by this corpus →
    /// resolved-external; otherwise left unresolved for a later retry.
    fn settle_edge_states(&self, own_chain: &str, edges: &mut [CrossReference]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let mut tracked: HashSet<String> = match self.meta.get(META_JURISDICTIONS)? {
            Some(bytes) => decode_plain(&bytes)?,
            None => HashSet::new(),
        };
        if let Some(own) = own_chain.split('/').next() {
            tracked.insert(own.to_string());
        }

        for edge in edges.iter_mut() {
            let target_chain = edge.target.chain_key();
            let exists = target_chain == own_chain
                || self.chains.contains_key(target_chain.as_bytes())?;
            edge.state = if exists {
                ResolutionState::ResolvedInternal {
                    target_node: NodeId(edge.target.without_as_of().canonical_path()),
                }
            } else if tracked.contains(&edge.target.jurisdiction) {
                ResolutionState::Unresolved
            } else {
                ResolutionState::ResolvedExternal
            };
        }
        Ok(())
    }

    /// Flip previously unresolved edges pointing at a just-committed citation
    /// to resolved-internal.
    fn resolve_waiting(&self, citation: &Citation) -> Result<()> {
        let own_chain = citation.chain_key();
        let waiting: Vec<String> = match self.unresolved.get(own_chain.as_bytes())? {
            Some(bytes) => decode_plain(&bytes)?,
            None => return Ok(()),
        };
        if waiting.is_empty() {
            return Ok(());
        }

        let trees = (&self.edges_out, &self.edges_in, &self.unresolved);
        let outcome = trees.transaction(
            |(teo, tei, tu): &(TransactionalTree, TransactionalTree, TransactionalTree)| {
                for source in &waiting {
                    let mut outgoing: Vec<CrossReference> = match teo.get(source.as_bytes())? {
                        Some(bytes) => tx_decode(&bytes)?,
                        None => continue,
                    };
                    let mut changed = false;
                    for edge in outgoing.iter_mut() {
                        if edge.state == ResolutionState::Unresolved
                            && edge.target.chain_key() == own_chain
                        {
                            edge.state = ResolutionState::ResolvedInternal {
                                target_node: NodeId(edge.target.without_as_of().canonical_path()),
                            };
                            changed = true;
                        }
                    }
                    if changed {
                        teo.insert(source.as_bytes(), tx_encode(&outgoing)?)?;
                    }
                }

                if let Some(bytes) = tei.get(own_chain.as_bytes())? {
                    let mut incoming: Vec<CrossReference> = tx_decode(&bytes)?;
                    for edge in incoming.iter_mut() {
                        if edge.state == ResolutionState::Unresolved {
                            edge.state = ResolutionState::ResolvedInternal {
                                target_node: NodeId(edge.target.without_as_of().canonical_path()),
                            };
                        }
                    }
                    tei.insert(own_chain.as_bytes(), tx_encode(&incoming)?)?;
                }

                tu.remove(own_chain.as_bytes())?;
                Ok(())
            },
        );
        map_transaction_result(outcome)?;
        tracing::debug!(citation = %citation, sources = waiting.len(), "pending edges resolved");
        Ok(())
    }

    /// Latest version for a citation chain, if any
    pub fn latest(&self, chain_key: &str) -> Result<Option<Version>> {
        let ids = match self.chains.get(chain_key.as_bytes())? {
            Some(bytes) => decode_plain::<Vec<Uuid>>(&bytes)?,
            None => return Ok(None),
        };
        match ids.last() {
            Some(id) => Ok(Some(self.version_by_id(id)?)),
            None => Ok(None),
        }
    }

    /// Point-in-time retrieval: the latest version whose effective/retrieved
    /// date is on or before `as_of`, or the current version when `as_of` is
    /// omitted. Absent citations are `Ok(None)`, never an error.
    pub fn get_as_of(&self, citation: &Citation, as_of: Option<NaiveDate>) -> Result<Option<Version>> {
        let chain_key = citation.chain_key();
        let ids = match self.chains.get(chain_key.as_bytes())? {
            Some(bytes) => decode_plain::<Vec<Uuid>>(&bytes)?,
            None => return Ok(None),
        };

        let date = match as_of {
            None => {
                return match ids.last() {
                    Some(id) => Ok(Some(self.version_by_id(id)?)),
                    None => Ok(None),
                }
            }
            Some(date) => date,
        };

        // Chains are short; scanning newest-to-oldest is the simple answer.
        for id in ids.iter().rev() {
            let version = self.version_by_id(id)?;
            if version.ordering_date() <= date {
                return Ok(Some(version));
            }
        }
        Ok(None)
    }

    /// Ranked keyword search over the latest version of every citation
    pub fn search(&self, query: &str, filters: &SearchFilters) -> Result<Vec<SearchHit>> {
        if query.trim().chars().count() < self.search_config.min_query_length {
            return Ok(Vec::new());
        }
        let terms = text::tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: HashMap<String, f32> = HashMap::new();
        for term in &terms {
            let map: HashMap<String, u32> = match self.postings.get(term.as_bytes())? {
                Some(bytes) => decode_plain(&bytes)?,
                None => continue,
            };
            for (chain_key, freq) in map {
                // Log-damped term frequency keeps one long schedule of
                // repeated words from drowning out focused sections.
                *scores.entry(chain_key).or_insert(0.0) += 1.0 + (freq as f32).ln();
            }
        }

        let mut hits = Vec::new();
        for (chain_key, score) in scores {
            let version = match self.latest(&chain_key)? {
                Some(version) => version,
                None => continue,
            };
            if let Some(jurisdiction) = &filters.jurisdiction {
                if &version.citation.jurisdiction != jurisdiction {
                    continue;
                }
            }
            if let Some(title) = &filters.title {
                if &version.citation.title != title {
                    continue;
                }
            }
            if let Some((from, to)) = &filters.date_range {
                let date = version.ordering_date();
                if date < *from || date > *to {
                    continue;
                }
            }
            let snippet = text::snippet(
                &version.root.collect_text(),
                &terms,
                self.search_config.snippet_length,
            );
            hits.push(SearchHit {
                version,
                score,
                snippet,
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.search_config.max_results);
        Ok(hits)
    }

    /// Walk the reference graph from a citation, outgoing or incoming
    pub fn walk_references(
        &self,
        citation: &Citation,
        direction: Direction,
    ) -> Result<Vec<CrossReference>> {
        let chain_key = citation.chain_key();
        let tree = match direction {
            Direction::Outgoing => &self.edges_out,
            Direction::Incoming => &self.edges_in,
        };
        self.read_edges(tree, &chain_key)
    }

    /// Rebuild the postings index from stored versions.
    ///
    /// The index is a derived cache; this regenerates it wholesale, e.g.
    /// after tokenizer changes.
    pub fn rebuild_index(&self) -> Result<()> {
        self.postings.clear()?;

        let mut rebuilt: HashMap<String, HashMap<String, u32>> = HashMap::new();
        for entry in self.chains.iter() {
            let (key, _) = entry?;
            let chain_key = String::from_utf8_lossy(&key).to_string();
            let version = match self.latest(&chain_key)? {
                Some(version) => version,
                None => continue,
            };
            for (term, freq) in text::term_frequencies(&version.root.collect_text()) {
                rebuilt.entry(term).or_default().insert(chain_key.clone(), freq);
            }
        }

        for (term, map) in rebuilt {
            self.postings
                .insert(term.as_bytes(), encode_plain(&map)?)
                .map_err(|e| ArchiveError::IndexWriteFailure {
                    details: format!("rebuild write for term '{}': {}", term, e),
                })?;
        }
        self.postings.flush()?;
        tracing::info!("postings index rebuilt");
        Ok(())
    }

    fn version_by_id(&self, id: &Uuid) -> Result<Version> {
        let bytes = self
            .versions
            .get(id.as_bytes())?
            .ok_or_else(|| ArchiveError::StorageCorrupted {
                location: "versions".to_string(),
                details: format!("chain references missing version {}", id),
            })?;
        self.decode_version(&bytes)
    }

    fn read_chain(&self, chain_key: &str) -> Result<Vec<Uuid>> {
        match self.chains.get(chain_key.as_bytes())? {
            Some(bytes) => decode_plain(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn read_edges(&self, tree: &sled::Tree, chain_key: &str) -> Result<Vec<CrossReference>> {
        match tree.get(chain_key.as_bytes())? {
            Some(bytes) => decode_plain(&bytes),
            None => Ok(Vec::new()),
        }
    }

    fn encode_version(&self, version: &Version) -> Result<Vec<u8>> {
        let raw = bincode::serialize(version)?;
        if !self.config.enable_compression {
            let mut out = vec![PAYLOAD_PLAIN];
            out.extend_from_slice(&raw);
            return Ok(out);
        }
        let mut encoder =
            flate2::write::GzEncoder::new(vec![PAYLOAD_GZIP], flate2::Compression::default());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }

    fn decode_version(&self, bytes: &[u8]) -> Result<Version> {
        let (marker, payload) = bytes.split_first().ok_or_else(|| ArchiveError::StorageCorrupted {
            location: "versions".to_string(),
            details: "empty version payload".to_string(),
        })?;
        let raw = match *marker {
            PAYLOAD_PLAIN => payload.to_vec(),
            PAYLOAD_GZIP => {
                let mut decoder = flate2::read::GzDecoder::new(payload);
                let mut raw = Vec::new();
                decoder.read_to_end(&mut raw)?;
                raw
            }
            other => {
                return Err(ArchiveError::StorageCorrupted {
                    location: "versions".to_string(),
                    details: format!("unknown payload marker {}", other),
                })
            }
        };
        Ok(bincode::deserialize(&raw)?)
    }
}

/// Whether a node ID belongs to a citation chain (the chain root itself or
/// any path beneath it)
fn node_in_chain(node: &NodeId, chain_key: &str) -> bool {
    let id = node.as_str();
    id == chain_key || id.strip_prefix(chain_key).map_or(false, |rest| rest.starts_with('/'))
}

/// A commit may only append to the chain tail it observed; any other stored
/// tail is a concurrent write on the same chain.
fn verify_chain_tail(stored: &[Uuid], observed: &[Uuid], chain_key: &str) -> Result<()> {
    if stored != observed {
        return Err(ArchiveError::VersionChainConflict {
            citation: chain_key.to_string(),
        });
    }
    Ok(())
}

fn encode_plain<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode_plain<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn tx_encode<T: Serialize>(
    value: &T,
) -> std::result::Result<Vec<u8>, ConflictableTransactionError<ArchiveError>> {
    bincode::serialize(value).map_err(|e| {
        ConflictableTransactionError::Abort(ArchiveError::IndexWriteFailure {
            details: format!("encode: {}", e),
        })
    })
}

fn tx_decode<T: DeserializeOwned>(
    bytes: &[u8],
) -> std::result::Result<T, ConflictableTransactionError<ArchiveError>> {
    bincode::deserialize(bytes).map_err(|e| {
        ConflictableTransactionError::Abort(ArchiveError::IndexWriteFailure {
            details: format!("decode: {}", e),
        })
    })
}

fn map_transaction_result<T>(
    outcome: std::result::Result<T, TransactionError<ArchiveError>>,
) -> Result<T> {
    match outcome {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(ArchiveError::Database(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossref;
    use crate::model::{DocNode, Provenance};
    use chrono::Utc;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.storage.db_path = dir.path().join("archive.db");
        config
    }

    fn provenance() -> Provenance {
        Provenance {
            adapter: "test".to_string(),
            source_url: "https://example.gov/doc.xml".to_string(),
            retrieved_at: Utc::now(),
        }
    }

    fn doc(citation: Citation, text: &str) -> CanonicalDocument {
        let mut section = DocNode::section(Some(citation.section.clone()), None);
        section
            .children
            .push(DocNode::leaf(Some("a".to_string()), text.to_string()));
        CanonicalDocument::new(citation, section, provenance()).unwrap()
    }

    async fn ingest(store: &ArchiveStore, citation: &str, text: &str) -> (Version, ChangeKind) {
        let citation = Citation::parse(citation).unwrap().without_as_of();
        let document = doc(citation.clone(), text);
        let edges = crossref::extract(&document.root, &citation);
        store.commit(&document, edges, None, false).await.unwrap()
    }

    #[tokio::test]
    async fn test_commit_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        let (version, change) = ingest(&store, "26 USC 32", "A credit is allowed.").await;
        assert_eq!(change, ChangeKind::Created);

        let fetched = store
            .get_as_of(&Citation::parse("26 USC 32").unwrap(), None)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, version.id);
        assert_eq!(fetched.content_hash, version.content_hash);
    }

    #[tokio::test]
    async fn test_idempotent_recommit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        let (first, _) = ingest(&store, "26 USC 32", "A credit is allowed.").await;
        let (second, change) = ingest(&store, "26 USC 32", "A credit is allowed.").await;
        assert_eq!(change, ChangeKind::Unchanged);
        assert_eq!(second.id, first.id);
        assert_eq!(store.stats().total_versions, 1);
    }

    #[tokio::test]
    async fn test_search_with_jurisdiction_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        ingest(&store, "DC 47-1806.03", "A tax on residents is imposed by this section.").await;
        ingest(&store, "26 USC 32", "An earned income credit is allowed.").await;

        let filters = SearchFilters {
            jurisdiction: Some("us-dc".to_string()),
            ..Default::default()
        };
        let hits = store.search("tax on residents", &filters).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version.citation.jurisdiction, "us-dc");
        assert!(hits[0].snippet.contains("tax on residents"));
    }

    #[tokio::test]
    async fn test_unresolved_edge_flips_on_target_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        ingest(&store, "26 USC 32", "A dependent under 26 USC 152 qualifies.").await;
        let citation_152 = Citation::parse("26 USC 152").unwrap();

        let incoming = store
            .walk_references(&citation_152, Direction::Incoming)
            .unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].state, ResolutionState::Unresolved);

        ingest(&store, "26 USC 152", "Dependent defined.").await;
        let incoming = store
            .walk_references(&citation_152, Direction::Incoming)
            .unwrap();
        assert!(matches!(
            incoming[0].state,
            ResolutionState::ResolvedInternal { .. }
        ));

        let outgoing = store
            .walk_references(&Citation::parse("26 USC 32").unwrap(), Direction::Outgoing)
            .unwrap();
        assert!(matches!(
            outgoing[0].state,
            ResolutionState::ResolvedInternal { .. }
        ));
    }

    #[tokio::test]
    async fn test_external_jurisdiction_edge() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        // No UK documents in the corpus: the edge resolves external.
        ingest(&store, "26 USC 32", "Compare UK ITA 6 for the UK charge.").await;
        let outgoing = store
            .walk_references(&Citation::parse("26 USC 32").unwrap(), Direction::Outgoing)
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].state, ResolutionState::ResolvedExternal);
    }

    #[tokio::test]
    async fn test_rebuild_index_restores_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(&test_config(&dir)).unwrap();

        ingest(&store, "26 USC 32", "An earned income credit is allowed.").await;
        store.postings.clear().unwrap();
        assert!(store
            .search("earned income credit", &SearchFilters::default())
            .unwrap()
            .is_empty());

        store.rebuild_index().unwrap();
        let hits = store
            .search("earned income credit", &SearchFilters::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_diverged_chain_tail_is_a_conflict() {
        let observed = vec![Uuid::new_v4()];
        let stored = vec![Uuid::new_v4()];

        let err = verify_chain_tail(&stored, &observed, "us/statute/26/32").unwrap_err();
        assert!(matches!(err, ArchiveError::VersionChainConflict { .. }));

        assert!(verify_chain_tail(&observed, &observed, "us/statute/26/32").is_ok());
        assert!(verify_chain_tail(&[], &[], "us/statute/26/32").is_ok());
    }
}
