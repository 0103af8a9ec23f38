//! # Version/Diff Engine
//!
//! ## Purpose
//! Immutable version records for each citation and the diff logic that
//! decides, on ingestion, whether a new version is created and with which
//! change kind. Versions are never mutated or deleted once committed; legal
//! history must be retained.
//!
//! ## Input/Output Specification
//! - **Input**: A normalized document plus the latest stored version (if any)
//! - **Output**: A [`CommitPlan`]: reuse the latest version unchanged, or
//!   append a new chained version
//!
//! ## Key Features
//! - Content-hash driven idempotence: byte-identical re-ingestion is a no-op
//! - Change kinds: created / amended / repealed / unchanged / correction
//! - Best-effort lineage across renumbering: a renumbered node whose content
//!   matches a retired node inherits the retired node's stable ID

use crate::citation::Citation;
use crate::model::{CanonicalDocument, DocNode, NodeId, Provenance};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// What changed between a version and its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// First version for this citation
    Created,
    /// Content differs from the parent version
    Amended,
    /// The provision was repealed or its content removed
    Repealed,
    /// Content hash matches the latest version; no version was written
    Unchanged,
    /// An explicit correction of previously archived content
    Correction,
}

/// An immutable snapshot of one citation's content at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub citation: Citation,
    /// Position in the citation's chain, starting at 1
    pub sequence: u64,
    pub retrieved_at: DateTime<Utc>,
    /// Legal effective date when the source states one
    pub effective_date: Option<NaiveDate>,
    /// Hash over structure + text + tables, excluding provenance
    pub content_hash: String,
    /// Parent version in the chain; `None` for the first
    pub parent: Option<Uuid>,
    pub change: ChangeKind,
    pub root: DocNode,
    pub provenance: Provenance,
}

impl Version {
    /// Date used for point-in-time ordering: the effective date when the
    /// source states one, otherwise the retrieval date.
    pub fn ordering_date(&self) -> NaiveDate {
        self.effective_date
            .unwrap_or_else(|| self.retrieved_at.date_naive())
    }
}

/// Outcome of diffing a normalized document against the latest version
#[derive(Debug)]
pub enum CommitPlan {
    /// Hash matches the latest version; return it untouched
    Unchanged,
    /// Append this new version to the chain
    Append(Box<Version>),
}

/// Diff a normalized document against the latest stored version and plan the
/// commit. Pure; the storage engine applies the plan transactionally.
pub fn plan_commit(
    previous: Option<&Version>,
    doc: &CanonicalDocument,
    effective_date: Option<NaiveDate>,
    correction: bool,
) -> CommitPlan {
    let content_hash = doc.content_hash();

    if let Some(prev) = previous {
        if prev.content_hash == content_hash {
            return CommitPlan::Unchanged;
        }
    }

    let change = match previous {
        None => ChangeKind::Created,
        Some(_) if correction => ChangeKind::Correction,
        Some(_) if doc.repealed || doc.root.is_content_empty() => ChangeKind::Repealed,
        Some(_) => ChangeKind::Amended,
    };

    let mut root = doc.root.clone();
    if let Some(prev) = previous {
        carry_node_ids(&mut root, &prev.root);
    }

    CommitPlan::Append(Box::new(Version {
        id: Uuid::new_v4(),
        citation: doc.citation.clone(),
        sequence: previous.map(|p| p.sequence + 1).unwrap_or(1),
        retrieved_at: doc.provenance.retrieved_at,
        effective_date,
        content_hash,
        parent: previous.map(|p| p.id),
        change,
        root,
        provenance: doc.provenance.clone(),
    }))
}

/// Preserve stable node IDs across renumbering where possible.
///
/// Nodes whose citation+path survives keep their ID automatically. For the
/// rest, a new node whose content (ignoring its own label) matches exactly
/// one retired node inherits that node's ID, so a renumbered subsection is a
/// move rather than a delete+create. Content that changed along with its
/// label defeats the heuristic and mints a fresh ID; that false negative is
/// accepted rather than guessed around.
fn carry_node_ids(new_root: &mut DocNode, old_root: &DocNode) {
    let old_ids: HashSet<&str> = old_root.walk().iter().map(|n| n.id.as_str()).collect();
    let new_ids: HashSet<String> = new_root
        .walk()
        .iter()
        .map(|n| n.id.as_str().to_string())
        .collect();

    // Retired old nodes indexed by label-independent content hash; an
    // ambiguous hash (two retired twins) is dropped rather than guessed.
    let mut retired: HashMap<String, Option<NodeId>> = HashMap::new();
    for node in old_root.walk() {
        if new_ids.contains(node.id.as_str()) {
            continue;
        }
        retired
            .entry(lineage_hash(node))
            .and_modify(|slot| *slot = None)
            .or_insert_with(|| Some(node.id.clone()));
    }
    if retired.is_empty() {
        return;
    }

    for_each_mut(new_root, &mut |node| {
        if old_ids.contains(node.id.as_str()) {
            return;
        }
        if let Some(Some(old_id)) = retired.get(&lineage_hash(node)) {
            node.id = old_id.clone();
        }
    });
}

/// Subtree content hash with the node's own label blanked, so a pure
/// renumbering hashes identically.
fn lineage_hash(node: &DocNode) -> String {
    let mut probe = node.clone();
    probe.number = None;
    probe.content_hash()
}

fn for_each_mut(node: &mut DocNode, f: &mut impl FnMut(&mut DocNode)) {
    f(node);
    for child in &mut node.children {
        for_each_mut(child, f);
    }
}
