//! # Canonical Document Model
//!
//! ## Purpose
//! The unified tree representation every source schema is normalized into:
//! recursive containers down to leaf sections/subsections with stable node
//! identifiers, used by every downstream component.
//!
//! ## Input/Output Specification
//! - **Input**: Normalized structure produced by format adapters
//! - **Output**: Validated trees with stable node IDs and content hashes
//! - **Lifecycle**: Produced transiently during ingestion; only Versions persist
//!
//! ## Key Features
//! - Container / Section / Leaf node kinds with enforced invariants
//! - Tabular content preserved as ordered rows of ordered cells
//! - Deterministic content hashing (structure + text + tables, never provenance)
//! - Stable node IDs derived from citation + subsection path

use crate::citation::Citation;
use crate::errors::{ArchiveError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier for a node: citation path plus subsection path,
/// independent of version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Root node ID for a citation
    pub fn for_citation(citation: &Citation) -> Self {
        NodeId(citation.chain_key())
    }

    /// Child node ID under this one
    pub fn child(&self, segment: &str) -> Self {
        NodeId(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node kinds in the canonical tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Pure grouping (Title/Chapter/Subchapter); carries no prose text
    Container,
    /// A numbered provision with heading and ordered children
    Section,
    /// Terminal prose, optionally with tabular data
    Leaf,
}

/// Structured tabular content: ordered rows of ordered cells.
///
/// Downstream parameter extraction depends on this structure staying intact,
/// so adapters must never flatten tables into prose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A cross-file inclusion directive found in a source document, keyed by
/// (file, fragment-id). Resolved by the transclusion resolver before commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeDirective {
    /// Source file the fragment lives in (href as written in the source)
    pub file: String,
    /// Fragment identifier within the file, if any
    pub fragment: Option<String>,
}

impl fmt::Display for IncludeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(frag) => write!(f, "{}#{}", self.file, frag),
            None => f.write_str(&self.file),
        }
    }
}

/// One node in the canonical document tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocNode {
    /// Stable node ID (citation + path, independent of version)
    pub id: NodeId,
    pub kind: NodeKind,
    /// Local identifier within the parent ("a", "1", "A")
    pub number: Option<String>,
    pub heading: Option<String>,
    /// Prose text directly on this node (empty for containers)
    pub text: String,
    /// Structured tabular content, if any
    pub table: Option<Table>,
    /// Unresolved inclusion directive; `None` after successful resolution
    pub include: Option<IncludeDirective>,
    pub children: Vec<DocNode>,
}

impl DocNode {
    pub fn container(heading: Option<String>) -> Self {
        Self {
            id: NodeId(String::new()),
            kind: NodeKind::Container,
            number: None,
            heading,
            text: String::new(),
            table: None,
            include: None,
            children: Vec::new(),
        }
    }

    pub fn section(number: Option<String>, heading: Option<String>) -> Self {
        Self {
            id: NodeId(String::new()),
            kind: NodeKind::Section,
            number,
            heading,
            text: String::new(),
            table: None,
            include: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(number: Option<String>, text: String) -> Self {
        Self {
            id: NodeId(String::new()),
            kind: NodeKind::Leaf,
            number,
            heading: None,
            text,
            table: None,
            include: None,
            children: Vec::new(),
        }
    }

    /// Placeholder emitted when an include target is missing at resolution
    /// time. Carries the directive so a later pass can retry.
    pub fn unresolved_include(directive: IncludeDirective) -> Self {
        Self {
            id: NodeId(String::new()),
            kind: NodeKind::Leaf,
            number: None,
            heading: None,
            text: String::new(),
            table: None,
            include: Some(directive),
            children: Vec::new(),
        }
    }

    /// Whether this node is an unresolved-include placeholder
    pub fn is_unresolved_include(&self) -> bool {
        self.include.is_some() && self.children.is_empty() && self.text.is_empty()
    }

    /// Find a descendant by subsection path segments (matched against `number`)
    pub fn node_at_path(&self, path: &[&str]) -> Option<&DocNode> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .children
                .iter()
                .find(|c| c.number.as_deref() == Some(*head))
                .and_then(|c| c.node_at_path(rest)),
        }
    }

    /// Depth-first iteration over this node and all descendants
    pub fn walk(&self) -> Vec<&DocNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }

    /// Concatenated prose text of the whole subtree, table cells included,
    /// in document order. Feeds the full-text index.
    pub fn collect_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for node in self.walk() {
            if let Some(heading) = &node.heading {
                parts.push(heading.clone());
            }
            if !node.text.is_empty() {
                parts.push(node.text.clone());
            }
            if let Some(table) = &node.table {
                for row in &table.rows {
                    parts.push(row.join(" "));
                }
            }
        }
        parts.join("\n")
    }

    /// Whether the subtree carries any prose or tabular content
    pub fn is_content_empty(&self) -> bool {
        self.walk().iter().all(|n| {
            n.text.trim().is_empty() && n.table.as_ref().map_or(true, |t| t.is_empty())
        })
    }

    /// Assign stable node IDs from the citation root down.
    ///
    /// Grouping wrappers and the main section node itself carry the citation
    /// path unchanged; numbered nodes below the section extend it, so a leaf
    /// at subsection (a)(1) of `26 USC 32` gets `us/statute/26/32/a/1`.
    pub fn assign_ids(&mut self, parent: &NodeId) {
        self.assign_ids_inner(parent, false);
    }

    fn assign_ids_inner(&mut self, parent: &NodeId, under_section: bool) {
        self.id = match (&self.number, under_section) {
            (Some(number), true) => parent.child(number),
            _ => parent.clone(),
        };
        let now_under = under_section || self.kind == NodeKind::Section;
        let own = self.id.clone();
        for child in &mut self.children {
            child.assign_ids_inner(&own, now_under);
        }
    }

    /// Feed the structural content of this subtree into a hasher.
    /// Provenance and node IDs are deliberately excluded so that re-fetching
    /// identical content hashes identically.
    fn hash_into(&self, hasher: &mut Sha256) {
        hasher.update([match self.kind {
            NodeKind::Container => 0u8,
            NodeKind::Section => 1,
            NodeKind::Leaf => 2,
        }]);
        hasher.update(self.number.as_deref().unwrap_or("").as_bytes());
        hasher.update([0xff]);
        hasher.update(self.heading.as_deref().unwrap_or("").as_bytes());
        hasher.update([0xff]);
        hasher.update(self.text.as_bytes());
        hasher.update([0xff]);
        if let Some(table) = &self.table {
            for row in &table.rows {
                for cell in row {
                    hasher.update(cell.as_bytes());
                    hasher.update([0xfe]);
                }
                hasher.update([0xfd]);
            }
        }
        hasher.update((self.children.len() as u64).to_le_bytes());
        for child in &self.children {
            child.hash_into(hasher);
        }
    }

    /// Hex content hash of this subtree
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        self.hash_into(&mut hasher);
        crate::utils::hex(&hasher.finalize())
    }
}

/// Source provenance for a normalized document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the adapter that produced the tree
    pub adapter: String,
    /// URL of the official source document
    pub source_url: String,
    /// When the raw document was retrieved
    pub retrieved_at: DateTime<Utc>,
}

/// A normalized statute/section document: a tree rooted at one node,
/// addressed by one citation. Never stored directly; only Versions persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub citation: Citation,
    pub root: DocNode,
    pub provenance: Provenance,
    /// Set when the source marks the provision repealed
    pub repealed: bool,
}

impl CanonicalDocument {
    /// Build a document, assigning stable node IDs and validating invariants.
    pub fn new(citation: Citation, mut root: DocNode, provenance: Provenance) -> Result<Self> {
        root.assign_ids(&NodeId::for_citation(&citation));
        let doc = Self {
            citation,
            root,
            provenance,
            repealed: false,
        };
        doc.validate()?;
        Ok(doc)
    }

    /// Mark the document as repealed
    pub fn mark_repealed(mut self) -> Self {
        self.repealed = true;
        self
    }

    /// Containers are pure grouping and must not carry prose text.
    pub fn validate(&self) -> Result<()> {
        for node in self.root.walk() {
            if node.kind == NodeKind::Container && !node.text.trim().is_empty() {
                return Err(ArchiveError::Internal {
                    message: format!("container node {} carries prose text", node.id),
                });
            }
        }
        Ok(())
    }

    /// Content hash over structure + text + tables, excluding provenance
    pub fn content_hash(&self) -> String {
        self.root.content_hash()
    }

    /// The main section node (first Section in document order), or the root
    /// when the tree has no section wrapper. Subsection paths resolve from
    /// here.
    pub fn section_root(&self) -> &DocNode {
        first_section(&self.root).unwrap_or(&self.root)
    }

    /// Resolve a subsection path against the section root
    pub fn node_at(&self, path: &[&str]) -> Option<&DocNode> {
        self.section_root().node_at_path(path)
    }
}

fn first_section(node: &DocNode) -> Option<&DocNode> {
    if node.kind == NodeKind::Section {
        return Some(node);
    }
    node.children.iter().find_map(first_section)
}
