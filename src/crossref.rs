//! # Cross-Reference Extractor
//!
//! ## Purpose
//! Scans canonical document trees for citation-shaped text spans and turns
//! them into directed reference-graph edges. Extraction is a pure function
//! over the tree; resolution against the corpus happens in the storage
//! engine, which re-attempts unresolved edges whenever their target citation
//! is later ingested.
//!
//! ## Input/Output Specification
//! - **Input**: A document tree plus its own citation
//! - **Output**: [`CrossReference`] edges (source node ID → target citation)
//!   with the literal span that produced each edge
//!
//! ## Key Features
//! - Reuses the citation grammars; no separate detection heuristics
//! - Same-section targets are internal cross-references, others citations
//! - One edge per (source node, span); repeated mentions collapse

use crate::citation::Citation;
use crate::model::{DocNode, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Relation carried by a reference edge.
///
/// The extractor only emits `Cites` and `InternalCrossReference`; the richer
/// kinds are assigned by regulatory and guidance sources that state their
/// relation explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Cites,
    InternalCrossReference,
    Implements,
    Interprets,
    Modifies,
}

/// Resolution state of an edge against the corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionState {
    /// Target citation exists in the corpus
    ResolvedInternal { target_node: NodeId },
    /// Target jurisdiction is not tracked by this corpus
    ResolvedExternal,
    /// Target not found yet; retried when the target citation is ingested
    Unresolved,
}

/// Traversal direction for reference-graph walks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A directed edge from a node's text to a cited provision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReference {
    pub source_node: NodeId,
    pub target: Citation,
    pub relation: RelationKind,
    pub state: ResolutionState,
    /// The literal text span that produced this edge
    pub span_text: String,
}

// Unanchored scan forms of the citation grammars. Candidate spans are then
// confirmed by the real parser, so these only need to over-approximate.
static SCAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \d+\s*U\.?\s?S\.?\s?C\.?\s*(?:§\s*)?[0-9]+[0-9A-Za-z.\-]*(?:\([0-9A-Za-z]+\))*
        | (?:DC|D\.C\.)\s+\d+-[0-9A-Za-z.]+(?:\([0-9A-Za-z]+\))*
        | (?:CAL|CAN|UK)\s+[A-Za-z0-9]+\s+[0-9][0-9A-Za-z.]*(?:\([0-9A-Za-z]+\))*
        ",
    )
    .expect("valid citation scan regex")
});

/// Extract every citation-shaped span from the tree's prose.
///
/// Pure over the tree; resolution state starts `Unresolved` throughout and is
/// settled by the storage engine at commit time.
pub fn extract(root: &DocNode, own: &Citation) -> Vec<CrossReference> {
    let own_chain = own.chain_key();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut edges = Vec::new();

    for node in root.walk() {
        if node.text.is_empty() {
            continue;
        }
        for span in SCAN_RE.find_iter(&node.text) {
            let span_text = span.as_str().trim_end_matches(['.', ',', ';']).to_string();
            let target = match Citation::parse(&span_text) {
                Ok(citation) => citation.without_as_of(),
                // over-approximated span the real grammar rejects
                Err(_) => continue,
            };
            if !seen.insert((node.id.as_str().to_string(), span_text.clone())) {
                continue;
            }
            let relation = if target.chain_key() == own_chain {
                RelationKind::InternalCrossReference
            } else {
                RelationKind::Cites
            };
            edges.push(CrossReference {
                source_node: node.id.clone(),
                target,
                relation,
                state: ResolutionState::Unresolved,
                span_text,
            });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocNode;

    fn tree_with_text(text: &str) -> DocNode {
        let mut section = DocNode::section(Some("32".to_string()), None);
        let mut leaf = DocNode::leaf(Some("a".to_string()), text.to_string());
        leaf.id = NodeId("us/statute/26/32/a".to_string());
        section.id = NodeId("us/statute/26/32".to_string());
        section.children.push(leaf);
        section
    }

    #[test]
    fn test_extract_federal_citation() {
        let root = tree_with_text("as defined in 26 USC 152(a), a dependent is eligible.");
        let edges = extract(&root, &Citation::new("us", "26", "32"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target.chain_key(), "us/statute/26/152");
        assert_eq!(edges[0].target.subsection_path, vec!["a"]);
        assert_eq!(edges[0].relation, RelationKind::Cites);
        assert_eq!(edges[0].state, ResolutionState::Unresolved);
        assert_eq!(edges[0].span_text, "26 USC 152(a)");
    }

    #[test]
    fn test_internal_reference_detected() {
        let root = tree_with_text("subject to 26 USC 32(b), the credit applies.");
        let edges = extract(&root, &Citation::new("us", "26", "32"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation, RelationKind::InternalCrossReference);
    }

    #[test]
    fn test_extract_dc_and_prefixed_forms() {
        let root = tree_with_text(
            "see DC 47-1806.03(a) and UK ITA 6 for the comparable provisions.",
        );
        let edges = extract(&root, &Citation::new("us", "26", "32"));
        let targets: Vec<String> = edges.iter().map(|e| e.target.chain_key()).collect();
        assert!(targets.contains(&"us-dc/statute/47/1806.03".to_string()));
        assert!(targets.contains(&"uk/statute/ITA/6".to_string()));
    }

    #[test]
    fn test_repeated_mentions_collapse() {
        let root = tree_with_text("26 USC 152 applies; 26 USC 152 governs the definition.");
        let edges = extract(&root, &Citation::new("us", "26", "32"));
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        let root = tree_with_text("No citation-shaped content appears in this sentence.");
        assert!(extract(&root, &Citation::new("us", "26", "32")).is_empty());
    }
}
