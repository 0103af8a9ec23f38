//! # Transclusion Resolver
//!
//! ## Purpose
//! Materializes cross-file include directives (DC Code XInclude) before a
//! document is committed. The fetch layer registers companion fragments in a
//! [`SourceGraph`]; the resolver splices them into the canonical tree.
//!
//! ## Input/Output Specification
//! - **Input**: A normalized document whose tree may contain include
//!   placeholders, plus the fragment graph for its source batch
//! - **Output**: The document with includes expanded, node IDs reassigned,
//!   and a warning per include whose target is missing
//!
//! ## Key Features
//! - Recursive expansion: included fragments may themselves include
//! - Cycle detection via the active expansion stack; a cycle rejects the
//!   whole document before anything is committed
//! - Missing targets degrade to placeholder leaves, never to silent drops

use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, DocNode, IncludeDirective};
use std::collections::HashMap;
use std::fmt;

/// Identity of an includable fragment: source file plus optional fragment id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub file: String,
    pub fragment: Option<String>,
}

impl From<&IncludeDirective> for FragmentKey {
    fn from(directive: &IncludeDirective) -> Self {
        Self {
            file: directive.file.trim_start_matches("./").to_string(),
            fragment: directive.fragment.clone(),
        }
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(frag) => write!(f, "{}#{}", self.file, frag),
            None => f.write_str(&self.file),
        }
    }
}

/// An include whose target was absent from the graph. The placeholder leaf
/// stays in the tree carrying the directive for a later retry.
#[derive(Debug, Clone)]
pub struct IncludeWarning {
    pub directive: IncludeDirective,
}

impl fmt::Display for IncludeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "include target '{}' not available", self.directive)
    }
}

/// Fragments available for inclusion, keyed by (file, fragment). Populated by
/// the caller from the companion files fetched alongside a document.
#[derive(Debug, Default)]
pub struct SourceGraph {
    fragments: HashMap<FragmentKey, DocNode>,
}

impl SourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment subtree under a source file and optional fragment id
    pub fn register(&mut self, file: &str, fragment: Option<&str>, node: DocNode) {
        let key = FragmentKey {
            file: file.trim_start_matches("./").to_string(),
            fragment: fragment.map(|f| f.to_string()),
        };
        self.fragments.insert(key, node);
    }

    pub fn fragment(&self, key: &FragmentKey) -> Option<&DocNode> {
        self.fragments.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Expand every include placeholder in the document against the graph.
///
/// Node IDs are reassigned after expansion so spliced subtrees pick up stable
/// IDs under their new citation path.
pub fn resolve(
    doc: CanonicalDocument,
    graph: &SourceGraph,
) -> Result<(CanonicalDocument, Vec<IncludeWarning>)> {
    let mut warnings = Vec::new();
    let mut root = doc.root;
    let mut stack = Vec::new();
    expand_children(&mut root, graph, &mut stack, &mut warnings)?;

    let repealed = doc.repealed;
    let resolved = CanonicalDocument::new(doc.citation, root, doc.provenance)?;
    for warning in &warnings {
        tracing::warn!(target = %warning.directive, "include target missing, keeping placeholder");
    }
    Ok((
        if repealed { resolved.mark_repealed() } else { resolved },
        warnings,
    ))
}

fn expand_children(
    node: &mut DocNode,
    graph: &SourceGraph,
    stack: &mut Vec<FragmentKey>,
    warnings: &mut Vec<IncludeWarning>,
) -> Result<()> {
    let children = std::mem::take(&mut node.children);
    let mut expanded = Vec::with_capacity(children.len());

    for mut child in children {
        if child.is_unresolved_include() {
            // is_unresolved_include guarantees the directive is present
            let directive = match child.include.clone() {
                Some(d) => d,
                None => continue,
            };
            let key = FragmentKey::from(&directive);
            if stack.contains(&key) {
                let mut chain: Vec<String> = stack.iter().map(|k| k.to_string()).collect();
                chain.push(key.to_string());
                return Err(ArchiveError::CircularInclude { chain });
            }
            match graph.fragment(&key) {
                Some(fragment) => {
                    let mut fragment = fragment.clone();
                    stack.push(key);
                    expand_children(&mut fragment, graph, stack, warnings)?;
                    stack.pop();
                    expanded.push(fragment);
                }
                None => {
                    warnings.push(IncludeWarning { directive });
                    expanded.push(child);
                }
            }
        } else {
            expand_children(&mut child, graph, stack, warnings)?;
            expanded.push(child);
        }
    }

    node.children = expanded;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::Citation;
    use crate::model::{NodeKind, Provenance};
    use chrono::Utc;

    fn provenance() -> Provenance {
        Provenance {
            adapter: "dc-code".to_string(),
            source_url: "https://example.gov/4-205.11.xml".to_string(),
            retrieved_at: Utc::now(),
        }
    }

    fn doc_with_include(file: &str, fragment: Option<&str>) -> CanonicalDocument {
        let mut section = DocNode::section(Some("205.11".to_string()), None);
        section.text = "Eligibility standards shall be established as follows:".to_string();
        section.children.push(DocNode::unresolved_include(IncludeDirective {
            file: file.to_string(),
            fragment: fragment.map(|f| f.to_string()),
        }));
        CanonicalDocument::new(Citation::new("us-dc", "4", "205.11"), section, provenance()).unwrap()
    }

    #[test]
    fn test_include_expanded_with_ids() {
        let mut graph = SourceGraph::new();
        graph.register(
            "4-205.11a.xml",
            Some("standards"),
            DocNode::leaf(Some("a".to_string()), "The standards are those of 1981.".to_string()),
        );

        let doc = doc_with_include("./4-205.11a.xml", Some("standards"));
        let (resolved, warnings) = resolve(doc, &graph).unwrap();
        assert!(warnings.is_empty());

        let spliced = resolved.node_at(&["a"]).expect("spliced fragment");
        assert_eq!(spliced.kind, NodeKind::Leaf);
        assert!(spliced.include.is_none());
        assert_eq!(spliced.id.as_str(), "us-dc/statute/4/205.11/a");
    }

    #[test]
    fn test_missing_target_keeps_placeholder() {
        let doc = doc_with_include("4-205.11b.xml", None);
        let (resolved, warnings) = resolve(doc, &SourceGraph::new()).unwrap();
        assert_eq!(warnings.len(), 1);
        let placeholder = &resolved.section_root().children[0];
        assert!(placeholder.is_unresolved_include());
    }

    #[test]
    fn test_nested_includes_expand() {
        let mut inner_parent = DocNode::section(Some("a".to_string()), None);
        inner_parent.children.push(DocNode::unresolved_include(IncludeDirective {
            file: "deep.xml".to_string(),
            fragment: None,
        }));
        let mut graph = SourceGraph::new();
        graph.register("outer.xml", None, inner_parent);
        graph.register(
            "deep.xml",
            None,
            DocNode::leaf(Some("1".to_string()), "Deep fragment text.".to_string()),
        );

        let doc = doc_with_include("outer.xml", None);
        let (resolved, warnings) = resolve(doc, &graph).unwrap();
        assert!(warnings.is_empty());
        let deep = resolved.node_at(&["a", "1"]).expect("nested fragment");
        assert!(deep.text.contains("Deep fragment"));
    }

    #[test]
    fn test_cycle_rejected() {
        // a includes b, b includes a
        let mut frag_a = DocNode::section(Some("a".to_string()), None);
        frag_a.children.push(DocNode::unresolved_include(IncludeDirective {
            file: "b.xml".to_string(),
            fragment: None,
        }));
        let mut frag_b = DocNode::section(Some("b".to_string()), None);
        frag_b.children.push(DocNode::unresolved_include(IncludeDirective {
            file: "a.xml".to_string(),
            fragment: None,
        }));
        let mut graph = SourceGraph::new();
        graph.register("a.xml", None, frag_a);
        graph.register("b.xml", None, frag_b);

        let doc = doc_with_include("a.xml", None);
        let err = resolve(doc, &graph).unwrap_err();
        match err {
            ArchiveError::CircularInclude { chain } => {
                assert!(chain.len() >= 3);
                assert_eq!(chain.first(), Some(&"a.xml".to_string()));
                assert_eq!(chain.last(), Some(&"a.xml".to_string()));
            }
            other => panic!("expected CircularInclude, got {other}"),
        }
    }
}
