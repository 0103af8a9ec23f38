//! # USLM Adapter
//!
//! ## Purpose
//! Normalizes federal US Code sections published in USLM (United States
//! Legislative Markup) XML by the Office of the Law Revision Counsel.
//!
//! ## Schema Notes
//! - Two namespace variants exist in the wild: `xml.house.gov/schemas/uslm`
//!   and `schemas.gpo.gov/xml/uslm`; both are claimed.
//! - Section identifiers look like `/us/usc/t26/s32`; subsection levels are
//!   `subsection`, `paragraph`, `subparagraph`, `clause`, `subclause`, `item`.
//! - Prose lives in `chapeau`, `content` and `continuation` elements; tables
//!   keep their row/cell markup.

use super::xml::{self, DocSignature, XmlElement};
use super::{clean_label, parse_table, FormatAdapter, RawDocument};
use crate::citation::Citation;
use crate::config::AdapterConfig;
use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, DocNode, NodeKind, Provenance};

const NS_HOUSE: &str = "xml.house.gov/schemas/uslm";
const NS_GPO: &str = "schemas.gpo.gov/xml/uslm";

/// Grouping elements mapped to Container nodes
const GROUPING: &[&str] = &[
    "title",
    "subtitle",
    "chapter",
    "subchapter",
    "part",
    "subpart",
    "division",
];

/// Subsection-level elements, outermost first
const LEVELS: &[&str] = &[
    "subsection",
    "paragraph",
    "subparagraph",
    "clause",
    "subclause",
    "item",
];

/// Prose-bearing elements that belong to the enclosing provision
const PROSE: &[&str] = &["chapeau", "content", "continuation", "text"];

pub struct UslmAdapter;

impl FormatAdapter for UslmAdapter {
    fn name(&self) -> &'static str {
        "uslm"
    }

    fn claims(&self, signature: &DocSignature) -> bool {
        signature.has_namespace(NS_HOUSE)
            || signature.has_namespace(NS_GPO)
            || signature.root_local == "uscDoc"
    }

    fn normalize(&self, raw: &RawDocument, config: &AdapterConfig) -> Result<CanonicalDocument> {
        let root = xml::parse_document(&raw.bytes, config.max_structural_depth)?;

        let (trail, section) = locate_section(&root).ok_or_else(|| ArchiveError::SchemaMismatch {
            adapter: "uslm".to_string(),
            details: "no <section> element found".to_string(),
        })?;
        if count_sections(&root) > 1 {
            return Err(ArchiveError::SchemaMismatch {
                adapter: "uslm".to_string(),
                details: "expected a single-section document".to_string(),
            });
        }

        let citation = citation_from_identifier(section, &root)?;
        let repealed = is_repealed(section);
        let section_node = build_provision(section, config)?;

        // Grouping ancestors become a Container chain above the section.
        let mut tree = section_node;
        for wrapper in trail.iter().rev() {
            let heading = wrapper
                .child("heading")
                .map(|h| h.text_content())
                .filter(|h| !h.is_empty());
            let mut container = DocNode::container(heading);
            container.children.push(tree);
            tree = container;
        }

        let provenance = Provenance {
            adapter: "uslm".to_string(),
            source_url: raw.source_url.clone(),
            retrieved_at: raw.retrieved_at,
        };
        let doc = CanonicalDocument::new(citation, tree, provenance)?;
        Ok(if repealed { doc.mark_repealed() } else { doc })
    }
}

/// Find the first section, collecting the grouping elements above it
fn locate_section<'a>(root: &'a XmlElement) -> Option<(Vec<&'a XmlElement>, &'a XmlElement)> {
    fn descend<'a>(
        element: &'a XmlElement,
        trail: &mut Vec<&'a XmlElement>,
    ) -> Option<&'a XmlElement> {
        for child in element.elements() {
            if child.local_name() == "section" {
                return Some(child);
            }
            let grouping = GROUPING.contains(&child.local_name());
            if grouping {
                trail.push(child);
            }
            if let Some(found) = descend(child, trail) {
                return Some(found);
            }
            if grouping {
                trail.pop();
            }
        }
        None
    }

    if root.local_name() == "section" {
        return Some((Vec::new(), root));
    }
    let mut trail = Vec::new();
    descend(root, &mut trail).map(|section| (trail, section))
}

fn count_sections(root: &XmlElement) -> usize {
    let own = usize::from(root.local_name() == "section");
    own + root.descendants("section").len()
}

/// Derive the citation from the USLM identifier (`/us/usc/t26/s32`), falling
/// back to `docNumber` + the section num value.
fn citation_from_identifier(section: &XmlElement, root: &XmlElement) -> Result<Citation> {
    if let Some(identifier) = section.attr("identifier") {
        let title = identifier.split("/t").nth(1).and_then(|s| s.split('/').next());
        let number = identifier.split("/s").nth(1).and_then(|s| s.split('/').next());
        if let (Some(title), Some(number)) = (title, number) {
            return Ok(Citation::new("us", title, number));
        }
    }

    let title = root
        .descendants("docNumber")
        .first()
        .map(|d| d.text_content());
    let number = section.child("num").map(num_value);
    match (title, number) {
        (Some(title), Some(number)) if !title.is_empty() && !number.is_empty() => {
            Ok(Citation::new("us", &title, &number))
        }
        _ => Err(ArchiveError::SchemaMismatch {
            adapter: "uslm".to_string(),
            details: "cannot derive citation from identifier or docNumber".to_string(),
        }),
    }
}

fn num_value(num: &XmlElement) -> String {
    match num.attr("value") {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => clean_label(&num.text_content()),
    }
}

fn is_repealed(section: &XmlElement) -> bool {
    if section
        .attr("status")
        .map(|s| s.contains("repealed"))
        .unwrap_or(false)
    {
        return true;
    }
    section
        .child("heading")
        .map(|h| h.text_content().starts_with("Repealed"))
        .unwrap_or(false)
}

/// Recursively map a provision element (section or subsection level) into a
/// canonical node. A malformed nested fragment degrades to a warning instead
/// of rejecting the document when configured to tolerate it.
fn build_provision(element: &XmlElement, config: &AdapterConfig) -> Result<DocNode> {
    let number = element.child("num").map(num_value).filter(|n| !n.is_empty());
    let heading = element
        .child("heading")
        .map(|h| h.text_content())
        .filter(|h| !h.is_empty());

    let text = element
        .elements()
        .filter(|c| PROSE.contains(&c.local_name()))
        .map(|c| c.text_excluding(&["table"]))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut children = Vec::new();
    for child in element.elements() {
        if LEVELS.contains(&child.local_name()) {
            match build_provision(child, config) {
                Ok(node) => children.push(node),
                Err(e) if config.tolerate_partial_fragments && !matches!(e, ArchiveError::StructuralDepthExceeded { .. }) => {
                    tracing::warn!(error = %e, "skipping malformed subsection fragment");
                }
                Err(e) => return Err(e),
            }
        }
    }

    let kind = if children.is_empty() && element.local_name() != "section" {
        NodeKind::Leaf
    } else {
        NodeKind::Section
    };

    let mut node = DocNode {
        id: crate::model::NodeId(String::new()),
        kind,
        number,
        heading,
        text,
        table: find_table(element).map(|t| parse_table(t)),
        include: None,
        children,
    };
    if node.table.as_ref().map_or(false, |t| t.is_empty()) {
        node.table = None;
    }
    Ok(node)
}

/// First table inside this provision's own prose, not inside nested levels
fn find_table(element: &XmlElement) -> Option<&XmlElement> {
    for child in element.elements() {
        if LEVELS.contains(&child.local_name()) {
            continue;
        }
        if child.local_name() == "table" {
            return Some(child);
        }
        if let Some(table) = find_table(child) {
            return Some(table);
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_SECTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<uscDoc xmlns="http://xml.house.gov/schemas/uslm/1.0">
  <main>
    <title identifier="/us/usc/t26">
      <heading>Internal Revenue Code</heading>
      <chapter identifier="/us/usc/t26/ch1">
        <heading>Normal Taxes and Surtaxes</heading>
        <section identifier="/us/usc/t26/s32">
          <num value="32">&#167; 32.</num>
          <heading>Earned income</heading>
          <subsection identifier="/us/usc/t26/s32/a">
            <num value="a">(a)</num>
            <heading>Allowance of credit</heading>
            <content>In the case of an eligible individual, there shall be allowed a credit.</content>
          </subsection>
          <subsection identifier="/us/usc/t26/s32/b">
            <num value="b">(b)</num>
            <heading>Percentages and amounts</heading>
            <paragraph identifier="/us/usc/t26/s32/b/2">
              <num value="2">(2)</num>
              <subparagraph identifier="/us/usc/t26/s32/b/2/A">
                <num value="A">(A)</num>
                <content>The credit amount is determined under the following table:
                  <table>
                    <tr><td>Earned income</td><td>Credit percentage</td></tr>
                    <tr><td>Not over $7,000</td><td>34 percent</td></tr>
                  </table>
                </content>
              </subparagraph>
            </paragraph>
          </subsection>
        </section>
      </chapter>
    </title>
  </main>
</uscDoc>"#;

    fn normalize_sample() -> CanonicalDocument {
        let raw = RawDocument::new(
            SAMPLE_SECTION.as_bytes().to_vec(),
            "https://uscode.house.gov/usc26.xml",
        );
        UslmAdapter
            .normalize(&raw, &AdapterConfig::default())
            .unwrap()
    }

    #[test]
    fn test_citation_from_identifier() {
        let doc = normalize_sample();
        assert_eq!(doc.citation, Citation::new("us", "26", "32"));
    }

    #[test]
    fn test_container_chain() {
        let doc = normalize_sample();
        assert_eq!(doc.root.kind, NodeKind::Container);
        assert_eq!(doc.root.heading.as_deref(), Some("Internal Revenue Code"));
        let section = doc.section_root();
        assert_eq!(section.number.as_deref(), Some("32"));
        assert_eq!(section.id.as_str(), "us/statute/26/32");
    }

    #[test]
    fn test_nested_subsection_with_table() {
        let doc = normalize_sample();
        let leaf = doc.node_at(&["b", "2", "A"]).expect("leaf at (b)(2)(A)");
        assert_eq!(leaf.kind, NodeKind::Leaf);
        assert_eq!(leaf.id.as_str(), "us/statute/26/32/b/2/A");
        let table = leaf.table.as_ref().expect("table preserved");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][1], "34 percent");
        // Table cells are not flattened into the prose.
        assert!(!leaf.text.contains("34 percent"));
    }

    #[test]
    fn test_multi_section_rejected() {
        let xml = r#"<uscDoc xmlns="http://xml.house.gov/schemas/uslm/1.0">
            <section identifier="/us/usc/t26/s1"><num value="1"/></section>
            <section identifier="/us/usc/t26/s2"><num value="2"/></section>
        </uscDoc>"#;
        let raw = RawDocument::new(xml.as_bytes().to_vec(), "https://x");
        assert!(matches!(
            UslmAdapter.normalize(&raw, &AdapterConfig::default()),
            Err(ArchiveError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_repealed_detection() {
        let xml = r#"<uscDoc xmlns="http://xml.house.gov/schemas/uslm/1.0">
            <section identifier="/us/usc/t26/s999" status="repealed">
                <num value="999"/>
                <heading>Repealed. Pub. L. 94-455</heading>
            </section>
        </uscDoc>"#;
        let raw = RawDocument::new(xml.as_bytes().to_vec(), "https://x");
        let doc = UslmAdapter.normalize(&raw, &AdapterConfig::default()).unwrap();
        assert!(doc.repealed);
    }
}
