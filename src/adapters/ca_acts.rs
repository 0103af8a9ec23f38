//! # Canada Acts Adapter
//!
//! ## Purpose
//! Normalizes consolidated federal Canadian acts published by Justice Canada
//! in the LIMS XML schema.
//!
//! ## Schema Notes
//! - `<Statute>`/`<Act>` root; elements carry `lims:` attributes from the
//!   `justice.gc.ca/lims` namespace
//! - `<Section>` → `<Subsection>` → `<Paragraph>` → `<Subparagraph>` →
//!   `<Clause>`, each with a `<Label>` and `<Text>`; `<MarginalNote>` is the
//!   section heading
//! - The act identifier comes from `<ConsolidatedNumber>` ("I-3.3" for the
//!   Income Tax Act), falling back to the `<Chapter>` text

use super::xml::{self, DocSignature, XmlElement};
use super::{clean_label, parse_table, FormatAdapter, RawDocument};
use crate::citation::Citation;
use crate::config::AdapterConfig;
use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, DocNode, NodeKind, Provenance};

const NS_LIMS: &str = "justice.gc.ca/lims";

/// Provision levels below Section, outermost first
const LEVELS: &[&str] = &["Subsection", "Paragraph", "Subparagraph", "Clause", "Subclause"];

pub struct CanadaActsAdapter;

impl FormatAdapter for CanadaActsAdapter {
    fn name(&self) -> &'static str {
        "ca-acts"
    }

    fn claims(&self, signature: &DocSignature) -> bool {
        signature.has_namespace(NS_LIMS)
            || signature.root_local == "Statute"
            || signature.root_local == "Act"
    }

    fn normalize(&self, raw: &RawDocument, config: &AdapterConfig) -> Result<CanonicalDocument> {
        let root = xml::parse_document(&raw.bytes, config.max_structural_depth)?;

        let sections = root.descendants("Section");
        let section = match sections.as_slice() {
            [only] => *only,
            [] => {
                return Err(ArchiveError::SchemaMismatch {
                    adapter: "ca-acts".to_string(),
                    details: "no <Section> element found".to_string(),
                })
            }
            _ => {
                return Err(ArchiveError::SchemaMismatch {
                    adapter: "ca-acts".to_string(),
                    details: "expected a single-section document".to_string(),
                })
            }
        };

        let title_id = act_identifier(&root)?;
        let number = section
            .child("Label")
            .map(|l| clean_label(&l.text_content()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ArchiveError::SchemaMismatch {
                adapter: "ca-acts".to_string(),
                details: "Section has no <Label>".to_string(),
            })?;
        let citation = Citation::new("ca", &title_id, &number);

        let repealed = section
            .attr("lims:inforce")
            .map(|v| v == "repealed")
            .unwrap_or(false)
            || section
                .child("MarginalNote")
                .map(|m| m.text_content().starts_with("Repealed"))
                .unwrap_or(false);

        let section_node = build_provision(section, true);
        let provenance = Provenance {
            adapter: "ca-acts".to_string(),
            source_url: raw.source_url.clone(),
            retrieved_at: raw.retrieved_at,
        };
        let doc = CanonicalDocument::new(citation, section_node, provenance)?;
        Ok(if repealed { doc.mark_repealed() } else { doc })
    }
}

fn act_identifier(root: &XmlElement) -> Result<String> {
    let consolidated = root
        .descendants("ConsolidatedNumber")
        .first()
        .map(|c| c.text_content())
        .filter(|c| !c.is_empty());
    let chapter = root
        .descendants("Chapter")
        .first()
        .map(|c| c.text_excluding(&["ConsolidatedNumber"]))
        .filter(|c| !c.is_empty());
    consolidated
        .or(chapter)
        .ok_or_else(|| ArchiveError::SchemaMismatch {
            adapter: "ca-acts".to_string(),
            details: "missing <ConsolidatedNumber> / <Chapter> identification".to_string(),
        })
}

fn build_provision(element: &XmlElement, is_section: bool) -> DocNode {
    let number = element
        .child("Label")
        .map(|l| clean_label(&l.text_content()))
        .filter(|n| !n.is_empty());
    let heading = element
        .child("MarginalNote")
        .map(|m| m.text_content())
        .filter(|h| !h.is_empty());

    let text = element
        .children_named("Text")
        .map(|t| t.text_excluding(&["TableGroup", "table"]))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let children: Vec<DocNode> = element
        .elements()
        .filter(|c| LEVELS.contains(&c.local_name()))
        .map(|c| build_provision(c, false))
        .collect();

    let kind = if is_section || !children.is_empty() {
        NodeKind::Section
    } else {
        NodeKind::Leaf
    };

    let mut node = DocNode {
        id: crate::model::NodeId(String::new()),
        kind,
        number,
        heading,
        text,
        table: find_table(element).map(parse_table),
        include: None,
        children,
    };
    if node.table.as_ref().map_or(false, |t| t.is_empty()) {
        node.table = None;
    }
    node
}

/// First table in this provision's own markup, not inside nested levels
fn find_table(element: &XmlElement) -> Option<&XmlElement> {
    for child in element.elements() {
        if LEVELS.contains(&child.local_name()) {
            continue;
        }
        if matches!(child.local_name(), "TableGroup" | "table") {
            return Some(child);
        }
        if let Some(table) = find_table(child) {
            return Some(table);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SECTION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Statute xmlns:lims="http://justice.gc.ca/lims">
  <Identification>
    <Chapter><ConsolidatedNumber official="yes">I-3.3</ConsolidatedNumber></Chapter>
    <ShortTitle>Income Tax Act</ShortTitle>
  </Identification>
  <Body>
    <Section>
      <MarginalNote>Tax payable by persons resident in Canada</MarginalNote>
      <Label>2</Label>
      <Subsection>
        <Label>(1)</Label>
        <Text>An income tax shall be paid, as required by this Act, on the taxable income for each taxation year of every person resident in Canada.</Text>
      </Subsection>
      <Subsection>
        <Label>(2)</Label>
        <Text>The taxable income of a taxpayer for a taxation year is the taxpayer's income for the year plus the additions and minus the deductions permitted by Division C.</Text>
      </Subsection>
    </Section>
  </Body>
</Statute>"#;

    fn normalize_sample() -> CanonicalDocument {
        let raw = RawDocument::new(
            SAMPLE_SECTION.as_bytes().to_vec(),
            "https://laws-lois.justice.gc.ca/eng/acts/I-3.3/section-2.xml",
        );
        CanadaActsAdapter
            .normalize(&raw, &AdapterConfig::default())
            .unwrap()
    }

    #[test]
    fn test_citation_from_consolidated_number() {
        let doc = normalize_sample();
        assert_eq!(doc.citation, Citation::new("ca", "I-3.3", "2"));
    }

    #[test]
    fn test_marginal_note_is_heading() {
        let doc = normalize_sample();
        let section = doc.section_root();
        assert_eq!(
            section.heading.as_deref(),
            Some("Tax payable by persons resident in Canada")
        );
        assert_eq!(section.children.len(), 2);
    }

    #[test]
    fn test_subsection_labels_cleaned() {
        let doc = normalize_sample();
        let sub = doc.node_at(&["1"]).expect("subsection (1)");
        assert_eq!(sub.kind, NodeKind::Leaf);
        assert!(sub.text.contains("income tax shall be paid"));
        assert_eq!(sub.id.as_str(), "ca/statute/I-3.3/2/1");
    }

    #[test]
    fn test_multi_section_rejected() {
        let xml = r#"<Statute xmlns:lims="http://justice.gc.ca/lims">
            <Body>
                <Section><Label>1</Label></Section>
                <Section><Label>2</Label></Section>
            </Body>
        </Statute>"#;
        let raw = RawDocument::new(xml.as_bytes().to_vec(), "https://x");
        assert!(matches!(
            CanadaActsAdapter.normalize(&raw, &AdapterConfig::default()),
            Err(ArchiveError::SchemaMismatch { .. })
        ));
    }
}
