//! # CLML Adapter
//!
//! ## Purpose
//! Normalizes UK legislation published by legislation.gov.uk in CLML (Crown
//! Legislation Markup Language).
//!
//! ## Schema Notes
//! - `<Legislation>` root with the `legislation.gov.uk` namespaces
//! - `<P1>` elements are sections, `<P2>`/`<P3>`/... nested provisions; each
//!   carries a `<Pnumber>` label and a `<PNpara>` wrapper holding `<Text>`
//! - The act is identified by `ukm:Year` + `ukm:Number` metadata; the derived
//!   title identifier is `{year}c{number}` ("2007c3" for 2007 chapter 3)

use super::xml::{self, DocSignature, XmlElement};
use super::{clean_label, parse_table, FormatAdapter, RawDocument};
use crate::citation::Citation;
use crate::config::AdapterConfig;
use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, DocNode, NodeKind, Provenance};

const NS_LEG: &str = "legislation.gov.uk/namespaces/legislation";

pub struct ClmlAdapter;

impl FormatAdapter for ClmlAdapter {
    fn name(&self) -> &'static str {
        "clml"
    }

    fn claims(&self, signature: &DocSignature) -> bool {
        signature.has_namespace(NS_LEG) || signature.root_local == "Legislation"
    }

    fn normalize(&self, raw: &RawDocument, config: &AdapterConfig) -> Result<CanonicalDocument> {
        let root = xml::parse_document(&raw.bytes, config.max_structural_depth)?;

        let sections = root.descendants("P1");
        let p1 = match sections.as_slice() {
            [only] => *only,
            [] => {
                return Err(ArchiveError::SchemaMismatch {
                    adapter: "clml".to_string(),
                    details: "no <P1> section found".to_string(),
                })
            }
            _ => {
                return Err(ArchiveError::SchemaMismatch {
                    adapter: "clml".to_string(),
                    details: "expected a single-section document".to_string(),
                })
            }
        };

        let title_id = act_identifier(&root)?;
        let number = p1
            .child("Pnumber")
            .map(|n| clean_label(&n.text_content()))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ArchiveError::SchemaMismatch {
                adapter: "clml".to_string(),
                details: "P1 has no Pnumber".to_string(),
            })?;
        let citation = Citation::new("uk", &title_id, &number);

        // The P1group Title is the section heading.
        let heading = root
            .descendants("P1group")
            .first()
            .and_then(|g| g.child("Title"))
            .map(|t| t.text_content());
        let repealed = heading
            .as_deref()
            .map(|h| h.to_lowercase().contains("(repealed)"))
            .unwrap_or(false);

        let mut section = build_provision(p1, true);
        section.heading = heading;

        let provenance = Provenance {
            adapter: "clml".to_string(),
            source_url: raw.source_url.clone(),
            retrieved_at: raw.retrieved_at,
        };
        let doc = CanonicalDocument::new(citation, section, provenance)?;
        Ok(if repealed { doc.mark_repealed() } else { doc })
    }
}

/// `ukm:Year Value="2007"` + `ukm:Number Value="3"` → "2007c3"
fn act_identifier(root: &XmlElement) -> Result<String> {
    let year = root
        .descendants("Year")
        .first()
        .and_then(|y| y.attr("Value"))
        .map(|v| v.to_string());
    let number = root
        .descendants("Number")
        .first()
        .and_then(|n| n.attr("Value"))
        .map(|v| v.to_string());
    match (year, number) {
        (Some(year), Some(number)) => Ok(format!("{}c{}", year, number)),
        _ => Err(ArchiveError::SchemaMismatch {
            adapter: "clml".to_string(),
            details: "missing ukm:Year / ukm:Number metadata".to_string(),
        }),
    }
}

fn is_level(local: &str) -> bool {
    local.len() == 2 && local.starts_with('P') && local[1..].chars().all(|c| c.is_ascii_digit())
}

/// Map a `Pn` provision element recursively. Prose and nested levels live in
/// the `Pnpara` wrapper.
fn build_provision(element: &XmlElement, is_section: bool) -> DocNode {
    let number = element
        .child("Pnumber")
        .map(|n| clean_label(&n.text_content()))
        .filter(|n| !n.is_empty());

    let para = element
        .elements()
        .find(|e| e.local_name().ends_with("para"));

    let mut text_parts = Vec::new();
    let mut children = Vec::new();
    let mut table = None;
    if let Some(para) = para {
        for child in para.elements() {
            let local = child.local_name();
            if is_level(local) {
                children.push(build_provision(child, false));
            } else if local == "Text" {
                let text = child.text_content();
                if !text.is_empty() {
                    text_parts.push(text);
                }
            } else if local == "Tabular" || local == "table" {
                let parsed = parse_table(child);
                if !parsed.is_empty() && table.is_none() {
                    table = Some(parsed);
                }
            }
        }
    }

    let kind = if is_section || !children.is_empty() {
        NodeKind::Section
    } else {
        NodeKind::Leaf
    };

    DocNode {
        id: crate::model::NodeId(String::new()),
        kind,
        number,
        heading: None,
        text: text_parts.join(" "),
        table,
        include: None,
        children,
    }
}
