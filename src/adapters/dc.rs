//! # DC Code Adapter
//!
//! ## Purpose
//! Normalizes District of Columbia Code sections from the DC Council's
//! law-xml repositories. The format derives from Akoma Ntoso and makes heavy
//! use of W3C XInclude to stitch section files together, so this adapter also
//! emits transclusion directives for the resolver to materialize.
//!
//! ## Schema Notes
//! - Default namespace `https://code.dccouncil.us/schemas/dc-library`
//! - Section numbers carry the title prefix: `47-1806.03` is Title 47
//! - Nested `<para>` elements with `<num>(a)</num>` labels form the
//!   subsection hierarchy; prose lives in `<text>` children

use super::xml::{self, DocSignature, XmlElement};
use super::{clean_label, parse_table, FormatAdapter, RawDocument};
use crate::citation::Citation;
use crate::config::AdapterConfig;
use crate::errors::{ArchiveError, Result};
use crate::model::{CanonicalDocument, DocNode, IncludeDirective, NodeKind, Provenance};

const NS_DC: &str = "code.dccouncil.us/schemas";
const NS_XINCLUDE: &str = "www.w3.org/2001/XInclude";

pub struct DcCodeAdapter;

impl FormatAdapter for DcCodeAdapter {
    fn name(&self) -> &'static str {
        "dc-code"
    }

    fn claims(&self, signature: &DocSignature) -> bool {
        signature.has_namespace(NS_DC)
    }

    fn normalize(&self, raw: &RawDocument, config: &AdapterConfig) -> Result<CanonicalDocument> {
        let root = xml::parse_document(&raw.bytes, config.max_structural_depth)?;
        if root.local_name() != "section" {
            return Err(ArchiveError::SchemaMismatch {
                adapter: "dc-code".to_string(),
                details: format!("expected <section> root, found <{}>", root.local_name()),
            });
        }

        let number = root
            .child("num")
            .map(|n| n.text_content())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ArchiveError::SchemaMismatch {
                adapter: "dc-code".to_string(),
                details: "section has no <num>".to_string(),
            })?;
        let citation = citation_from_number(&number)?;

        let heading = root.child("heading").map(|h| h.text_content());
        let repealed = heading
            .as_deref()
            .map(|h| h.contains("[Repealed]"))
            .unwrap_or(false);

        let mut section = DocNode::section(Some(citation.section.clone()), heading);
        section.text = root.text_excluding(&["num", "heading", "para", "include", "table", "annotations"]);
        section.table = non_empty_table(&root);
        populate_children(&root, &mut section, config);

        let provenance = Provenance {
            adapter: "dc-code".to_string(),
            source_url: raw.source_url.clone(),
            retrieved_at: raw.retrieved_at,
        };
        let doc = CanonicalDocument::new(citation, section, provenance)?;
        Ok(if repealed { doc.mark_repealed() } else { doc })
    }
}

/// `47-1806.03` → Title 47, section 1806.03
fn citation_from_number(number: &str) -> Result<Citation> {
    match number.split_once('-') {
        Some((title, section)) if !title.is_empty() && !section.is_empty() => {
            Ok(Citation::new("us-dc", title, section))
        }
        _ => Err(ArchiveError::SchemaMismatch {
            adapter: "dc-code".to_string(),
            details: format!("section number '{}' lacks a title prefix", number),
        }),
    }
}

fn populate_children(element: &XmlElement, node: &mut DocNode, config: &AdapterConfig) {
    for child in element.elements() {
        match child.local_name() {
            "para" => node.children.push(build_para(child, config)),
            "include" if child.name.contains(':') || element_ns_is_xinclude(child) => {
                if let Some(directive) = include_directive(child) {
                    node.children.push(DocNode::unresolved_include(directive));
                }
            }
            _ => {}
        }
    }
}

// XInclude elements usually arrive as <xi:include>; a prefix-less form still
// claims the XInclude namespace on the element itself.
fn element_ns_is_xinclude(element: &XmlElement) -> bool {
    element
        .attr("xmlns")
        .map(|ns| ns.contains(NS_XINCLUDE))
        .unwrap_or(false)
}

fn include_directive(element: &XmlElement) -> Option<IncludeDirective> {
    let href = element.attr("href")?;
    let (file, fragment) = match href.split_once('#') {
        Some((file, fragment)) => (file, Some(fragment.to_string())),
        None => (href, element.attr("xpointer").map(|x| x.to_string())),
    };
    Some(IncludeDirective {
        file: file.trim_start_matches("./").to_string(),
        fragment,
    })
}

fn build_para(element: &XmlElement, config: &AdapterConfig) -> DocNode {
    let number = element
        .child("num")
        .map(|n| clean_label(&n.text_content()))
        .filter(|n| !n.is_empty());
    let text = element
        .children_named("text")
        .map(|t| t.text_content())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut node = DocNode {
        id: crate::model::NodeId(String::new()),
        kind: NodeKind::Leaf,
        number,
        heading: element.child("heading").map(|h| h.text_content()),
        text,
        table: non_empty_table(element),
        include: None,
        children: Vec::new(),
    };
    populate_children(element, &mut node, config);
    if !node.children.is_empty() {
        node.kind = NodeKind::Section;
    }
    node
}

/// First table directly under this element's own markup (not nested paras)
fn non_empty_table(element: &XmlElement) -> Option<crate::model::Table> {
    for child in element.elements() {
        if child.local_name() == "para" {
            continue;
        }
        let candidate = if child.local_name() == "table" {
            Some(child)
        } else {
            child
                .descendants("table")
                .into_iter()
                .next()
        };
        if let Some(table_elem) = candidate {
            let table = parse_table(table_elem);
            if !table.is_empty() {
                return Some(table);
            }
        }
    }
    None
}
