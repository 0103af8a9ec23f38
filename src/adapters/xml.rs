//! # Shared XML Tree Module
//!
//! ## Purpose
//! Small depth-guarded DOM built on `quick-xml` events. The format adapters
//! walk this tree instead of raw events, which keeps the per-schema mapping
//! code recursive and readable while a single place enforces the structural
//! depth bound.
//!
//! ## Input/Output Specification
//! - **Input**: Raw XML bytes
//! - **Output**: [`XmlElement`] tree, or a cheap [`DocSignature`] for sniffing
//! - **Limits**: Nesting past the configured bound fails with
//!   `StructuralDepthExceeded`

use crate::errors::{ArchiveError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// An element in the parsed tree, with the qualified name as written
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlChild>,
}

/// Child content of an element
#[derive(Debug, Clone)]
pub enum XmlChild {
    Element(XmlElement),
    Text(String),
}

/// Cheap signature of a document used for adapter selection: root element
/// local name plus every namespace URI declared on it.
#[derive(Debug, Clone)]
pub struct DocSignature {
    pub root_local: String,
    pub namespaces: Vec<String>,
}

impl DocSignature {
    /// Whether any declared namespace contains the given fragment
    pub fn has_namespace(&self, fragment: &str) -> bool {
        self.namespaces.iter().any(|ns| ns.contains(fragment))
    }
}

impl XmlElement {
    /// Local name (qualified name with any prefix stripped)
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Attribute lookup by qualified or local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name || k.rsplit(':').next() == Some(name))
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(e) => Some(e),
            XmlChild::Text(_) => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.local_name() == local)
    }

    /// All child elements with the given local name
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.local_name() == local)
    }

    /// All descendants (depth-first, self excluded) with the given local name
    pub fn descendants(&self, local: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        for element in self.elements() {
            if element.local_name() == local {
                found.push(element);
            }
            found.extend(element.descendants(local));
        }
        found
    }

    /// All text in this subtree, whitespace-collapsed
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        let joined = parts.join(" ");
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, parts: &mut Vec<String>) {
        for child in &self.children {
            match child {
                XmlChild::Text(t) => parts.push(t.clone()),
                XmlChild::Element(e) => e.collect_text(parts),
            }
        }
    }

    /// Text directly under this element, skipping child elements whose local
    /// name is in `skip`. Used to separate a node's own prose from nested
    /// subsections.
    pub fn text_excluding(&self, skip: &[&str]) -> String {
        let mut parts = Vec::new();
        for child in &self.children {
            match child {
                XmlChild::Text(t) => parts.push(t.clone()),
                XmlChild::Element(e) if !skip.contains(&e.local_name()) => {
                    e.collect_text(&mut parts)
                }
                XmlChild::Element(_) => {}
            }
        }
        let joined = parts.join(" ");
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ArchiveError::Internal {
            message: format!("malformed attribute in <{}>: {}", name, e),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(ArchiveError::Xml)?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

/// Parse XML bytes into an element tree, enforcing the depth bound.
pub fn parse_document(bytes: &[u8], max_depth: usize) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    // Stack of open elements; the root lands back in `stack[0]`.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                if stack.len() + 1 > max_depth {
                    return Err(ArchiveError::StructuralDepthExceeded {
                        depth: stack.len() + 1,
                        limit: max_depth,
                    });
                }
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlChild::Element(element)),
                    None => root = Some(element),
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(ArchiveError::Xml)?.into_owned();
                if !text.trim().is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlChild::Text(text));
                    }
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                if !text.trim().is_empty() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlChild::Text(text));
                    }
                }
            }
            Event::End(_) => {
                let finished = stack.pop().ok_or_else(|| ArchiveError::Internal {
                    message: "unbalanced XML end tag".to_string(),
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlChild::Element(finished)),
                    None => root = Some(finished),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| ArchiveError::Internal {
        message: "document has no root element".to_string(),
    })
}

/// Read just far enough to identify the root element and its namespace
/// declarations. Used for schema sniffing before committing to a full parse.
pub fn document_signature(bytes: &[u8]) -> Result<DocSignature> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start) => {
                let element = element_from_start(&start)?;
                let namespaces = element
                    .attrs
                    .iter()
                    .filter(|(k, _)| k == "xmlns" || k.starts_with("xmlns:"))
                    .map(|(_, v)| v.clone())
                    .collect();
                return Ok(DocSignature {
                    root_local: element.local_name().to_string(),
                    namespaces,
                });
            }
            Event::Eof => {
                return Err(ArchiveError::Internal {
                    message: "document has no root element".to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
}
