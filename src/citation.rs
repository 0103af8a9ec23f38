//! # Citation Addressing Module
//!
//! ## Purpose
//! Parses and formats jurisdiction-qualified legal citations into canonical
//! structured identifiers and stable hierarchical paths. Every other component
//! addresses documents through the [`Citation`] type produced here.
//!
//! ## Input/Output Specification
//! - **Input**: Citation text ("26 USC 32(a)(1)", "DC 47-1806.03(a)(10)", "CAL RTC 17041")
//! - **Output**: Structured [`Citation`] values and canonical slash paths
//! - **Invariant**: `parse(format(c)) == c` for every citation produced by `parse`
//!
//! ## Grammar Policy
//! Grammars are tried most-specific first (federal USC, then DC dash form,
//! then generic jurisdiction-prefixed). A prefix claimed by more than one
//! jurisdiction with no specificity winner fails with `AmbiguousCitation`
//! rather than guessing: bare "CA" could be California or Canada, so the
//! canonical prefixes are "CAL" and "CAN".

use crate::errors::{ArchiveError, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of jurisdiction tracked by the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JurisdictionKind {
    Federal,
    State,
    Territory,
    International,
}

/// One entry in the jurisdiction registry
#[derive(Debug, Clone)]
pub struct JurisdictionInfo {
    /// Jurisdiction ID ("us", "us-ca", "uk", ...)
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    pub kind: JurisdictionKind,
    /// Prefix emitted by `format`
    pub canonical_prefix: &'static str,
    /// Prefixes accepted by `parse` (uppercased)
    pub aliases: &'static [&'static str],
}

/// Jurisdictions the citation grammar knows about.
///
/// Federal citations use the dedicated USC grammar and never a prefix.
pub static JURISDICTIONS: &[JurisdictionInfo] = &[
    JurisdictionInfo {
        id: "us",
        name: "United States",
        kind: JurisdictionKind::Federal,
        canonical_prefix: "",
        aliases: &[],
    },
    JurisdictionInfo {
        id: "us-ca",
        name: "California",
        kind: JurisdictionKind::State,
        canonical_prefix: "CAL",
        aliases: &["CAL", "CA", "US-CA"],
    },
    JurisdictionInfo {
        id: "us-dc",
        name: "District of Columbia",
        kind: JurisdictionKind::Territory,
        canonical_prefix: "DC",
        aliases: &["DC", "D.C.", "US-DC"],
    },
    JurisdictionInfo {
        id: "us-fl",
        name: "Florida",
        kind: JurisdictionKind::State,
        canonical_prefix: "FL",
        aliases: &["FL", "US-FL"],
    },
    JurisdictionInfo {
        id: "us-ny",
        name: "New York",
        kind: JurisdictionKind::State,
        canonical_prefix: "NY",
        aliases: &["NY", "US-NY"],
    },
    JurisdictionInfo {
        id: "us-tx",
        name: "Texas",
        kind: JurisdictionKind::State,
        canonical_prefix: "TX",
        aliases: &["TX", "US-TX"],
    },
    JurisdictionInfo {
        id: "uk",
        name: "United Kingdom",
        kind: JurisdictionKind::International,
        canonical_prefix: "UK",
        aliases: &["UK", "GB"],
    },
    JurisdictionInfo {
        id: "ca",
        name: "Canada",
        kind: JurisdictionKind::International,
        canonical_prefix: "CAN",
        aliases: &["CAN", "CA"],
    },
];

/// Look up a jurisdiction by ID
pub fn jurisdiction(id: &str) -> Option<&'static JurisdictionInfo> {
    JURISDICTIONS.iter().find(|j| j.id == id)
}

/// A jurisdiction-qualified address for a statutory provision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Jurisdiction ID ("us", "us-dc", "uk", ...)
    pub jurisdiction: String,
    /// Title or code identifier ("26" for the IRC, "47" for DC Title 47, "RTC")
    pub title: String,
    /// Section number ("32", "1806.03")
    pub section: String,
    /// Ordered subsection path segments (e.g. ["a", "1"])
    pub subsection_path: Vec<String>,
    /// Optional point-in-time qualifier
    pub as_of: Option<NaiveDate>,
}

// Federal: "26 USC 32(a)(1)", "26 U.S.C. § 32"
static USC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*U\.?\s?S\.?\s?C\.?\s*(?:§\s*)?([0-9]+[0-9A-Za-z.\-]*)((?:\([0-9A-Za-z]+\))*)$")
        .expect("valid USC regex")
});

// DC dash form: "DC 47-1806.03(a)(10)"
static DC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:DC|D\.C\.)\s+(\d+)-([0-9A-Za-z.]+)((?:\([0-9A-Za-z]+\))*)$")
        .expect("valid DC regex")
});

// Generic prefixed: "CAL RTC 17041(a)", "UK ITA 6", "CAN ITA 117"
static PREFIXED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z.\-]{2,6})\s+([A-Za-z0-9]+)\s+(?:§\s*)?([0-9][0-9A-Za-z.\-]*)((?:\([0-9A-Za-z]+\))*)$",
    )
    .expect("valid prefixed regex")
});

static SUBSECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([0-9A-Za-z]+)\)").expect("valid subsection regex"));

static AS_OF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*@(\d{4}-\d{2}-\d{2})$").expect("valid as-of regex"));

impl Citation {
    /// Construct a citation without subsection path or as-of date
    pub fn new(jurisdiction: &str, title: &str, section: &str) -> Self {
        Self {
            jurisdiction: jurisdiction.to_string(),
            title: title.to_string(),
            section: section.to_string(),
            subsection_path: Vec::new(),
            as_of: None,
        }
    }

    /// Parse citation text into a structured citation.
    ///
    /// Grammars are tried most-specific first; see module docs for the
    /// ambiguity policy.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ArchiveError::MalformedCitation {
                text: text.to_string(),
                reason: "empty citation".to_string(),
            });
        }

        // Strip an optional "@YYYY-MM-DD" as-of suffix first.
        let (body, as_of) = match AS_OF_RE.captures(trimmed) {
            Some(caps) => {
                let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").map_err(|e| {
                    ArchiveError::MalformedCitation {
                        text: text.to_string(),
                        reason: format!("bad as-of date: {}", e),
                    }
                })?;
                (trimmed[..caps.get(0).expect("match").start()].trim(), Some(date))
            }
            None => (trimmed, None),
        };

        if let Some(caps) = USC_RE.captures(body) {
            return Ok(Self {
                jurisdiction: "us".to_string(),
                title: caps[1].to_string(),
                section: caps[2].to_string(),
                subsection_path: parse_subsections(&caps[3]),
                as_of,
            });
        }

        if let Some(caps) = DC_RE.captures(body) {
            return Ok(Self {
                jurisdiction: "us-dc".to_string(),
                title: caps[1].to_string(),
                section: caps[2].to_string(),
                subsection_path: parse_subsections(&caps[3]),
                as_of,
            });
        }

        if let Some(caps) = PREFIXED_RE.captures(body) {
            let jurisdiction = resolve_prefix(&caps[1], text)?;
            return Ok(Self {
                jurisdiction,
                title: caps[2].to_string(),
                section: caps[3].to_string(),
                subsection_path: parse_subsections(&caps[4]),
                as_of,
            });
        }

        Err(ArchiveError::MalformedCitation {
            text: text.to_string(),
            reason: "no recognized citation grammar".to_string(),
        })
    }

    /// Canonical ordered path segments for this citation.
    ///
    /// Deterministic and round-trippable: two citations with identical fields
    /// always produce identical paths.
    pub fn to_path(&self) -> Vec<String> {
        let mut path = vec![
            self.jurisdiction.clone(),
            "statute".to_string(),
            self.title.clone(),
            self.section.clone(),
        ];
        path.extend(self.subsection_path.iter().cloned());
        path
    }

    /// Canonical slash-joined path, e.g. `us/statute/26/32/a/1`
    pub fn canonical_path(&self) -> String {
        self.to_path().join("/")
    }

    /// Path addressing the section chain, ignoring subsection and as-of.
    /// This is the key under which version chains are stored.
    pub fn chain_key(&self) -> String {
        format!(
            "{}/statute/{}/{}",
            self.jurisdiction, self.title, self.section
        )
    }

    /// Copy of this citation without the as-of qualifier
    pub fn without_as_of(&self) -> Self {
        let mut c = self.clone();
        c.as_of = None;
        c
    }
}

fn parse_subsections(group: &str) -> Vec<String> {
    SUBSECTION_RE
        .captures_iter(group)
        .map(|c| c[1].to_string())
        .collect()
}

fn resolve_prefix(prefix: &str, original: &str) -> Result<String> {
    let upper = prefix.to_uppercase();
    let candidates: Vec<&JurisdictionInfo> = JURISDICTIONS
        .iter()
        .filter(|j| j.aliases.contains(&upper.as_str()))
        .collect();

    match candidates.len() {
        0 => Err(ArchiveError::MalformedCitation {
            text: original.to_string(),
            reason: format!("unknown jurisdiction prefix '{}'", prefix),
        }),
        1 => Ok(candidates[0].id.to_string()),
        _ => Err(ArchiveError::AmbiguousCitation {
            text: original.to_string(),
            candidates: candidates.iter().map(|j| j.id.to_string()).collect(),
        }),
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.jurisdiction.as_str() {
            "us" => write!(f, "{} USC {}", self.title, self.section)?,
            "us-dc" => write!(f, "DC {}-{}", self.title, self.section)?,
            other => {
                let prefix = jurisdiction(other)
                    .map(|j| j.canonical_prefix.to_string())
                    .unwrap_or_else(|| other.to_uppercase());
                write!(f, "{} {} {}", prefix, self.title, self.section)?;
            }
        }
        for segment in &self.subsection_path {
            write!(f, "({})", segment)?;
        }
        if let Some(date) = self.as_of {
            write!(f, " @{}", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

impl FromStr for Citation {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        Citation::parse(s)
    }
}
