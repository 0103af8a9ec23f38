//! # Text Processing Module
//!
//! ## Purpose
//! Tokenization and normalization pipeline feeding the full-text index.
//! Statutory prose is noisy (enumerations, amounts, citations); this module
//! reduces it to a stable stream of index terms.
//!
//! ## Input/Output Specification
//! - **Input**: Prose collected from a canonical document subtree
//! - **Output**: Normalized index terms and term-frequency maps
//! - **Normalization**: Unicode NFC, case folding, stopword filtering

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Stopwords excluded from the index. Statutory boilerplate terms are kept
/// out alongside the usual English function words.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "has", "have",
        "in", "is", "it", "no", "not", "of", "on", "or", "shall", "such", "than", "that", "the",
        "this", "to", "under", "upon", "which", "with",
    ]
    .into_iter()
    .collect()
});

const MIN_TOKEN_LEN: usize = 2;

/// Normalize prose to NFC and fold case
pub fn normalize(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Tokenize prose into normalized index terms.
///
/// Splits on non-alphanumeric boundaries; keeps digits so section numbers
/// and amounts stay searchable; drops stopwords and one-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|t| t.trim_matches('.'))
        .filter(|t| t.len() >= MIN_TOKEN_LEN && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Term frequencies for a body of text
pub fn term_frequencies(text: &str) -> HashMap<String, u32> {
    let mut frequencies = HashMap::new();
    for token in tokenize(text) {
        *frequencies.entry(token).or_insert(0) += 1;
    }
    frequencies
}

/// Extract a snippet around the first occurrence of any query term,
/// truncated to `max_len` characters on a whitespace boundary.
pub fn snippet(text: &str, query_terms: &[String], max_len: usize) -> String {
    let lowered = text.to_lowercase();
    let match_pos = query_terms
        .iter()
        .filter_map(|term| lowered.find(term.as_str()))
        .min()
        .unwrap_or(0);

    // Clamp to a char boundary, then back up to the surrounding sentence.
    let mut start = match_pos.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    if let Some(boundary) = text[..start].rfind(['\n', '.']) {
        start = boundary + 1;
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
    } else {
        start = 0;
    }

    let tail = text[start..].trim_start();
    let mut out: String = tail.chars().take(max_len).collect();
    if out.chars().count() < tail.chars().count() {
        if let Some(cut) = out.rfind(' ') {
            out.truncate(cut);
        }
        out.push_str("...");
    }
    out.trim().to_string()
}
