//! # Utilities Module
//!
//! ## Purpose
//! Small shared helpers: operation timing for ingestion logging, hex
//! rendering for content hashes, and display truncation.

use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

/// Lowercase hex rendering of a byte slice
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Truncate text to a character budget with an ellipsis, safe on multi-byte
/// content
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xff, 0x1a]), "00ff1a");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_truncate_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 10), "a longe...");
        // Multi-byte characters never split.
        let s = truncate("§§§§§§§§§§§§", 8);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn test_timer_elapsed() {
        let timer = Timer::new("test");
        assert!(timer.elapsed_ms() < 5_000);
        timer.stop();
    }
}
