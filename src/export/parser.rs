//! Resource counts from export tool output
//!
//! The tool prints no machine-readable summary, so these patterns are
//! heuristics over its free-text log lines. Counts found here enrich the
//! result; they never decide success.

use regex::Regex;

/// Counts recovered from a transcript; `None` means the phrase never appeared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParsedCounts {
    pub total: Option<u64>,
    pub exported: Option<u64>,
    pub failed: Option<u64>,
    pub skipped: Option<u64>,
}

impl ParsedCounts {
    pub fn is_empty(&self) -> bool {
        self.total.is_none()
            && self.exported.is_none()
            && self.failed.is_none()
            && self.skipped.is_none()
    }
}

pub struct OutputParser {
    exported_pattern: Regex,
    failed_pattern: Regex,
    skipped_pattern: Regex,
    total_pattern: Regex,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser {
    pub fn new() -> Self {
        Self {
            // "Exported 12 resources", "imported 3 resource(s)"
            exported_pattern: Regex::new(r"(?i)\b(?:exported|imported)\s+(\d+)\s+resources?")
                .expect("Invalid exported pattern regex"),

            // "2 resources failed", "failed: 2"
            failed_pattern: Regex::new(r"(?i)(?:(\d+)\s+resources?(?:\(s\))?\s+failed|\bfailed\s*:\s*(\d+))")
                .expect("Invalid failed pattern regex"),

            // "4 resources skipped", "skipped: 4"
            skipped_pattern: Regex::new(r"(?i)(?:(\d+)\s+resources?(?:\(s\))?\s+skipped|\bskipped\s*:\s*(\d+))")
                .expect("Invalid skipped pattern regex"),

            // "Total: 18 resources", "18 resources found"
            total_pattern: Regex::new(r"(?i)(?:\btotal\s*(?:resources)?\s*:\s*(\d+)|(\d+)\s+resources?\s+found)")
                .expect("Invalid total pattern regex"),
        }
    }

    /// Scan every line; the last occurrence of each phrase wins
    pub fn parse<S: AsRef<str>>(&self, lines: &[S]) -> ParsedCounts {
        let mut counts = ParsedCounts::default();

        for line in lines {
            let line = line.as_ref();
            if let Some(n) = last_number(&self.exported_pattern, line) {
                counts.exported = Some(n);
            }
            if let Some(n) = last_number(&self.failed_pattern, line) {
                counts.failed = Some(n);
            }
            if let Some(n) = last_number(&self.skipped_pattern, line) {
                counts.skipped = Some(n);
            }
            if let Some(n) = last_number(&self.total_pattern, line) {
                counts.total = Some(n);
            }
        }

        counts
    }
}

/// Number in the first participating capture group of the last match
fn last_number(pattern: &Regex, line: &str) -> Option<u64> {
    pattern
        .captures_iter(line)
        .last()
        .and_then(|caps| caps.iter().skip(1).flatten().next())
        .and_then(|m| m.as_str().parse().ok())
}
