use globset::{Glob, GlobMatcher};

/// Case-insensitive exact-or-glob matcher over an ordered pattern list
///
/// Each pattern is tried in configured order: exact comparison first, then
/// glob (`*`, `?`, `[..]`). The first pattern that matches is reported.
pub struct ExclusionMatcher {
    patterns: Vec<CompiledPattern>,
}

struct CompiledPattern {
    text: String,
    lowered: String,
    glob: Option<GlobMatcher>,
}

impl ExclusionMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|pattern| CompiledPattern {
                text: pattern.to_string(),
                lowered: pattern.to_lowercase(),
                // Unparseable globs still take part as exact patterns
                glob: Glob::new(&pattern.to_lowercase())
                    .ok()
                    .map(|g| g.compile_matcher()),
            })
            .collect();

        Self { patterns }
    }

    /// The first pattern matching `name`, if any
    pub fn matching_pattern(&self, name: &str) -> Option<&str> {
        let lowered = name.trim().to_lowercase();

        self.patterns
            .iter()
            .find(|p| {
                p.lowered == lowered || p.glob.as_ref().is_some_and(|g| g.is_match(&lowered))
            })
            .map(|p| p.text.as_str())
    }

    #[cfg(test)]
    pub fn is_match(&self, name: &str) -> bool {
        self.matching_pattern(name).is_some()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
