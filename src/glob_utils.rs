//! Glob pattern matching for excluding tracked paths from indexing

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled set of exclusion globs, matched against repository-relative paths
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
    patterns: Vec<String>,
}

impl ExcludeMatcher {
    /// Compile patterns, skipping (and logging) any that fail to parse
    pub fn new(patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut accepted = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                    accepted.push(pattern.clone());
                }
                Err(e) => {
                    tracing::warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
                }
            }
        }

        let set = builder.build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build exclude set, nothing will be excluded: {}", e);
            GlobSet::empty()
        });

        Self {
            set,
            patterns: accepted,
        }
    }

    /// Matcher that excludes nothing
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Check whether a repository-relative path is excluded
    ///
    /// `**/name` patterns also match files at the repository root.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        let path = path.trim_start_matches('/');
        self.set.is_match(path) || self.set.is_match(format!("/{}", path))
    }

    /// Patterns that compiled successfully
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ExcludeMatcher {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> ExcludeMatcher {
        let owned: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ExcludeMatcher::new(&owned)
    }

    #[test]
    fn test_empty_matcher_excludes_nothing() {
        let m = ExcludeMatcher::empty();
        assert!(!m.is_excluded("Cargo.lock"));
        assert!(!m.is_excluded("src/main.rs"));
    }

    #[test]
    fn test_double_star_matches_root_and_nested() {
        let m = matcher(&["**/package-lock.json"]);
        assert!(m.is_excluded("package-lock.json"));
        assert!(m.is_excluded("web/package-lock.json"));
        assert!(!m.is_excluded("web/package.json"));
    }

    #[test]
    fn test_extension_patterns() {
        let m = matcher(&["**/*.min.js"]);
        assert!(m.is_excluded("static/vendor/jquery.min.js"));
        assert!(m.is_excluded("app.min.js"));
        assert!(!m.is_excluded("static/app.js"));
    }

    #[test]
    fn test_directory_pattern() {
        let m = matcher(&["vendor/**"]);
        assert!(m.is_excluded("vendor/lib/a.go"));
        assert!(!m.is_excluded("src/vendor.go"));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let m = matcher(&["[invalid", "*.lock"]);
        assert_eq!(m.patterns(), &["*.lock".to_string()]);
        assert!(m.is_excluded("Cargo.lock"));
    }
}
