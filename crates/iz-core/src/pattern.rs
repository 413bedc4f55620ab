//! Wildcard URL patterns
//!
//! A rule `source` uses a two-token wildcard syntax: `*` matches any run of
//! characters (including none) and `?` matches exactly one character.
//! Everything else is literal. Matching is anchored at both ends and
//! ignores case.
//!
//! Patterns are compiled to a [`Regex`] once and memoized in a
//! [`PatternCache`], because the same handful of patterns is tested against
//! every outgoing request.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::{Regex, RegexBuilder};

/// Upper bound on cached patterns before the cache is flushed.
const CACHE_CAPACITY: usize = 1024;

/// Error compiling a wildcard pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Empty pattern")]
    Empty,
    #[error("Invalid pattern '{pattern}': {source}")]
    Compile {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Compilation
// =============================================================================

/// Translate a wildcard pattern into an anchored regex source string.
pub fn to_regex_source(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '*' | '?' => {
                if !literal.is_empty() {
                    out.push_str(&regex::escape(&literal));
                    literal.clear();
                }
                out.push_str(if ch == '*' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    if !literal.is_empty() {
        out.push_str(&regex::escape(&literal));
    }

    out.push('$');
    out
}

/// Compile a wildcard pattern.
///
/// An empty pattern is an error rather than "match everything".
pub fn compile_pattern(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    RegexBuilder::new(&to_regex_source(pattern))
        .case_insensitive(true)
        // `.` must also cross newlines so `*` really means "anything"
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| PatternError::Compile {
            pattern: pattern.to_string(),
            source,
        })
}

/// A compiled pattern. `None` never matches.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Option<Regex>,
}

impl CompiledPattern {
    /// Compile, recovering any failure as a never-matching pattern.
    pub fn new(pattern: &str) -> Self {
        let regex = match compile_pattern(pattern) {
            Ok(regex) => Some(regex),
            Err(PatternError::Empty) => None,
            Err(e) => {
                log::warn!("{e}; rule will never match");
                None
            }
        };
        Self { regex }
    }

    #[inline]
    pub fn is_match(&self, url: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(url))
    }

    /// Whether the pattern compiled to something that can match.
    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }
}

/// Test `url` against a wildcard `pattern` without caching.
pub fn matches(url: &str, pattern: &str) -> bool {
    CompiledPattern::new(pattern).is_match(url)
}

// =============================================================================
// Pattern Cache
// =============================================================================

/// Memoizes compiled patterns by their source string.
///
/// Safe to share between threads; lookups take a read lock only.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: RwLock<HashMap<String, Arc<CompiledPattern>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the compiled form of `pattern`, compiling it on first use.
    pub fn get(&self, pattern: &str) -> Arc<CompiledPattern> {
        if let Ok(entries) = self.entries.read() {
            if let Some(compiled) = entries.get(pattern) {
                return Arc::clone(compiled);
            }
        }

        let compiled = Arc::new(CompiledPattern::new(pattern));
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= CACHE_CAPACITY {
                entries.clear();
            }
            entries.insert(pattern.to_string(), Arc::clone(&compiled));
        }
        compiled
    }

    /// Cached test of `url` against `pattern`.
    pub fn matches(&self, url: &str, pattern: &str) -> bool {
        self.get(pattern).is_match(url)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_wildcard() {
        assert!(matches("https://api.example.com/users", "https://api.example.com/*"));
        assert!(!matches("https://other.com/users", "https://api.example.com/*"));
    }

    #[test]
    fn test_leading_wildcard_spans_scheme_and_host() {
        assert!(matches("https://x.com/v1/api/users", "*/api/users"));
        assert!(!matches("https://x.com/v1/api/users/1", "*/api/users"));
    }

    #[test]
    fn test_literal_pattern_is_exact() {
        for p in [
            "https://example.com/a.b",
            "http://x.com/path#q=(1)+[2]",
            "plain",
            "^$.|{}\\",
            "https://例え.jp/ユーザー",
        ] {
            assert!(matches(p, p), "{p} should match itself");
            assert!(!matches(&format!("{p}x"), p), "{p}x should not match {p}");
        }
    }

    #[test]
    fn test_question_mark_is_one_char() {
        assert!(matches("https://x.com/v1", "https://x.com/v?"));
        assert!(matches("https://x.com/v?", "https://x.com/v?"));
        assert!(!matches("https://x.com/v", "https://x.com/v?"));
        assert!(!matches("https://x.com/v12", "https://x.com/v?"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(matches("HTTPS://API.Example.com/Users", "https://api.example.com/users"));
    }

    #[test]
    fn test_star_matches_empty_run() {
        assert!(matches("https://x.com/", "https://x.com/*"));
        assert!(matches("", "*"));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!matches("", ""));
        assert!(!matches("https://example.com/", ""));
        assert!(matches!(compile_pattern(""), Err(PatternError::Empty)));
        assert!(!CompiledPattern::new("").is_valid());
    }

    #[test]
    fn test_regex_source() {
        assert_eq!(to_regex_source("a*b?c"), "^a.*b.c$");
        assert_eq!(to_regex_source("a.b"), "^a\\.b$");
    }

    #[test]
    fn test_cache_reuses_entries() {
        let cache = PatternCache::new();
        assert!(cache.is_empty());
        assert!(cache.matches("https://x.com/api", "*/api"));
        assert!(!cache.matches("https://x.com/web", "*/api"));
        assert_eq!(cache.len(), 1);

        let a = cache.get("*/api");
        let b = cache.get("*/api");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
