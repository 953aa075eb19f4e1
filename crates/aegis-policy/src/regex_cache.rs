//! Shared regex cache keyed by pattern source, with a safety check applied
//! before anything is compiled. A pattern that fails the safety check or
//! fails to compile gets a never-matching marker instead — its condition
//! is treated as non-matching rather than erroring the whole policy, and
//! the warning fires exactly once because the marker short-circuits every
//! later lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::warn;

/// Maximum accepted pattern length.
pub const MAX_PATTERN_LEN: usize = 500;

/// Reject patterns whose structure is likely to cause catastrophic
/// backtracking, and patterns beyond [`MAX_PATTERN_LEN`].
fn validate_regex_safety(pattern: &str) -> Result<(), String> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(format!("pattern exceeds {MAX_PATTERN_LEN} characters"));
    }
    if has_nested_quantifiers(pattern) {
        return Err("pattern contains nested quantifiers".to_string());
    }
    Ok(())
}

/// Detects the classic ReDoS shape of a quantified group itself containing
/// a quantifier, e.g. `(a+)+` or `(a*)*`.
fn has_nested_quantifiers(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut stack: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '(' => stack.push(i),
            ')' => {
                if let Some(start) = stack.pop() {
                    let quant_follows = matches!(chars.get(i + 1), Some('*' | '+' | '{'));
                    if quant_follows {
                        let inner: String = chars[start + 1..i].iter().collect();
                        if inner.contains(['*', '+']) || inner.contains('{') {
                            return true;
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Thread-safe, process-wide regex cache. `None` entries are
/// never-matching markers for patterns that failed validation or
/// compilation.
#[derive(Debug, Default)]
pub struct RegexCache {
    inner: RwLock<HashMap<String, Option<Arc<Regex>>>>,
}

impl RegexCache {
    /// Construct an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a compiled regex by pattern source, compiling and caching it
    /// on first use. Returns `None` when the pattern is unsafe or invalid;
    /// callers must treat that as "never matches".
    #[must_use]
    pub fn get_or_compile(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Some(entry) = self.inner.read().expect("regex cache poisoned").get(pattern) {
            return entry.clone();
        }
        let compiled = match validate_regex_safety(pattern) {
            Ok(()) => Regex::new(pattern).ok().map(Arc::new),
            Err(_) => None,
        };
        if compiled.is_none() {
            warn!(pattern, "regex failed safety validation or failed to compile; condition will never match");
        }
        self.inner.write().expect("regex cache poisoned").insert(pattern.to_string(), compiled.clone());
        compiled
    }

    /// Number of distinct patterns seen so far, including never-matching
    /// markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("regex cache poisoned").len()
    }

    /// True when no pattern has been looked up yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_identical_compiled_object_across_calls() {
        let cache = RegexCache::new();
        let a = cache.get_or_compile("^ab+c$").unwrap();
        let b = cache.get_or_compile("^ab+c$").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn rejects_oversized_pattern() {
        let cache = RegexCache::new();
        let huge = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(cache.get_or_compile(&huge).is_none());
    }

    #[test]
    fn rejects_nested_quantifiers() {
        let cache = RegexCache::new();
        assert!(cache.get_or_compile("(a+)+").is_none());
        assert!(cache.get_or_compile("(a*)*").is_none());
    }

    #[test]
    fn never_matching_marker_is_stable() {
        let cache = RegexCache::new();
        assert!(cache.get_or_compile("(a+)+").is_none());
        assert!(cache.get_or_compile("(a+)+").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn accepts_ordinary_patterns() {
        let cache = RegexCache::new();
        let re = cache.get_or_compile(r"^\d{3}-\d{2}-\d{4}$").unwrap();
        assert!(re.is_match("123-45-6789"));
    }
}
