//! Glob matching for signal and action identifiers.
//!
//! Identifiers containing `*`, `?` or `[` are treated as patterns. Dots have
//! no special meaning, so `new.*` matches `new.project` and `new.asset.shot`.

use glob::Pattern;

/// Whether `identifier` should be treated as a glob pattern
pub fn is_pattern(identifier: &str) -> bool {
    identifier.contains(&['*', '?', '['][..])
}

/// Whether `pattern` matches `identifier`.
///
/// A malformed pattern never matches; it can still be used as an exact key.
pub fn matches(pattern: &str, identifier: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches(identifier),
        Err(_) => false,
    }
}

/// Whether `pattern` is a well-formed glob
pub fn is_valid(pattern: &str) -> bool {
    Pattern::new(pattern).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pattern() {
        assert!(is_pattern("new.*"));
        assert!(is_pattern("request.?"));
        assert!(is_pattern("[ab].run"));
        assert!(!is_pattern("new.project"));
    }

    #[test]
    fn test_matches() {
        assert!(matches("new.*", "new.project"));
        assert!(matches("new.*", "new.asset.shot"));
        assert!(!matches("new.*", "publish.file"));
        assert!(matches("*.after", "group.after"));
        assert!(matches("group.?fter", "group.after"));
    }

    #[test]
    fn test_malformed_pattern() {
        assert!(!is_valid("new.[*"));
        assert!(!matches("new.[*", "new.project"));
    }
}
