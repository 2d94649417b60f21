//! Specifier pattern matching for external/no-external gating.

use regex::Regex;

/// A pattern from the `external`/`noExternal` option lists.
///
/// A literal matches a specifier exactly or as a package prefix
/// (`"lib"` matches `lib` and `lib/sub`, not `libx`). A regex matches if it
/// finds a match anywhere in the specifier.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Pattern::Literal(text.into())
    }

    pub fn regex(re: Regex) -> Self {
        Pattern::Regex(re)
    }

    /// Config syntax: `/…/` delimiters mean a regular expression, anything
    /// else is a literal.
    pub fn parse(text: &str) -> Result<Self, regex::Error> {
        if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
            Ok(Pattern::Regex(Regex::new(&text[1..text.len() - 1])?))
        } else {
            Ok(Pattern::Literal(text.to_string()))
        }
    }

    pub fn matches(&self, specifier: &str) -> bool {
        match self {
            Pattern::Literal(p) => {
                specifier == p
                    || (specifier.len() > p.len()
                        && specifier.starts_with(p.as_str())
                        && specifier.as_bytes()[p.len()] == b'/')
            }
            Pattern::Regex(re) => re.is_match(specifier),
        }
    }
}

/// True when any pattern matches the specifier.
pub fn matches_any(patterns: &[Pattern], specifier: &str) -> bool {
    patterns.iter().any(|p| p.matches(specifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_exact_and_subpath() {
        let p = Pattern::literal("lib");
        assert!(p.matches("lib"));
        assert!(p.matches("lib/sub"));
        assert!(!p.matches("libx"));
        assert!(!p.matches("other"));
    }

    #[test]
    fn scoped_package_literal() {
        let p = Pattern::literal("@scope/pkg");
        assert!(p.matches("@scope/pkg"));
        assert!(p.matches("@scope/pkg/deep"));
        assert!(!p.matches("@scope/pkg2"));
    }

    #[test]
    fn regex_finds_anywhere() {
        let p = Pattern::parse("/^node:/").unwrap();
        assert!(p.matches("node:fs"));
        assert!(!p.matches("fs"));
    }

    #[test]
    fn parse_distinguishes_forms() {
        assert!(matches!(Pattern::parse("lib").unwrap(), Pattern::Literal(_)));
        assert!(matches!(Pattern::parse("/lib/").unwrap(), Pattern::Regex(_)));
    }

    #[test]
    fn matches_any_over_lists() {
        let patterns = vec![Pattern::literal("a"), Pattern::parse("/^b$/").unwrap()];
        assert!(matches_any(&patterns, "a/x"));
        assert!(matches_any(&patterns, "b"));
        assert!(!matches_any(&patterns, "c"));
    }
}
