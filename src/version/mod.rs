// src/version/mod.rs

//! Version ordering for package candidates
//!
//! Package versions are free-form strings. They are split into alternating
//! runs of non-digits and digits; non-digit runs compare as strings, digit
//! runs compare numerically. `"1.2.10" > "1.2.9" > "1.2"`.

use std::cmp::Ordering;
use std::fmt;

/// One run of a version string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionPart {
    /// Non-digit run, compared as a string
    Text(String),
    /// Digit run with leading zeros stripped, compared as an integer
    Number(String),
}

impl VersionPart {
    fn number(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        VersionPart::Number(trimmed.to_string())
    }
}

impl Ord for VersionPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VersionPart::Text(a), VersionPart::Text(b)) => a.cmp(b),
            // Digit strings have no leading zeros, so length decides first
            (VersionPart::Number(a), VersionPart::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (VersionPart::Number(_), VersionPart::Text(_)) => Ordering::Less,
            (VersionPart::Text(_), VersionPart::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for VersionPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key for a version string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionKey {
    original: String,
    parts: Vec<VersionPart>,
}

impl VersionKey {
    /// Split a version string into alternating text and digit runs.
    ///
    /// The key always starts with a text run, possibly empty, so keys for
    /// `"1.2"` and `"v1.2"` line up position by position.
    pub fn parse(version: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = version;

        loop {
            let text_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            parts.push(VersionPart::Text(rest[..text_end].to_string()));
            rest = &rest[text_end..];
            if rest.is_empty() {
                break;
            }

            let digit_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            parts.push(VersionPart::number(&rest[..digit_end]));
            rest = &rest[digit_end..];
            if rest.is_empty() {
                break;
            }
        }

        Self {
            original: version.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn parts(&self) -> &[VersionPart] {
        &self.parts
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Trailing empty text runs carry no information
        let trim = |parts: &[VersionPart]| -> usize {
            match parts.last() {
                Some(VersionPart::Text(t)) if t.is_empty() => parts.len() - 1,
                _ => parts.len(),
            }
        };
        let a = &self.parts[..trim(&self.parts)];
        let b = &other.parts[..trim(&other.parts)];
        a.cmp(b)
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Compare two version strings with the mixed alpha/numeric ordering
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a).cmp(&VersionKey::parse(b))
}

/// Compare optional versions; an unversioned package sorts lowest
pub fn compare_optional(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_versions(a, b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_runs_compare_numerically() {
        assert_eq!(compare_versions("1.2.10", "1.2.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.9", "1.2"), Ordering::Greater);
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.2.10", "1.2"), Ordering::Greater);
    }

    #[test]
    fn test_equal_versions() {
        assert_eq!(compare_versions("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_text_runs() {
        assert_eq!(compare_versions("1.0b", "1.0a"), Ordering::Greater);
        assert_eq!(compare_versions("dev", "1.0"), Ordering::Greater);
    }

    #[test]
    fn test_parse_parts() {
        let key = VersionKey::parse("1.2a");
        assert_eq!(
            key.parts(),
            &[
                VersionPart::Text(String::new()),
                VersionPart::Number("1".to_string()),
                VersionPart::Text(".".to_string()),
                VersionPart::Number("2".to_string()),
                VersionPart::Text("a".to_string()),
            ]
        );
        assert_eq!(key.to_string(), "1.2a");
    }

    #[test]
    fn test_large_numbers_do_not_overflow() {
        assert_eq!(
            compare_versions("1.99999999999999999999999", "1.99999999999999999999998"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sort_descending() {
        let mut versions = vec!["1.2", "1.10", "1.2.9", "1.9", "1.2.10"];
        versions.sort_by(|a, b| compare_versions(b, a));
        assert_eq!(versions, vec!["1.10", "1.9", "1.2.10", "1.2.9", "1.2"]);
    }

    #[test]
    fn test_compare_optional() {
        assert_eq!(compare_optional(Some("1"), None), Ordering::Greater);
        assert_eq!(compare_optional(None, None), Ordering::Equal);
    }
}
