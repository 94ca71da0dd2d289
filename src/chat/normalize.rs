//! Text normalization and fuzzy entity resolution.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization as _;

/// Lower-case, strip diacritics, keep only `[a-z0-9 ]`, collapse spaces.
pub fn normalize(s: &str) -> String {
    let kept: String = s
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();
    kept.split(' ').filter(|t| !t.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Whether `needle` occurs in `haystack` as a run of whole tokens. Both must be normalized.
pub fn contains_tokens(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    format!(" {haystack} ").contains(&format!(" {needle} "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// Substring match in either direction
    Exact,
    /// Only shares a token with the query
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub quality: MatchQuality,
    /// Matching candidates in input order, de-duplicated
    pub values: Vec<String>,
}

/// Match `query` against `candidates`.
///
/// Substring matches win; otherwise any candidate sharing a token is an approximate
/// match. Empty queries and empty candidates never match.
pub fn resolve<'a, I>(query: &str, candidates: I) -> Option<Resolution>
where
    I: IntoIterator<Item = &'a str>,
{
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }
    let mut normalized: Vec<(&str, String)> = Vec::new();
    for candidate in candidates {
        let n = normalize(candidate);
        if n.is_empty() || normalized.iter().any(|(c, _)| *c == candidate) {
            continue;
        }
        normalized.push((candidate, n));
    }

    let exact: Vec<String> = normalized
        .iter()
        .filter(|(_, n)| n.contains(query.as_str()) || query.contains(n.as_str()))
        .map(|(c, _)| c.to_string())
        .collect();
    if !exact.is_empty() {
        return Some(Resolution { quality: MatchQuality::Exact, values: exact });
    }

    let tokens: Vec<&str> = query.split(' ').collect();
    let approximate: Vec<String> = normalized
        .iter()
        .filter(|(_, n)| n.split(' ').any(|t| tokens.contains(&t)))
        .map(|(c, _)| c.to_string())
        .collect();
    if approximate.is_empty() {
        None
    } else {
        Some(Resolution { quality: MatchQuality::Approximate, values: approximate })
    }
}
