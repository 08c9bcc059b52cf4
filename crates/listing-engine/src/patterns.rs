//! Field pattern library: keyword tables that map free-form marketplace
//! text onto canonical values.
//!
//! Tables are ordered and matched first-hit. More specific phrases come
//! before the shorter keywords they contain ("like new" before "new",
//! "very good" before "good").

use crate::item::Condition;

/// One row of a keyword table.
#[derive(Debug, Clone, Copy)]
pub struct KeywordPattern<T: 'static> {
    /// Lowercase substrings, any of which selects `canonical`.
    pub keywords: &'static [&'static str],
    pub canonical: T,
}

/// Condition keywords in priority order.
pub const CONDITION_PATTERNS: &[KeywordPattern<Condition>] = &[
    KeywordPattern {
        keywords: &["like new", "likenew"],
        canonical: Condition::LikeNew,
    },
    KeywordPattern {
        keywords: &["new", "brand new", "sealed"],
        canonical: Condition::New,
    },
    KeywordPattern {
        keywords: &["very good", "excellent"],
        canonical: Condition::Good,
    },
    KeywordPattern {
        keywords: &["good"],
        canonical: Condition::Good,
    },
    KeywordPattern {
        keywords: &["fair", "acceptable", "decent"],
        canonical: Condition::Fair,
    },
    KeywordPattern {
        keywords: &["poor", "parts", "salvage", "broken"],
        canonical: Condition::Poor,
    },
];

/// Walk `table` and return the first canonical value whose keyword occurs
/// in `raw` (case-insensitive).
pub fn match_keywords<T: Clone>(table: &[KeywordPattern<T>], raw: &str) -> Option<T> {
    let lower = raw.trim().to_lowercase();
    table
        .iter()
        .find(|p| p.keywords.iter().any(|kw| lower.contains(kw)))
        .map(|p| p.canonical.clone())
}

/// Map raw condition text to a canonical [`Condition`].
///
/// Unmatched text is preserved as [`Condition::Other`]; blank input yields
/// `None`.
pub fn normalize_condition(raw: &str) -> Option<Condition> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        match_keywords(CONDITION_PATTERNS, trimmed)
            .unwrap_or_else(|| Condition::Other(trimmed.to_string())),
    )
}

/// Parse a price string by dropping everything except digits and dots.
///
/// Returns `0.0` on empty input, parse failure, or a non-finite result.
pub fn parse_price(text: &str) -> f64 {
    parse_price_opt(text).unwrap_or(0.0)
}

/// Like [`parse_price`] but keeps "nothing parsed" distinguishable.
pub fn parse_price_opt(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    parse_leading_float(&cleaned).filter(|v| v.is_finite())
}

/// Parse the longest valid float prefix, so "12.50.3" reads as 12.5.
fn parse_leading_float(s: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}
