// src/filter/text.rs
//! Accent-insensitive text helpers for district and landmark matching.

use once_cell::sync::Lazy;
use regex::Regex;

/// Lowercase, strip Spanish diacritics, turn punctuation into spaces, collapse spaces.
///
/// Handles both precomposed ("ñ") and decomposed ("n" + U+0303) spellings.
pub fn fold(s: &str) -> String {
    let mapped: String = s
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            // combining diacritical marks
            '\u{0300}'..='\u{036F}' => None,
            'á' | 'à' | 'â' | 'ä' => Some('a'),
            'é' | 'è' | 'ê' | 'ë' => Some('e'),
            'í' | 'ì' | 'î' | 'ï' => Some('i'),
            'ó' | 'ò' | 'ô' | 'ö' => Some('o'),
            'ú' | 'ù' | 'û' | 'ü' => Some('u'),
            'ñ' => Some('n'),
            'ç' => Some('c'),
            c if c.is_alphanumeric() => Some(c),
            _ => Some(' '),
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// District key used for allow-list comparison ("Moncloa-Aravaca" == "MONCLOA - ARAVACA").
pub fn district_key(s: &str) -> String {
    fold(s)
}

// Runs on folded text, so "Pza." has become "pza" and "España" "espana".
static LANDMARK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:plaza|plza|pza|pl)\s+(?:de\s+)?espana\b").expect("landmark regex")
});

/// True when any field mentions Plaza de España, abbreviated or not.
pub fn mentions_landmark<'a>(fields: impl IntoIterator<Item = &'a str>) -> bool {
    fields
        .into_iter()
        .filter(|f| !f.trim().is_empty())
        .any(|f| LANDMARK.is_match(&fold(f)))
}
