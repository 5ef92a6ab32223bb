//! Lexical polarity detection.
//!
//! Used as a fallback when the extraction model omits a polarity tag.
//! Negation markers flip a claim to NEGATE; hedged statements without a
//! clear stance stay UNSPECIFIED.

use crate::model::Polarity;

/// Markers of a negated assertion.
const NEGATION_MARKERS: &[&str] = &[
    "not", "no", "never", "neither", "without", "lacks", "doesn't", "don't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "cannot", "denies", "refutes", "disputes", "false",
];

/// Hedging markers; claims carrying more than the extractor's threshold
/// are discarded, a single one downgrades polarity to UNSPECIFIED here.
pub const HEDGE_MARKERS: &[&str] = &[
    "may",
    "might",
    "could",
    "possibly",
    "perhaps",
    "reportedly",
    "allegedly",
    "unclear",
    "uncertain",
    "it is believed",
    "some say",
    "rumored",
];

/// Detect the stance of an untagged claim.
pub fn lexical_polarity(text: &str) -> Polarity {
    let lowered = text.to_lowercase();
    if contains_marker(&lowered, NEGATION_MARKERS) {
        Polarity::Negate
    } else if contains_marker(&lowered, HEDGE_MARKERS) {
        Polarity::Unspecified
    } else {
        Polarity::Affirm
    }
}

/// Count hedge markers in a claim.
pub fn hedge_count(text: &str) -> usize {
    let lowered = text.to_lowercase();
    HEDGE_MARKERS
        .iter()
        .filter(|marker| contains_word(&lowered, marker))
        .count()
}

fn contains_marker(lowered: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| contains_word(lowered, m))
}

/// Word-boundary containment so "no" doesn't match "north".
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.contains(' ') {
        return haystack.contains(needle);
    }
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word == needle)
}
