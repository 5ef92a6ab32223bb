//! Query mutation per search strategy, and the cache fingerprint.
//!
//! The first attempt always searches the question verbatim. Each retry
//! rotates to the next strategy: keyword expansion, LLM-assisted
//! reframing, then a reputable-domain restriction, cycling thereafter.

use crate::llm::LlmClient;
use crate::model::SearchStrategy;
use crate::verify::content_words;
use sha2::{Digest, Sha256};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

/// Reputable-domain shortlist appended by `DomainRestricted`.
const REPUTABLE_SITES: &[&str] = &["gov", "edu", "britannica.com", "reuters.com", "nature.com"];

/// Produce the search query for a strategy.
///
/// `QuestionReframing` consults the LLM; a failed reframing falls back to
/// the verbatim question rather than failing the attempt.
pub async fn mutate_query(
    question: &str,
    strategy: SearchStrategy,
    llm: &dyn LlmClient,
) -> String {
    match strategy {
        SearchStrategy::Verbatim => question.to_string(),
        SearchStrategy::KeywordExpansion => {
            let keywords = content_words(question);
            if keywords.is_empty() {
                question.to_string()
            } else {
                format!("{} facts overview", keywords.join(" "))
            }
        }
        SearchStrategy::QuestionReframing => {
            let prompt = format!(
                "Rephrase the following question as one alternative web search query \
                 that captures the same information need with different wording. \
                 Reply with the query only, no quotes.\n\nQuestion: {question}"
            );
            match llm.complete(&prompt).await {
                Ok(reframed) => {
                    let reframed = reframed.lines().next().unwrap_or("").trim().to_string();
                    if reframed.is_empty() {
                        question.to_string()
                    } else {
                        reframed
                    }
                }
                Err(e) => {
                    warn!(error = %e, "question reframing failed, using verbatim query");
                    question.to_string()
                }
            }
        }
        SearchStrategy::DomainRestricted => {
            let sites = REPUTABLE_SITES
                .iter()
                .map(|s| format!("site:{s}"))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("{question} {sites}")
        }
    }
}

/// Stable cache key over `(normalized question, strategy, num_docs)`.
///
/// Normalization: NFC, lowercase, collapse whitespace, strip terminal
/// punctuation. Whitespace-only and case-only edits to the question hash
/// identically.
pub fn query_fingerprint(question: &str, strategy: SearchStrategy, num_docs: u32) -> String {
    let normalized = normalize_question(question);
    let key = format!("{normalized}|{}|{num_docs}", strategy.as_str());
    let digest = Sha256::digest(key.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

fn normalize_question(question: &str) -> String {
    let nfc: String = question.nfc().collect();
    let collapsed = nfc
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .trim_end_matches(['?', '.', '!', ';', ':', ','])
        .trim_end()
        .to_string()
}
