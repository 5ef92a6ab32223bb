//! LLM-backed claim extraction.
//!
//! One deterministic completion per document converts extracted page text
//! into atomic, self-contained factual claims with polarity tags. Short,
//! hedged, and boilerplate claims are discarded before verification.

use crate::error::LlmError;
use crate::llm::LlmClient;
use crate::model::{Claim, Document, Polarity};
use crate::verify::matcher::normalize;
use crate::verify::polarity::{hedge_count, lexical_polarity};
use crate::web::registered_domain;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Documents shorter than this carry nothing worth extracting.
const MIN_DOCUMENT_CHARS: usize = 50;

/// Page text beyond this is truncated before prompting.
const MAX_PROMPT_CHARS: usize = 8_000;

/// Legal and navigation boilerplate that slips past extraction.
const BOILERPLATE_MARKERS: &[&str] = &[
    "all rights reserved",
    "privacy policy",
    "terms of use",
    "terms of service",
    "cookie policy",
    "copyright",
    "subscribe to our newsletter",
];

/// Converts raw document text into atomic factual claims.
pub struct ClaimExtractor {
    llm: Arc<dyn LlmClient>,
    min_claim_chars: usize,
    /// Claims with more hedge markers than this are discarded.
    max_hedges: usize,
}

impl ClaimExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, min_claim_chars: usize) -> Self {
        Self {
            llm,
            min_claim_chars,
            max_hedges: 1,
        }
    }

    /// Extract claims from one document. Identical text yields the same
    /// normalized claim set under the pinned sampling settings.
    pub async fn extract(&self, document: &Document) -> Result<Vec<Claim>, LlmError> {
        if document.text.trim().len() < MIN_DOCUMENT_CHARS {
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(&document.text);
        let response = self.llm.complete(&prompt).await?;
        let claims = self.parse_response(&response, document);
        debug!(
            url = %document.url,
            claims = claims.len(),
            "claim extraction complete"
        );
        Ok(claims)
    }

    fn build_prompt(&self, text: &str) -> String {
        let text = truncate_chars(text, MAX_PROMPT_CHARS);
        format!(
            "You are an information extraction system.\n\
             \n\
             Extract ONLY explicit, factual claims from the text below.\n\
             \n\
             Rules:\n\
             - Extract only verifiable factual statements\n\
             - Each claim must be atomic and self-contained\n\
             - One claim per bullet\n\
             - Prefix each claim with [AFFIRM] if it asserts a fact, or\n\
               [NEGATE] if it denies or refutes one\n\
             - Do NOT summarize, infer, or rewrite meaning\n\
             - Ignore navigation, menus, and UI text\n\
             - If no factual claims exist, return NONE\n\
             \n\
             Return format:\n\
             - [AFFIRM] <claim>\n\
             - [NEGATE] <claim>\n\
             \n\
             TEXT:\n\
             {text}"
        )
    }

    fn parse_response(&self, response: &str, document: &Document) -> Vec<Claim> {
        let source_domain = registered_domain(&document.domain);
        let mut seen: HashSet<String> = HashSet::new();
        let mut claims = Vec::new();

        for line in response.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix('-') else {
                continue;
            };
            let rest = rest.trim();

            let (polarity, text) = if let Some(t) = rest.strip_prefix("[AFFIRM]") {
                (Polarity::Affirm, t.trim())
            } else if let Some(t) = rest.strip_prefix("[NEGATE]") {
                (Polarity::Negate, t.trim())
            } else {
                (lexical_polarity(rest), rest)
            };

            if !self.acceptable(text) {
                continue;
            }
            if !seen.insert(normalize(text)) {
                continue;
            }

            claims.push(Claim {
                text: text.to_string(),
                polarity,
                source_url: document.url.clone(),
                source_domain: source_domain.clone(),
            });
        }
        claims
    }

    fn acceptable(&self, text: &str) -> bool {
        if text.len() < self.min_claim_chars {
            return false;
        }
        if hedge_count(text) > self.max_hedges {
            return false;
        }
        let lowered = text.to_lowercase();
        !BOILERPLATE_MARKERS.iter().any(|m| lowered.contains(m))
    }
}

/// Truncate on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    struct CannedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.response.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn doc(text: &str) -> Document {
        Document {
            url: "https://www.nasa.gov/voyager".to_string(),
            domain: "www.nasa.gov".to_string(),
            title: None,
            text: text.to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn extractor(response: &str) -> ClaimExtractor {
        ClaimExtractor::new(
            Arc::new(CannedLlm {
                response: response.to_string(),
            }),
            20,
        )
    }

    const LONG_TEXT: &str = "Voyager 1 is a space probe launched by NASA on September 5, 1977, \
                             as part of the Voyager program.";

    #[tokio::test]
    async fn parses_polarity_tags_and_domain() {
        let ex = extractor(
            "- [AFFIRM] Voyager 1 was launched by NASA in 1977.\n\
             - [NEGATE] Voyager 1 was not the first probe to leave the solar system.",
        );
        let claims = ex.extract(&doc(LONG_TEXT)).await.unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].polarity, Polarity::Affirm);
        assert_eq!(claims[1].polarity, Polarity::Negate);
        assert_eq!(claims[0].source_domain, "nasa.gov");
    }

    #[tokio::test]
    async fn untagged_claims_fall_back_to_lexical_polarity() {
        let ex = extractor("- The mission never visited Pluto during its tour.");
        let claims = ex.extract(&doc(LONG_TEXT)).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].polarity, Polarity::Negate);
    }

    #[tokio::test]
    async fn discards_short_hedged_and_boilerplate_claims() {
        let ex = extractor(
            "- [AFFIRM] Too short.\n\
             - [AFFIRM] The probe may possibly perhaps have carried extra instruments.\n\
             - [AFFIRM] All rights reserved by the publisher of this website.\n\
             - [AFFIRM] Voyager 1 crossed the heliopause boundary in August 2012.",
        );
        let claims = ex.extract(&doc(LONG_TEXT)).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert!(claims[0].text.contains("heliopause"));
    }

    #[tokio::test]
    async fn deduplicates_normalized_claims() {
        let ex = extractor(
            "- [AFFIRM] Voyager 1 was launched in 1977.\n\
             - [AFFIRM] voyager 1 was launched in 1977",
        );
        let claims = ex.extract(&doc(LONG_TEXT)).await.unwrap();
        assert_eq!(claims.len(), 1);
    }

    #[tokio::test]
    async fn tiny_documents_yield_nothing_without_llm_calls() {
        let ex = extractor("- [AFFIRM] should never be parsed");
        let claims = ex.extract(&doc("too short")).await.unwrap();
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn none_response_yields_no_claims() {
        let ex = extractor("NONE");
        let claims = ex.extract(&doc(LONG_TEXT)).await.unwrap();
        assert!(claims.is_empty());
    }
}
