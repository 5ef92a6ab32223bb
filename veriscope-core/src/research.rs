//! Single-attempt research pipeline.
//!
//! One attempt is: observe the web, extract claims per document, filter
//! for relevance to the question, verify across sources, score
//! confidence, and recommend the planner's next move. Persistence is the
//! planner's job; nothing here touches storage.

use crate::confidence::ConfidenceScorer;
use crate::error::{Result, VeriscopeError};
use crate::model::{Claim, Confidence, DecisionOutcome, Document, VerifiedClaim};
use crate::verify::{shared_content_words, ClaimExtractor, VerificationEngine};
use crate::web::{WebEnvironment, WebObservation};
use tracing::{debug, info, warn};

/// A claim must share at least this many content words with the question
/// to participate in verification.
const MIN_SHARED_WORDS: usize = 2;

/// Everything one attempt produced, for the planner to act on.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub query_used: String,
    pub search_success: bool,
    pub documents: Vec<Document>,
    pub verified_claims: Vec<VerifiedClaim>,
    pub confidence: Confidence,
    pub decision: DecisionOutcome,
}

/// Coordinates one pass of the research pipeline.
pub struct ResearchAgent {
    environment: WebEnvironment,
    extractor: ClaimExtractor,
    engine: VerificationEngine,
}

impl ResearchAgent {
    pub fn new(
        environment: WebEnvironment,
        extractor: ClaimExtractor,
        engine: VerificationEngine,
    ) -> Self {
        Self {
            environment,
            extractor,
            engine,
        }
    }

    /// Run one attempt. `query` is the strategy-mutated search query;
    /// `question` is the user's original phrasing, used for relevance
    /// filtering. `attempt` and `max_attempts` inform the decision only —
    /// the planner remains the budget authority.
    pub async fn attempt(
        &self,
        question: &str,
        query: &str,
        num_docs: u32,
        attempt: u32,
        max_attempts: u32,
    ) -> Result<ResearchOutcome> {
        let WebObservation {
            query: query_used,
            documents,
            success,
        } = self.environment.run(query, num_docs).await;

        let claims = self.extract_relevant(question, &documents).await?;
        let verified_claims = self.engine.verify(&claims);
        let confidence = ConfidenceScorer::score(&verified_claims);
        let decision = self
            .engine
            .decide(&verified_claims, attempt, max_attempts);

        info!(
            attempt,
            docs = documents.len(),
            claims = claims.len(),
            groups = verified_claims.len(),
            confidence = confidence.level.as_str(),
            decision = decision.decision.as_str(),
            "research attempt complete"
        );

        Ok(ResearchOutcome {
            query_used,
            search_success: success,
            documents,
            verified_claims,
            confidence,
            decision,
        })
    }

    /// Extract claims from every document, dropping ones irrelevant to
    /// the question. Transient extraction failures skip the document;
    /// permanent ones abort the attempt.
    async fn extract_relevant(&self, question: &str, documents: &[Document]) -> Result<Vec<Claim>> {
        let mut claims = Vec::new();
        for document in documents {
            match self.extractor.extract(document).await {
                Ok(extracted) => {
                    for claim in extracted {
                        if shared_content_words(&claim.text, question) >= MIN_SHARED_WORDS {
                            claims.push(claim);
                        } else {
                            debug!(claim = %claim.text, "claim dropped as irrelevant");
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(url = %document.url, error = %e, "claim extraction skipped document");
                }
                Err(e) => return Err(VeriscopeError::Llm(e)),
            }
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::PlannerConfig;
    use crate::error::{FetchError, LlmError, SearchError};
    use crate::llm::LlmClient;
    use crate::model::{VerificationDecision, VerificationStatus};
    use crate::ratelimit::SearchRateLimiter;
    use crate::web::{DocumentFetcher, SearchHit, SearchProvider};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct FakeSearch {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl SearchProvider for FakeSearch {
        async fn search(&self, _q: &str, _n: u32) -> std::result::Result<Vec<SearchHit>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl DocumentFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    /// Replies with a canned claim list per source URL keyword.
    struct KeyedLlm {
        by_marker: Vec<(String, String)>,
    }

    #[async_trait]
    impl LlmClient for KeyedLlm {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
            for (marker, response) in &self.by_marker {
                if prompt.contains(marker.as_str()) {
                    return Ok(response.clone());
                }
            }
            Ok("NONE".to_string())
        }

        fn model_name(&self) -> &str {
            "keyed"
        }
    }

    fn page(marker: &str) -> String {
        format!(
            "<html><body><p>{marker} Voyager 1 mission history and launch details, \
             including the full chronology of the program.</p></body></html>"
        )
    }

    fn agent(hits: Vec<SearchHit>, pages: HashMap<String, String>, llm: KeyedLlm) -> ResearchAgent {
        let config = PlannerConfig::default();
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        let environment = WebEnvironment::new(
            Arc::new(FakeSearch { hits }),
            Arc::new(FakeFetcher { pages }),
            Arc::new(SearchRateLimiter::new(100, Duration::from_secs(1))),
            Arc::new(SystemClock),
            &config,
        );
        ResearchAgent::new(
            environment,
            ClaimExtractor::new(Arc::clone(&llm), config.min_claim_chars),
            VerificationEngine::new(&config),
        )
    }

    #[tokio::test]
    async fn two_agreeing_domains_accept() {
        let mut pages = HashMap::new();
        pages.insert("https://nasa.gov/v".to_string(), page("alpha"));
        pages.insert("https://britannica.com/v".to_string(), page("beta"));
        pages.insert("https://space.com/v".to_string(), page("gamma"));
        let llm = KeyedLlm {
            by_marker: vec![
                (
                    "alpha".to_string(),
                    "- [AFFIRM] The Voyager 1 probe was launched in 1977.\n\
                     - [AFFIRM] Voyager 1 carries a golden record for other civilizations."
                        .to_string(),
                ),
                (
                    "beta".to_string(),
                    "- [AFFIRM] Voyager 1 was launched in 1977.\n\
                     - [AFFIRM] Voyager 1 carries a golden record aboard."
                        .to_string(),
                ),
                (
                    "gamma".to_string(),
                    "- [AFFIRM] Voyager 1 launched in the year 1977.".to_string(),
                ),
            ],
        };
        let agent = agent(
            vec![
                SearchHit {
                    url: "https://nasa.gov/v".into(),
                    title: String::new(),
                },
                SearchHit {
                    url: "https://britannica.com/v".into(),
                    title: String::new(),
                },
                SearchHit {
                    url: "https://space.com/v".into(),
                    title: String::new(),
                },
            ],
            pages,
            llm,
        );

        let outcome = agent
            .attempt("What year was the Voyager 1 probe launched?", "voyager", 5, 1, 3)
            .await
            .unwrap();

        assert!(outcome.search_success);
        assert_eq!(outcome.documents.len(), 3);
        assert_eq!(outcome.decision.decision, VerificationDecision::Accept);
        assert!(outcome
            .verified_claims
            .iter()
            .any(|c| c.status == VerificationStatus::Verified && c.domain_count >= 2));
    }

    #[tokio::test]
    async fn zero_documents_recommend_retry() {
        let agent = agent(vec![], HashMap::new(), KeyedLlm { by_marker: vec![] });
        let outcome = agent.attempt("question text", "query", 5, 1, 3).await.unwrap();
        assert!(outcome.documents.is_empty());
        assert_eq!(outcome.decision.decision, VerificationDecision::Retry);
    }

    #[tokio::test]
    async fn irrelevant_claims_are_filtered() {
        let mut pages = HashMap::new();
        pages.insert("https://nasa.gov/v".to_string(), page("alpha"));
        let llm = KeyedLlm {
            by_marker: vec![(
                "alpha".to_string(),
                "- [AFFIRM] The museum gift shop opens at nine each morning.".to_string(),
            )],
        };
        let agent = agent(
            vec![SearchHit {
                url: "https://nasa.gov/v".into(),
                title: String::new(),
            }],
            pages,
            llm,
        );
        let outcome = agent
            .attempt("What year was the Voyager 1 probe launched?", "voyager", 5, 1, 3)
            .await
            .unwrap();
        assert!(outcome.verified_claims.is_empty());
    }
}
