//! Web environment: search, fetch, extract.
//!
//! One invocation issues a single rate-limited search, filters candidates
//! through the domain blocklist, fetches survivors in parallel under a
//! per-URL timeout and a total wall-clock budget, and returns at most
//! `num_docs` extracted documents in search-rank order.
//!
//! A fetch failure is logged and skipped. A search failure produces an
//! empty, unsuccessful observation which the planner treats as a retry
//! candidate — never an error.

pub mod blocklist;
pub mod extract;
pub mod fetch;
pub mod search;

pub use blocklist::{host_of, is_fetchable, registered_domain, BLOCKED_DOMAINS};
pub use extract::{extract_page, ExtractedPage};
pub use fetch::{DocumentFetcher, HttpFetcher};
pub use search::{SearchHit, SearchProvider, WebSearchClient};

use crate::clock::Clock;
use crate::config::PlannerConfig;
use crate::model::Document;
use crate::ratelimit::SearchRateLimiter;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Concurrent fetches per observation.
const MAX_PARALLEL_FETCHES: usize = 8;

/// The outcome of one environment run.
#[derive(Debug, Clone)]
pub struct WebObservation {
    pub query: String,
    pub documents: Vec<Document>,
    /// False only when the search provider itself failed.
    pub success: bool,
}

impl WebObservation {
    fn failed(query: &str) -> Self {
        Self {
            query: query.to_string(),
            documents: Vec::new(),
            success: false,
        }
    }
}

/// Search + fetch + extract over the open web.
pub struct WebEnvironment {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn DocumentFetcher>,
    limiter: Arc<SearchRateLimiter>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    fetch_total_budget: Duration,
    min_doc_chars: usize,
}

impl WebEnvironment {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn DocumentFetcher>,
        limiter: Arc<SearchRateLimiter>,
        clock: Arc<dyn Clock>,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            search,
            fetcher,
            limiter,
            clock,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            fetch_total_budget: Duration::from_secs(config.fetch_total_budget_secs),
            min_doc_chars: config.min_doc_chars,
        }
    }

    /// Run one observation for `query`, returning at most `num_docs`
    /// documents in search-rank order.
    pub async fn run(&self, query: &str, num_docs: u32) -> WebObservation {
        if let Err(e) = self.limiter.acquire().await {
            warn!(query, error = %e, "search rate limit queue timed out");
            return WebObservation::failed(query);
        }

        let hits = match self.search.search(query, num_docs).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(query, error = %e, "search provider failed");
                return WebObservation::failed(query);
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let candidates: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| {
                if !is_fetchable(&hit.url) {
                    debug!(url = %hit.url, "candidate rejected by blocklist");
                    return false;
                }
                seen.insert(hit.url.clone())
            })
            .collect();

        let deadline = tokio::time::Instant::now() + self.fetch_total_budget;
        let mut documents: Vec<Document> = futures::stream::iter(candidates)
            .map(|hit| self.fetch_one(hit, deadline))
            .buffered(MAX_PARALLEL_FETCHES)
            .filter_map(|doc| async move { doc })
            .collect()
            .await;
        documents.truncate(num_docs as usize);

        info!(query, docs = documents.len(), "observation complete");
        WebObservation {
            query: query.to_string(),
            documents,
            success: true,
        }
    }

    /// Fetch and extract one candidate; `None` drops it from the result.
    async fn fetch_one(&self, hit: SearchHit, deadline: tokio::time::Instant) -> Option<Document> {
        let cutoff = (tokio::time::Instant::now() + self.fetch_timeout).min(deadline);
        let html = match tokio::time::timeout_at(cutoff, self.fetcher.fetch(&hit.url)).await {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                debug!(url = %hit.url, error = %e, "fetch failed, skipping");
                return None;
            }
            Err(_) => {
                debug!(url = %hit.url, "fetch cancelled at wall-clock budget");
                return None;
            }
        };

        let page = extract_page(&html);
        if page.text.len() < self.min_doc_chars {
            debug!(
                url = %hit.url,
                chars = page.text.len(),
                "extracted text below floor, dropping"
            );
            return None;
        }

        let domain = host_of(&hit.url)?;
        let title = page
            .title
            .or_else(|| (!hit.title.is_empty()).then(|| hit.title.clone()));

        Some(Document {
            url: hit.url,
            domain,
            title,
            text: page.text,
            fetched_at: self.clock.now(),
        })
    }
}
