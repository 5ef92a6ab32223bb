//! Web search provider capability.
//!
//! One implementation speaks the Google Custom Search JSON API; tests
//! substitute in-memory fakes.

use crate::config::SearchConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A single ranked search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

/// Capability for issuing one web search and receiving ranked candidates.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, SearchError>;
}

/// Google Custom Search JSON API client.
pub struct WebSearchClient {
    client: Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl WebSearchClient {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            engine_id: config.engine_id.clone(),
            endpoint: config.endpoint.clone(),
        }
    }
}

#[async_trait]
impl SearchProvider for WebSearchClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", &limit.to_string()),
            ])
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SearchError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SearchError::AuthFailed);
        }
        if !status.is_success() {
            return Err(SearchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SearchError::ResponseParse {
                message: e.to_string(),
            })?;

        let hits: Vec<SearchHit> = payload["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let url = item["link"].as_str()?.to_string();
                        let title = item["title"].as_str().unwrap_or_default().to_string();
                        Some(SearchHit { url, title })
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(query, count = hits.len(), "search returned candidates");
        Ok(hits)
    }
}
