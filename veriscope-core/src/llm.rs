//! LLM completion capability.
//!
//! Defines the `LlmClient` trait for model-agnostic completions and an
//! OpenAI-compatible HTTP implementation with deterministic sampling
//! settings. Transient failures are retried with exponential backoff.

use crate::config::LlmConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Capability for single-prompt LLM completions.
///
/// Implementations must be deterministic given identical prompts, modulo
/// provider-side nondeterminism bounded by the pinned sampling settings.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete one prompt and return the raw text response.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// The model identifier in use.
    fn model_name(&self) -> &str;
}

/// Execute an async operation with exponential backoff retry on transient
/// errors. Permanent errors (auth, parse) return immediately.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_transient() || attempt == max_retries {
                    return Err(e);
                }
                let backoff_ms = backoff_for(attempt, &e);
                warn!(
                    attempt = attempt + 1,
                    max = max_retries,
                    backoff_ms,
                    error = %e,
                    "retrying LLM call after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(LlmError::ApiRequest {
        message: "all retry attempts exhausted".to_string(),
    }))
}

/// Exponential backoff, respecting the provider's retry-after on 429s.
fn backoff_for(attempt: u32, err: &LlmError) -> u64 {
    let computed = 500u64.saturating_mul(2u64.saturating_pow(attempt));
    if let LlmError::RateLimited { retry_after_secs } = err {
        computed.max(retry_after_secs * 1000)
    } else {
        computed
    }
}

/// OpenAI-compatible chat completions client.
pub struct HttpLlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        }
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "top_p": self.top_p,
            "max_tokens": self.max_tokens,
        })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(prompt);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::ApiRequest {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "response missing choices[0].message.content".to_string(),
            })?;

        debug!(model = %self.model, chars = text.len(), "LLM completion received");
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        with_retry(self.max_retries, || self.complete_once(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
