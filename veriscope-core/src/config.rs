//! Configuration for the research engine.
//!
//! All deployment knobs come from enumerated environment variables;
//! tuning constants that are not environment-driven (similarity threshold,
//! claim length floor, ...) live here with their defaults so tests can
//! override them directly.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration assembled from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection string for the relational store. When absent the
    /// in-memory store is used (local runs and tests).
    pub database_url: Option<String>,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub planner: PlannerConfig,
    /// Token gating the internal trace endpoint.
    pub internal_trace_token: Option<String>,
}

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
    pub endpoint: String,
    /// Process-wide search call budget per second.
    pub rate_limit_per_sec: u32,
    /// How long an excess caller queues before its attempt fails.
    pub rate_limit_max_wait_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            engine_id: String::new(),
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            rate_limit_per_sec: 10,
            rate_limit_max_wait_ms: 2_000,
        }
    }
}

/// LLM completion service configuration. Sampling settings are pinned so
/// extraction and synthesis stay deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Per-call timeout; a timeout counts as a retriable error.
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 512,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Budgets and tuning constants for the planner and verification layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Hard cap on RESEARCH -> VERIFY loops.
    pub max_attempts: u32,
    /// Hard cap on search provider calls per session, failures included.
    pub max_searches: u32,
    /// Documents requested on the first attempt.
    pub base_docs: u32,
    /// Increment added per retry attempt.
    pub docs_step: u32,
    /// Ceiling for the per-attempt document count.
    pub max_docs: u32,
    /// Total wall-clock budget for one session.
    pub session_timeout_secs: u64,
    /// Lifetime of a cache entry.
    pub cache_ttl_secs: u64,
    /// VERIFIED groups required for an ACCEPT decision.
    pub min_verified: u32,
    /// Cosine similarity floor for grouping claims.
    pub similarity_threshold: f64,
    /// Claims shorter than this are discarded at extraction.
    pub min_claim_chars: usize,
    /// Per-URL fetch timeout inside the web environment.
    pub fetch_timeout_secs: u64,
    /// Total wall-clock budget for the fetch fan-out of one search.
    pub fetch_total_budget_secs: u64,
    /// Documents with less extracted text than this are dropped.
    pub min_doc_chars: usize,
    /// Consecutive identical (confidence, decision) outcomes before the
    /// planner stops trying.
    pub no_progress_limit: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_searches: 4,
            base_docs: 5,
            docs_step: 3,
            max_docs: 15,
            session_timeout_secs: 90,
            cache_ttl_secs: 86_400,
            min_verified: 2,
            similarity_threshold: 0.72,
            min_claim_chars: 20,
            fetch_timeout_secs: 8,
            fetch_total_budget_secs: 20,
            min_doc_chars: 200,
            no_progress_limit: 2,
        }
    }
}

impl PlannerConfig {
    /// Document budget for a 1-based attempt number:
    /// `base_docs + (n - 1) * docs_step`, capped at `max_docs`.
    pub fn docs_for_attempt(&self, attempt: u32) -> u32 {
        let n = attempt.max(1);
        (self.base_docs + (n - 1) * self.docs_step).min(self.max_docs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Budget knobs fall back to their defaults when unset; credentials
    /// are read as-is and validated by the services that use them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        config.database_url = read_optional("DATABASE_URL");
        config.internal_trace_token = read_optional("INTERNAL_TRACE_TOKEN");

        if let Some(key) = read_optional("SEARCH_API_KEY") {
            config.search.api_key = key;
        }
        if let Some(id) = read_optional("SEARCH_ENGINE_ID") {
            config.search.engine_id = id;
        }
        if let Some(endpoint) = read_optional("SEARCH_ENDPOINT") {
            config.search.endpoint = endpoint;
        }
        if let Some(key) = read_optional("LLM_API_KEY") {
            config.llm.api_key = key;
        }
        if let Some(model) = read_optional("LLM_MODEL") {
            config.llm.model = model;
        }

        config.planner.max_attempts = read_parsed("MAX_ATTEMPTS", config.planner.max_attempts)?;
        config.planner.max_searches = read_parsed("MAX_SEARCHES", config.planner.max_searches)?;
        config.planner.base_docs = read_parsed("BASE_DOCS", config.planner.base_docs)?;
        config.planner.docs_step = read_parsed("DOCS_STEP", config.planner.docs_step)?;
        config.planner.session_timeout_secs = read_parsed(
            "SESSION_TIMEOUT_SECONDS",
            config.planner.session_timeout_secs,
        )?;
        config.planner.cache_ttl_secs =
            read_parsed("CACHE_TTL_SECONDS", config.planner.cache_ttl_secs)?;

        Ok(config)
    }
}

fn read_optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn read_parsed<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => {
            value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            })
        }
        _ => Ok(default),
    }
}
