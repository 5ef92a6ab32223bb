//! Error types for the Veriscope core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering search, fetch, LLM, storage, and planner domains. Transient
//! external failures are distinguished from permanent ones so the planner
//! can decide between retrying within budget and failing the session.

use uuid::Uuid;

/// Top-level error type for the Veriscope core library.
#[derive(Debug, thiserror::Error)]
pub enum VeriscopeError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the web search provider.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search provider returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("search provider connection failed: {message}")]
    Connection { message: String },

    #[error("search response parse error: {message}")]
    ResponseParse { message: String },

    #[error("search rate limit queue timed out after {waited_ms}ms")]
    QueueTimeout { waited_ms: u64 },

    #[error("search provider rejected credentials")]
    AuthFailed,
}

impl SearchError {
    /// Whether retrying this search within the attempt budget makes sense.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::HttpStatus { status } => *status >= 500 || *status == 429,
            SearchError::Connection { .. } | SearchError::QueueTimeout { .. } => true,
            SearchError::ResponseParse { .. } | SearchError::AuthFailed => false,
        }
    }
}

/// Errors from fetching a single document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch of {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("fetch of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("fetch of {url} cancelled: total wall-clock budget exhausted")]
    BudgetExhausted { url: String },
}

/// Errors from LLM completion calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API request failed: {message}")]
    ApiRequest { message: String },

    #[error("LLM provider returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("LLM response parse error: {message}")]
    ResponseParse { message: String },

    #[error("LLM request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("LLM provider rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("LLM authentication failed")]
    AuthFailed,
}

impl LlmError {
    /// Transient errors are retried with backoff; permanent ones surface
    /// immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::HttpStatus { status } => *status >= 500,
            LlmError::ApiRequest { .. }
            | LlmError::Timeout { .. }
            | LlmError::RateLimited { .. } => true,
            LlmError::ResponseParse { .. } | LlmError::AuthFailed => false,
        }
    }
}

/// Errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("constraint violated: {message}")]
    Constraint { message: String },

    #[error("stored row could not be decoded: {message}")]
    Decode { message: String },
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound {
                what: "row".to_string(),
            },
            sqlx::Error::Database(db) => StorageError::Constraint {
                message: db.message().to_string(),
            },
            other => StorageError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Errors from the planner state machine.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: Uuid },

    #[error("session {session_id} is already {status}; run() is single-shot")]
    AlreadyStarted { session_id: Uuid, status: String },

    #[error("session wall-clock budget of {budget_secs}s exceeded")]
    DeadlineExceeded { budget_secs: u64 },
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {var} is not set")]
    EnvVarMissing { var: String },

    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidValue { var: String, value: String },
}

/// A type alias for results using the top-level `VeriscopeError`.
pub type Result<T> = std::result::Result<T, VeriscopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_error_transiency() {
        assert!(SearchError::HttpStatus { status: 503 }.is_transient());
        assert!(SearchError::HttpStatus { status: 429 }.is_transient());
        assert!(!SearchError::HttpStatus { status: 403 }.is_transient());
        assert!(!SearchError::AuthFailed.is_transient());
        assert!(SearchError::QueueTimeout { waited_ms: 2000 }.is_transient());
    }

    #[test]
    fn llm_error_transiency() {
        assert!(LlmError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(LlmError::RateLimited {
            retry_after_secs: 5
        }
        .is_transient());
        assert!(!LlmError::AuthFailed.is_transient());
        assert!(!LlmError::ResponseParse {
            message: "bad json".into()
        }
        .is_transient());
    }

    #[test]
    fn error_display() {
        let err = VeriscopeError::Fetch(FetchError::Timeout {
            url: "https://example.com".into(),
            timeout_secs: 8,
        });
        assert_eq!(
            err.to_string(),
            "Fetch error: fetch of https://example.com timed out after 8s"
        );
    }
}
