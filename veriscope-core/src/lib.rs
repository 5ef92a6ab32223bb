//! # Veriscope Core
//!
//! Budgeted, cacheable research orchestration: a planner state machine
//! drives search -> extract -> verify -> score -> synthesize attempts over
//! the open web, reconciles conflicting evidence across sources, and
//! persists every decision for audit.
//!
//! The HTTP surface, worker pool, and deployment wiring live in
//! `veriscope-server`; everything here is capability-injected and runs
//! against in-memory fakes in tests.

pub mod clock;
pub mod confidence;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod planner;
pub mod ratelimit;
pub mod research;
pub mod storage;
pub mod synthesis;
pub mod verify;
pub mod web;

// Re-export commonly used types at the crate root.
pub use clock::{Clock, FixedClock, SystemClock};
pub use confidence::ConfidenceScorer;
pub use config::{Config, LlmConfig, PlannerConfig, SearchConfig};
pub use error::{Result, VeriscopeError};
pub use llm::{HttpLlmClient, LlmClient};
pub use model::{
    AnswerSnapshot, Claim, Confidence, ConfidenceLevel, DecisionOutcome, Document, Evidence,
    PlannerTrace, Polarity, QueryCacheEntry, QuerySession, SearchLog, SearchStrategy,
    SessionStatus, VerificationDecision, VerificationStatus, VerifiedClaim,
};
pub use planner::{query_fingerprint, PlannerAgent, NO_PROGRESS_REASON};
pub use ratelimit::SearchRateLimiter;
pub use research::{ResearchAgent, ResearchOutcome};
pub use storage::{
    AnswerRepo, CacheRepo, MemoryStore, PgStore, Repositories, SearchLogRepo, SessionRepo,
    TraceRepo,
};
pub use synthesis::{advisory_notes, AnswerSynthesizer, ABSTENTION_ANSWER};
pub use verify::{ClaimExtractor, VerificationEngine};
pub use web::{
    DocumentFetcher, HttpFetcher, SearchHit, SearchProvider, WebEnvironment, WebObservation,
    WebSearchClient,
};
