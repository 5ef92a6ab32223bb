//! Repository capabilities over the relational store.
//!
//! Narrow async traits, one per aggregate, each method a short
//! transaction. The answer snapshot and its evidence commit atomically.
//! Two implementations: `MemoryStore` for tests and local runs,
//! `PgStore` for Postgres via `DATABASE_URL`.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::StorageError;
use crate::model::{
    AnswerSnapshot, ConfidenceLevel, Evidence, PlannerTrace, QueryCacheEntry, QuerySession,
    SearchLog, SessionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Query session rows.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create_session(&self, session: &QuerySession) -> Result<(), StorageError>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<QuerySession>, StorageError>;

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Terminal transition, recording the final confidence on the row.
    async fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        confidence_level: ConfidenceLevel,
        confidence_reason: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Planner decision trace, one row per attempt.
#[async_trait]
pub trait TraceRepo: Send + Sync {
    /// Rejects a duplicate `(session_id, attempt_number)`.
    async fn append_planner_trace(&self, trace: &PlannerTrace) -> Result<(), StorageError>;

    async fn read_traces(&self, session_id: Uuid) -> Result<Vec<PlannerTrace>, StorageError>;
}

/// Append-only search invocation log.
#[async_trait]
pub trait SearchLogRepo: Send + Sync {
    async fn append_search_log(&self, log: &SearchLog) -> Result<(), StorageError>;

    async fn read_search_logs(&self, session_id: Uuid) -> Result<Vec<SearchLog>, StorageError>;
}

/// Answer snapshot plus evidence; the write is a single transaction.
#[async_trait]
pub trait AnswerRepo: Send + Sync {
    async fn write_answer(
        &self,
        snapshot: &AnswerSnapshot,
        evidence: &[Evidence],
    ) -> Result<(), StorageError>;

    async fn read_result(
        &self,
        session_id: Uuid,
    ) -> Result<Option<(AnswerSnapshot, Vec<Evidence>)>, StorageError>;
}

/// Fingerprint-keyed answer cache.
#[async_trait]
pub trait CacheRepo: Send + Sync {
    /// Expired entries are never returned.
    async fn cache_get(
        &self,
        query_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueryCacheEntry>, StorageError>;

    /// Put-if-absent: the first writer wins and later writers are
    /// ignored. Returns whether this call stored the entry.
    async fn cache_put(&self, entry: &QueryCacheEntry) -> Result<bool, StorageError>;
}

/// The repository bundle handed to the planner and the HTTP layer.
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepo>,
    pub traces: Arc<dyn TraceRepo>,
    pub search_logs: Arc<dyn SearchLogRepo>,
    pub answers: Arc<dyn AnswerRepo>,
    pub cache: Arc<dyn CacheRepo>,
}

impl Repositories {
    /// All repositories backed by one shared in-memory store.
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            sessions: Arc::clone(&store) as Arc<dyn SessionRepo>,
            traces: Arc::clone(&store) as Arc<dyn TraceRepo>,
            search_logs: Arc::clone(&store) as Arc<dyn SearchLogRepo>,
            answers: Arc::clone(&store) as Arc<dyn AnswerRepo>,
            cache: store as Arc<dyn CacheRepo>,
        }
    }

    /// All repositories backed by one Postgres pool.
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            sessions: Arc::clone(&store) as Arc<dyn SessionRepo>,
            traces: Arc::clone(&store) as Arc<dyn TraceRepo>,
            search_logs: Arc::clone(&store) as Arc<dyn SearchLogRepo>,
            answers: Arc::clone(&store) as Arc<dyn AnswerRepo>,
            cache: store as Arc<dyn CacheRepo>,
        }
    }
}
