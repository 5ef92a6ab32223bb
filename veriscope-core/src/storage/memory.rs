//! In-memory repository implementation.
//!
//! Backs tests and credential-less local runs. Enforces the same
//! invariants as the relational schema: unique trace per
//! `(session, attempt)`, at most one snapshot per session, first-writer
//! -wins cache entries.

use super::{AnswerRepo, CacheRepo, SearchLogRepo, SessionRepo, TraceRepo};
use crate::error::StorageError;
use crate::model::{
    AnswerSnapshot, ConfidenceLevel, Evidence, PlannerTrace, QueryCacheEntry, QuerySession,
    SearchLog, SessionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    sessions: HashMap<Uuid, QuerySession>,
    traces: HashMap<Uuid, Vec<PlannerTrace>>,
    search_logs: HashMap<Uuid, Vec<SearchLog>>,
    answers: HashMap<Uuid, (AnswerSnapshot, Vec<Evidence>)>,
    cache: HashMap<String, QueryCacheEntry>,
}

/// Shared in-memory store implementing every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn create_session(&self, session: &QuerySession) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.sessions.contains_key(&session.id) {
            return Err(StorageError::Constraint {
                message: format!("session {} already exists", session.id),
            });
        }
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<QuerySession>, StorageError> {
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StorageError::NotFound {
                what: format!("session {session_id}"),
            })?;
        session.status = status;
        session.updated_at = updated_at;
        Ok(())
    }

    async fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        confidence_level: ConfidenceLevel,
        confidence_reason: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| StorageError::NotFound {
                what: format!("session {session_id}"),
            })?;
        session.status = status;
        session.final_confidence_level = Some(confidence_level);
        session.final_confidence_reason = Some(confidence_reason.to_string());
        session.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl TraceRepo for MemoryStore {
    async fn append_planner_trace(&self, trace: &PlannerTrace) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let rows = state.traces.entry(trace.session_id).or_default();
        if rows
            .iter()
            .any(|t| t.attempt_number == trace.attempt_number)
        {
            return Err(StorageError::Constraint {
                message: format!(
                    "trace for session {} attempt {} already exists",
                    trace.session_id, trace.attempt_number
                ),
            });
        }
        rows.push(trace.clone());
        Ok(())
    }

    async fn read_traces(&self, session_id: Uuid) -> Result<Vec<PlannerTrace>, StorageError> {
        let mut rows = self
            .state
            .read()
            .await
            .traces
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|t| t.attempt_number);
        Ok(rows)
    }
}

#[async_trait]
impl SearchLogRepo for MemoryStore {
    async fn append_search_log(&self, log: &SearchLog) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        state
            .search_logs
            .entry(log.session_id)
            .or_default()
            .push(log.clone());
        Ok(())
    }

    async fn read_search_logs(&self, session_id: Uuid) -> Result<Vec<SearchLog>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .search_logs
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AnswerRepo for MemoryStore {
    async fn write_answer(
        &self,
        snapshot: &AnswerSnapshot,
        evidence: &[Evidence],
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.answers.contains_key(&snapshot.session_id) {
            return Err(StorageError::Constraint {
                message: format!("snapshot for session {} already exists", snapshot.session_id),
            });
        }
        state
            .answers
            .insert(snapshot.session_id, (snapshot.clone(), evidence.to_vec()));
        Ok(())
    }

    async fn read_result(
        &self,
        session_id: Uuid,
    ) -> Result<Option<(AnswerSnapshot, Vec<Evidence>)>, StorageError> {
        Ok(self.state.read().await.answers.get(&session_id).cloned())
    }
}

#[async_trait]
impl CacheRepo for MemoryStore {
    async fn cache_get(
        &self,
        query_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueryCacheEntry>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .cache
            .get(query_hash)
            .filter(|entry| entry.expires_at > now)
            .cloned())
    }

    async fn cache_put(&self, entry: &QueryCacheEntry) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        // First writer wins while the existing entry is live; a dead
        // entry is replaceable.
        if let Some(existing) = state.cache.get(&entry.query_hash) {
            if existing.expires_at > entry.snapshot.created_at {
                return Ok(false);
            }
        }
        state.cache.insert(entry.query_hash.clone(), entry.clone());
        Ok(true)
    }
}
