//! Postgres repository implementation.
//!
//! Runtime `sqlx` queries over a shared pool; every method is one short
//! transaction. The schema is bootstrapped idempotently at connect time.
//! Enum columns are stored as their wire strings; URL lists and cached
//! snapshots as JSON text.

use super::{AnswerRepo, CacheRepo, SearchLogRepo, SessionRepo, TraceRepo};
use crate::error::StorageError;
use crate::model::{
    AnswerSnapshot, ConfidenceLevel, Evidence, PlannerTrace, QueryCacheEntry, QuerySession,
    SearchLog, SearchStrategy, SessionStatus, VerificationDecision, VerificationStatus,
    VerifiedClaim,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_sessions (
    id UUID PRIMARY KEY,
    question TEXT NOT NULL,
    status TEXT NOT NULL,
    final_confidence_level TEXT,
    final_confidence_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS planner_traces (
    session_id UUID NOT NULL REFERENCES query_sessions(id) ON DELETE CASCADE,
    attempt_number INT NOT NULL,
    planner_state TEXT NOT NULL,
    strategy_used TEXT NOT NULL,
    num_docs INT NOT NULL,
    verification_decision TEXT NOT NULL,
    stop_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (session_id, attempt_number)
);
CREATE TABLE IF NOT EXISTS search_logs (
    id BIGSERIAL PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES query_sessions(id) ON DELETE CASCADE,
    attempt_number INT NOT NULL,
    query_used TEXT NOT NULL,
    num_docs INT NOT NULL,
    success BOOLEAN NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS answer_snapshots (
    session_id UUID PRIMARY KEY REFERENCES query_sessions(id) ON DELETE CASCADE,
    answer_text TEXT NOT NULL,
    confidence_level TEXT NOT NULL,
    confidence_reason TEXT NOT NULL,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS evidence (
    id BIGSERIAL PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES query_sessions(id) ON DELETE CASCADE,
    claim_text TEXT NOT NULL,
    verification_status TEXT NOT NULL,
    supporting_urls TEXT NOT NULL,
    opposing_urls TEXT NOT NULL,
    domain_count INT NOT NULL
);
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    snapshot TEXT NOT NULL,
    evidence TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_query_cache_expires ON query_cache (expires_at);
"#;

/// Postgres-backed store implementing every repository trait.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bootstrap the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(StorageError::from)?;
        let store = Self { pool };
        store.init_schema().await?;
        info!("connected to Postgres and ensured schema");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn decode_status(row: &PgRow, column: &str) -> Result<SessionStatus, StorageError> {
    let raw: String = row.try_get(column).map_err(StorageError::from)?;
    SessionStatus::parse(&raw).ok_or_else(|| StorageError::Decode {
        message: format!("unknown session status '{raw}'"),
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(
    row: &PgRow,
    column: &str,
) -> Result<T, StorageError> {
    let raw: String = row.try_get(column).map_err(StorageError::from)?;
    serde_json::from_str(&raw).map_err(|e| StorageError::Decode {
        message: format!("column '{column}': {e}"),
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Decode {
        message: e.to_string(),
    })
}

#[async_trait]
impl SessionRepo for PgStore {
    async fn create_session(&self, session: &QuerySession) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO query_sessions (id, question, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(&session.question)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<QuerySession>, StorageError> {
        let row = sqlx::query("SELECT * FROM query_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let level: Option<String> = row.try_get("final_confidence_level")?;
            Ok(QuerySession {
                id: row.try_get("id")?,
                question: row.try_get("question")?,
                status: decode_status(&row, "status")?,
                final_confidence_level: level.as_deref().and_then(ConfidenceLevel::parse),
                final_confidence_reason: row.try_get("final_confidence_reason")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn update_session_status(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE query_sessions SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(session_id)
            .bind(status.as_str())
            .bind(updated_at)
            .execute(&self.pool)
            .await?;
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
        sqlx::query(
            "UPDATE query_sessions SET status = $2, final_confidence_level = $3, \
             final_confidence_reason = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(confidence_level.as_str())
        .bind(confidence_reason)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TraceRepo for PgStore {
    async fn append_planner_trace(&self, trace: &PlannerTrace) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO planner_traces (session_id, attempt_number, planner_state, \
             strategy_used, num_docs, verification_decision, stop_reason, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(trace.session_id)
        .bind(trace.attempt_number as i32)
        .bind(trace.planner_state.as_str())
        .bind(trace.strategy_used.as_str())
        .bind(trace.num_docs as i32)
        .bind(trace.verification_decision.as_str())
        .bind(&trace.stop_reason)
        .bind(trace.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_traces(&self, session_id: Uuid) -> Result<Vec<PlannerTrace>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM planner_traces WHERE session_id = $1 ORDER BY attempt_number ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let strategy: String = row.try_get("strategy_used")?;
                let decision: String = row.try_get("verification_decision")?;
                Ok(PlannerTrace {
                    session_id: row.try_get("session_id")?,
                    attempt_number: row.try_get::<i32, _>("attempt_number")? as u32,
                    planner_state: decode_status(&row, "planner_state")?,
                    strategy_used: SearchStrategy::parse(&strategy).ok_or_else(|| {
                        StorageError::Decode {
                            message: format!("unknown strategy '{strategy}'"),
                        }
                    })?,
                    num_docs: row.try_get::<i32, _>("num_docs")? as u32,
                    verification_decision: VerificationDecision::parse(&decision).ok_or_else(
                        || StorageError::Decode {
                            message: format!("unknown decision '{decision}'"),
                        },
                    )?,
                    stop_reason: row.try_get("stop_reason")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SearchLogRepo for PgStore {
    async fn append_search_log(&self, log: &SearchLog) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO search_logs (session_id, attempt_number, query_used, num_docs, \
             success, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(log.session_id)
        .bind(log.attempt_number as i32)
        .bind(&log.query_used)
        .bind(log.num_docs as i32)
        .bind(log.success)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_search_logs(&self, session_id: Uuid) -> Result<Vec<SearchLog>, StorageError> {
        let rows =
            sqlx::query("SELECT * FROM search_logs WHERE session_id = $1 ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| {
                Ok(SearchLog {
                    session_id: row.try_get("session_id")?,
                    attempt_number: row.try_get::<i32, _>("attempt_number")? as u32,
                    query_used: row.try_get("query_used")?,
                    num_docs: row.try_get::<i32, _>("num_docs")? as u32,
                    success: row.try_get("success")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl AnswerRepo for PgStore {
    async fn write_answer(
        &self,
        snapshot: &AnswerSnapshot,
        evidence: &[Evidence],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO answer_snapshots (session_id, answer_text, confidence_level, \
             confidence_reason, notes, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(snapshot.session_id)
        .bind(&snapshot.answer_text)
        .bind(snapshot.confidence_level.as_str())
        .bind(&snapshot.confidence_reason)
        .bind(&snapshot.notes)
        .bind(snapshot.created_at)
        .execute(&mut *tx)
        .await?;

        for item in evidence {
            sqlx::query(
                "INSERT INTO evidence (session_id, claim_text, verification_status, \
                 supporting_urls, opposing_urls, domain_count) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.session_id)
            .bind(&item.claim.canonical_text)
            .bind(item.claim.status.as_str())
            .bind(encode_json(&item.claim.supporting_urls)?)
            .bind(encode_json(&item.claim.opposing_urls)?)
            .bind(item.claim.domain_count as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn read_result(
        &self,
        session_id: Uuid,
    ) -> Result<Option<(AnswerSnapshot, Vec<Evidence>)>, StorageError> {
        let Some(row) = sqlx::query("SELECT * FROM answer_snapshots WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let level: String = row.try_get("confidence_level")?;
        let snapshot = AnswerSnapshot {
            session_id: row.try_get("session_id")?,
            answer_text: row.try_get("answer_text")?,
            confidence_level: ConfidenceLevel::parse(&level).ok_or_else(|| {
                StorageError::Decode {
                    message: format!("unknown confidence level '{level}'"),
                }
            })?,
            confidence_reason: row.try_get("confidence_reason")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        };

        let rows = sqlx::query("SELECT * FROM evidence WHERE session_id = $1 ORDER BY id ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        let evidence = rows
            .into_iter()
            .map(|row| {
                let status: String = row.try_get("verification_status")?;
                Ok(Evidence {
                    session_id: row.try_get("session_id")?,
                    claim: VerifiedClaim {
                        canonical_text: row.try_get("claim_text")?,
                        status: VerificationStatus::parse(&status).ok_or_else(|| {
                            StorageError::Decode {
                                message: format!("unknown verification status '{status}'"),
                            }
                        })?,
                        supporting_urls: decode_json(&row, "supporting_urls")?,
                        opposing_urls: decode_json(&row, "opposing_urls")?,
                        domain_count: row.try_get::<i32, _>("domain_count")? as u32,
                    },
                })
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        Ok(Some((snapshot, evidence)))
    }
}

#[async_trait]
impl CacheRepo for PgStore {
    async fn cache_get(
        &self,
        query_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueryCacheEntry>, StorageError> {
        let row = sqlx::query("SELECT * FROM query_cache WHERE query_hash = $1 AND expires_at > $2")
            .bind(query_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(QueryCacheEntry {
                query_hash: row.try_get("query_hash")?,
                snapshot: decode_json(&row, "snapshot")?,
                evidence: decode_json(&row, "evidence")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn cache_put(&self, entry: &QueryCacheEntry) -> Result<bool, StorageError> {
        // First writer wins while the existing entry is live; a dead
        // entry is replaceable.
        let result = sqlx::query(
            "INSERT INTO query_cache (query_hash, snapshot, evidence, expires_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (query_hash) DO UPDATE SET \
             snapshot = EXCLUDED.snapshot, evidence = EXCLUDED.evidence, \
             expires_at = EXCLUDED.expires_at WHERE query_cache.expires_at <= now()",
        )
        .bind(&entry.query_hash)
        .bind(encode_json(&entry.snapshot)?)
        .bind(encode_json(&entry.evidence)?)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
