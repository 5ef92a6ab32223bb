//! HTTP surface: a thin adapter over the core.
//!
//! Four JSON endpoints — submit, status, result, trace — plus a health
//! probe. The submit handler persists the session and enqueues it for a
//! worker; nothing here blocks on research.

use crate::worker::RunSession;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use veriscope_core::error::StorageError;
use veriscope_core::{Clock, QuerySession, Repositories, SessionStatus};

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub jobs: mpsc::Sender<RunSession>,
    pub trace_token: Option<String>,
    pub clock: Arc<dyn Clock>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/query", post(submit_query))
        .route("/api/query/:session_id/status", get(poll_status))
        .route("/api/query/:session_id/result", get(fetch_result))
        .route("/api/query/:session_id/trace", get(fetch_trace))
        .with_state(state)
}

/// Error responses carry `{"detail": "..."}` like the rest of the API.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        warn!(error = %err, "storage error in HTTP handler");
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Storage temporarily unavailable. Please retry later.",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    session_id: Uuid,
    status: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: String,
    is_complete: bool,
}

#[derive(Debug, Serialize)]
struct EvidenceItem {
    claim: String,
    status: String,
    source: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResultResponse {
    answer: String,
    confidence_level: String,
    confidence_reason: String,
    evidence: Vec<EvidenceItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

async fn healthz(State(state): State<AppState>) -> Response {
    // A cheap read doubles as a storage liveness probe.
    match state.repos.sessions.get_session(Uuid::nil()).await {
        Ok(_) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            warn!(error = %e, "health check storage probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded" })),
            )
                .into_response()
        }
    }
}

async fn submit_query(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Response, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "question must not be empty",
        ));
    }

    let session = QuerySession::new(question, state.clock.now());
    state.repos.sessions.create_session(&session).await?;

    if state
        .jobs
        .try_send(RunSession {
            session_id: session.id,
        })
        .is_err()
    {
        warn!(session_id = %session.id, "job queue full or closed; rejecting submission");
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service is at capacity. Please retry later.",
        ));
    }

    info!(session_id = %session.id, "session enqueued");
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            session_id: session.id,
            status: SessionStatus::Init.as_str().to_string(),
        }),
    )
        .into_response())
}

async fn poll_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let session = state
        .repos
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "unknown session_id"))?;

    Ok(Json(StatusResponse {
        status: session.status.as_str().to_string(),
        is_complete: session.status.is_terminal(),
    }))
}

async fn fetch_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let session = state
        .repos
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "unknown session_id"))?;

    if !session.status.is_terminal() {
        return Err(ApiError::new(StatusCode::CONFLICT, "result not ready"));
    }

    let stored = state.repos.answers.read_result(session_id).await?;
    let (answer, confidence_level, confidence_reason, notes, evidence) = match stored {
        Some((snapshot, evidence)) => (
            snapshot.answer_text,
            snapshot.confidence_level.as_str().to_string(),
            snapshot.confidence_reason,
            snapshot.notes,
            evidence,
        ),
        None => (
            String::new(),
            session
                .final_confidence_level
                .map(|l| l.as_str().to_string())
                .unwrap_or_else(|| "LOW".to_string()),
            session.final_confidence_reason.clone().unwrap_or_default(),
            session.final_confidence_reason,
            Vec::new(),
        ),
    };

    let evidence = evidence
        .into_iter()
        .map(|item| EvidenceItem {
            claim: item.claim.canonical_text.clone(),
            status: item.claim.status.as_str().to_string(),
            source: item.claim.source_urls().next().map(String::from),
        })
        .collect();

    Ok(Json(ResultResponse {
        answer,
        confidence_level,
        confidence_reason,
        evidence,
        notes,
    }))
}

async fn fetch_trace(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presented = headers
        .get("X-Internal-Token")
        .and_then(|v| v.to_str().ok());
    let authorized = matches!(
        (&state.trace_token, presented),
        (Some(required), Some(token)) if required.as_str() == token
    );
    if !authorized {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "forbidden"));
    }

    let session_id = parse_session_id(&session_id)?;
    state
        .repos
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "unknown session_id"))?;

    let traces = state.repos.traces.read_traces(session_id).await?;
    let logs = state.repos.search_logs.read_search_logs(session_id).await?;

    let planner_traces: Vec<_> = traces
        .into_iter()
        .map(|t| {
            json!({
                "attempt_number": t.attempt_number,
                "planner_state": t.planner_state.as_str(),
                "strategy_used": t.strategy_used.as_str(),
                "num_docs": t.num_docs,
                "verification_decision": t.verification_decision.as_str(),
                "stop_reason": t.stop_reason,
                "created_at": t.created_at,
            })
        })
        .collect();
    let search_logs: Vec<_> = logs
        .into_iter()
        .map(|l| {
            json!({
                "attempt_number": l.attempt_number,
                "query_used": l.query_used,
                "num_docs": l.num_docs,
                "success": l.success,
                "created_at": l.created_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "planner_traces": planner_traces,
        "search_logs": search_logs,
    })))
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "unknown session_id"))
}
