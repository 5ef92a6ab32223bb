//! The planner state machine.
//!
//! Drives one query session from INIT to DONE or FAILED: enforces the
//! attempt and search budgets and the session wall-clock deadline,
//! rotates search strategies on retries, consults and populates the
//! query cache, and persists a decision trace per attempt. Within a
//! session everything here is sequential; concurrency lives in the web
//! environment's fetch fan-out and in running many sessions at once.

pub mod strategy;

pub use strategy::{mutate_query, query_fingerprint};

use crate::clock::Clock;
use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result, VeriscopeError};
use crate::llm::LlmClient;
use crate::model::{
    AnswerSnapshot, ConfidenceLevel, Evidence, PlannerTrace, QueryCacheEntry, QuerySession,
    SearchLog, SearchStrategy, SessionStatus, VerificationDecision, VerificationStatus,
};
use crate::research::{ResearchAgent, ResearchOutcome};
use crate::storage::Repositories;
use crate::synthesis::{advisory_notes, AnswerSynthesizer, ABSTENTION_ANSWER};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reason recorded when consecutive attempts keep landing on the same
/// outcome and the planner gives up early.
pub const NO_PROGRESS_REASON: &str = "No progress across attempts.";

/// Orchestrates a session through the research/verify/synthesize loop.
pub struct PlannerAgent {
    research: ResearchAgent,
    synthesizer: AnswerSynthesizer,
    llm: Arc<dyn LlmClient>,
    repos: Repositories,
    clock: Arc<dyn Clock>,
    config: PlannerConfig,
}

/// Mutable bookkeeping for one `run`.
struct RunContext {
    attempt: u32,
    searches_used: u32,
    strategy: SearchStrategy,
    num_docs: u32,
    last_outcome: Option<ResearchOutcome>,
    last_progress: Option<(ConfidenceLevel, VerificationDecision)>,
    no_progress_count: u32,
    last_query_hash: Option<String>,
    /// An attempt has started but its trace row is not yet written.
    trace_pending: bool,
    deadline: tokio::time::Instant,
}

impl RunContext {
    fn new(config: &PlannerConfig) -> Self {
        Self {
            attempt: 1,
            searches_used: 0,
            strategy: SearchStrategy::Verbatim,
            num_docs: config.base_docs,
            last_outcome: None,
            last_progress: None,
            no_progress_count: 0,
            last_query_hash: None,
            trace_pending: false,
            deadline: tokio::time::Instant::now() + config.session_timeout(),
        }
    }

    fn record_progress(&mut self, level: ConfidenceLevel, decision: VerificationDecision) {
        if self.last_progress == Some((level, decision)) {
            self.no_progress_count += 1;
        } else {
            self.no_progress_count = 0;
        }
        self.last_progress = Some((level, decision));
    }
}

impl PlannerAgent {
    pub fn new(
        research: ResearchAgent,
        synthesizer: AnswerSynthesizer,
        llm: Arc<dyn LlmClient>,
        repos: Repositories,
        clock: Arc<dyn Clock>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            research,
            synthesizer,
            llm,
            repos,
            clock,
            config,
        }
    }

    /// Drive the session to a terminal status.
    ///
    /// Single-shot per session: a non-INIT status means `run` already
    /// executed (or is executing), so the call logs loudly and returns
    /// without touching any state.
    pub async fn run(&self, session_id: Uuid) -> Result<()> {
        let session = self
            .repos
            .sessions
            .get_session(session_id)
            .await
            .map_err(VeriscopeError::Storage)?
            .ok_or(VeriscopeError::Planner(PlannerError::SessionNotFound {
                session_id,
            }))?;

        if session.status != SessionStatus::Init {
            warn!(
                %session_id,
                status = %session.status,
                "run() invoked on a non-INIT session; ignoring"
            );
            return Ok(());
        }

        let mut ctx = RunContext::new(&self.config);
        match self.drive(&session, &mut ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(%session_id, error = %e, "planner crashed; failing session");
                self.finalize_failure(&session, &mut ctx, format!("Planner execution failed: {e}"))
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(&self, session: &QuerySession, ctx: &mut RunContext) -> Result<()> {
        loop {
            if tokio::time::Instant::now() >= ctx.deadline {
                return Err(VeriscopeError::Planner(PlannerError::DeadlineExceeded {
                    budget_secs: self.config.session_timeout_secs,
                }));
            }

            ctx.strategy = SearchStrategy::for_attempt(ctx.attempt);
            ctx.num_docs = self.config.docs_for_attempt(ctx.attempt);
            self.set_status(session.id, SessionStatus::Research).await?;

            let query_hash = query_fingerprint(&session.question, ctx.strategy, ctx.num_docs);
            ctx.last_query_hash = Some(query_hash.clone());

            // Retries probe the cache before touching the web; the first
            // attempt never does.
            if ctx.attempt >= 2 {
                if let Some(entry) = self
                    .repos
                    .cache
                    .cache_get(&query_hash, self.clock.now())
                    .await
                    .map_err(VeriscopeError::Storage)?
                {
                    info!(session_id = %session.id, attempt = ctx.attempt, "query cache hit");
                    return self.finish_from_cache(session, ctx, entry).await;
                }
            }

            if ctx.searches_used >= self.config.max_searches {
                info!(
                    session_id = %session.id,
                    searches = ctx.searches_used,
                    "search budget exhausted"
                );
                return match ctx.last_outcome.take() {
                    Some(outcome) => {
                        self.synthesize_and_finish(session, ctx, &outcome, false, None)
                            .await
                    }
                    None => {
                        self.fail(
                            session,
                            ctx,
                            "Search budget exhausted before any evidence was gathered."
                                .to_string(),
                        )
                        .await
                    }
                };
            }

            ctx.searches_used += 1;
            ctx.trace_pending = true;

            let query = mutate_query(&session.question, ctx.strategy, self.llm.as_ref()).await;
            let outcome = self
                .research
                .attempt(
                    &session.question,
                    &query,
                    ctx.num_docs,
                    ctx.attempt,
                    self.config.max_attempts,
                )
                .await?;

            // Search log commits before this attempt's trace row.
            self.repos
                .search_logs
                .append_search_log(&SearchLog {
                    session_id: session.id,
                    attempt_number: ctx.attempt,
                    query_used: outcome.query_used.clone(),
                    num_docs: outcome.documents.len() as u32,
                    success: outcome.search_success,
                    created_at: self.clock.now(),
                })
                .await
                .map_err(VeriscopeError::Storage)?;

            if outcome.documents.is_empty() {
                let budget_remains = ctx.attempt < self.config.max_attempts
                    && ctx.searches_used < self.config.max_searches;
                let decision = if budget_remains {
                    VerificationDecision::Retry
                } else {
                    VerificationDecision::Stop
                };
                self.append_trace(
                    session.id,
                    ctx,
                    SessionStatus::Research,
                    decision,
                    Some("No usable documents were returned for this query.".to_string()),
                )
                .await?;
                ctx.last_outcome = Some(outcome);
                if budget_remains {
                    debug!(
                        session_id = %session.id,
                        attempt = ctx.attempt,
                        "no documents; rotating strategy"
                    );
                    ctx.attempt += 1;
                    continue;
                }
                return self
                    .fail(
                        session,
                        ctx,
                        "No usable documents were retrieved within the search budget."
                            .to_string(),
                    )
                    .await;
            }

            self.set_status(session.id, SessionStatus::Verify).await?;
            ctx.record_progress(outcome.confidence.level, outcome.decision.decision);

            // A retry that keeps landing on the same outcome is forced to
            // stop, and the forced decision is what the trace records.
            let no_progress = outcome.decision.decision == VerificationDecision::Retry
                && ctx.no_progress_count >= self.config.no_progress_limit;
            let (decision, stop_reason) = if no_progress {
                info!(session_id = %session.id, "no progress across attempts; stopping early");
                (VerificationDecision::Stop, NO_PROGRESS_REASON.to_string())
            } else {
                (outcome.decision.decision, outcome.decision.reason.clone())
            };
            self.append_trace(session.id, ctx, SessionStatus::Verify, decision, Some(stop_reason))
                .await?;

            if let Some(recommendation) = &outcome.decision.recommendation {
                debug!(session_id = %session.id, %recommendation, "verifier recommendation");
            }

            match decision {
                VerificationDecision::Accept => {
                    return self
                        .synthesize_and_finish(session, ctx, &outcome, true, None)
                        .await;
                }
                VerificationDecision::Stop => {
                    let reason_override = no_progress.then(|| NO_PROGRESS_REASON.to_string());
                    return self
                        .synthesize_and_finish(session, ctx, &outcome, false, reason_override)
                        .await;
                }
                VerificationDecision::Retry => {
                    if ctx.attempt >= self.config.max_attempts {
                        return self
                            .synthesize_and_finish(session, ctx, &outcome, false, None)
                            .await;
                    }
                    ctx.last_outcome = Some(outcome);
                    ctx.attempt += 1;
                }
            }
        }
    }

    /// SYNTHESIZE then DONE. Snapshot and evidence commit atomically
    /// before the terminal status; the cache is written only for
    /// accepted results, first writer wins. A `reason_override` replaces
    /// the scorer's reason on the persisted snapshot and session row.
    async fn synthesize_and_finish(
        &self,
        session: &QuerySession,
        ctx: &RunContext,
        outcome: &ResearchOutcome,
        accepted: bool,
        reason_override: Option<String>,
    ) -> Result<()> {
        self.set_status(session.id, SessionStatus::Synthesize).await?;

        let mut confidence = outcome.confidence.clone();
        let has_verified = outcome
            .verified_claims
            .iter()
            .any(|c| c.status == VerificationStatus::Verified);
        if !accepted && !has_verified {
            // Best-effort synthesis on partial evidence.
            confidence.level = ConfidenceLevel::Low;
        }
        if let Some(reason) = reason_override {
            confidence.reason = reason;
        }

        let answer_text = self
            .synthesizer
            .synthesize(&session.question, &outcome.verified_claims, &confidence)
            .await
            .map_err(VeriscopeError::Llm)?;

        let now = self.clock.now();
        let snapshot = AnswerSnapshot {
            session_id: session.id,
            answer_text,
            confidence_level: confidence.level,
            confidence_reason: confidence.reason.clone(),
            notes: advisory_notes(confidence.level),
            created_at: now,
        };
        let evidence: Vec<Evidence> = outcome
            .verified_claims
            .iter()
            .map(|claim| Evidence {
                session_id: session.id,
                claim: claim.clone(),
            })
            .collect();

        self.repos
            .answers
            .write_answer(&snapshot, &evidence)
            .await
            .map_err(VeriscopeError::Storage)?;
        self.repos
            .sessions
            .finalize_session(
                session.id,
                SessionStatus::Done,
                confidence.level,
                &confidence.reason,
                now,
            )
            .await
            .map_err(VeriscopeError::Storage)?;

        if accepted {
            if let Some(query_hash) = &ctx.last_query_hash {
                let entry = QueryCacheEntry {
                    query_hash: query_hash.clone(),
                    snapshot: snapshot.clone(),
                    evidence: outcome.verified_claims.clone(),
                    expires_at: now + chrono::Duration::seconds(self.config.cache_ttl_secs as i64),
                };
                match self.repos.cache.cache_put(&entry).await {
                    Ok(true) => debug!(session_id = %session.id, "cache entry stored"),
                    Ok(false) => {
                        debug!(session_id = %session.id, "cache entry exists; first writer wins")
                    }
                    Err(e) => warn!(session_id = %session.id, error = %e, "cache write failed"),
                }
            }
        }

        info!(
            session_id = %session.id,
            attempts = ctx.attempt,
            confidence = confidence.level.as_str(),
            accepted,
            "session complete"
        );
        Ok(())
    }

    /// Serve a cached answer: trace the attempt, copy the immutable
    /// snapshot to this session, and finish.
    async fn finish_from_cache(
        &self,
        session: &QuerySession,
        ctx: &mut RunContext,
        entry: QueryCacheEntry,
    ) -> Result<()> {
        self.append_trace(
            session.id,
            ctx,
            SessionStatus::Research,
            VerificationDecision::Accept,
            Some("Answer served from query cache.".to_string()),
        )
        .await?;
        self.set_status(session.id, SessionStatus::Synthesize).await?;

        let now = self.clock.now();
        let snapshot = AnswerSnapshot {
            session_id: session.id,
            answer_text: entry.snapshot.answer_text.clone(),
            confidence_level: entry.snapshot.confidence_level,
            confidence_reason: entry.snapshot.confidence_reason.clone(),
            notes: entry.snapshot.notes.clone(),
            created_at: now,
        };
        let evidence: Vec<Evidence> = entry
            .evidence
            .iter()
            .map(|claim| Evidence {
                session_id: session.id,
                claim: claim.clone(),
            })
            .collect();

        self.repos
            .answers
            .write_answer(&snapshot, &evidence)
            .await
            .map_err(VeriscopeError::Storage)?;
        self.repos
            .sessions
            .finalize_session(
                session.id,
                SessionStatus::Done,
                snapshot.confidence_level,
                &snapshot.confidence_reason,
                now,
            )
            .await
            .map_err(VeriscopeError::Storage)?;

        info!(session_id = %session.id, "session served from cache");
        Ok(())
    }

    /// FAILED terminal path: abstention snapshot plus whatever evidence
    /// was gathered, then the FAILED status.
    async fn fail(&self, session: &QuerySession, ctx: &RunContext, reason: String) -> Result<()> {
        let now = self.clock.now();
        let evidence: Vec<Evidence> = ctx
            .last_outcome
            .as_ref()
            .map(|outcome| {
                outcome
                    .verified_claims
                    .iter()
                    .map(|claim| Evidence {
                        session_id: session.id,
                        claim: claim.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let snapshot = AnswerSnapshot {
            session_id: session.id,
            answer_text: ABSTENTION_ANSWER.to_string(),
            confidence_level: ConfidenceLevel::Low,
            confidence_reason: reason.clone(),
            notes: Some(reason.clone()),
            created_at: now,
        };
        match self.repos.answers.write_answer(&snapshot, &evidence).await {
            Ok(()) => {}
            // A snapshot may already exist if the crash landed between
            // the answer write and the terminal status update.
            Err(crate::error::StorageError::Constraint { message }) => {
                debug!(session_id = %session.id, %message, "snapshot already present")
            }
            Err(e) => return Err(VeriscopeError::Storage(e)),
        }
        self.repos
            .sessions
            .finalize_session(session.id, SessionStatus::Failed, ConfidenceLevel::Low, &reason, now)
            .await
            .map_err(VeriscopeError::Storage)?;

        warn!(session_id = %session.id, %reason, "session failed");
        Ok(())
    }

    /// Deferred finalizer for crashes: best-effort trace for the
    /// in-flight attempt, abstention snapshot, FAILED status. Storage
    /// errors here are logged, not propagated.
    async fn finalize_failure(&self, session: &QuerySession, ctx: &mut RunContext, reason: String) {
        if ctx.trace_pending {
            let trace = PlannerTrace {
                session_id: session.id,
                attempt_number: ctx.attempt,
                planner_state: SessionStatus::Research,
                strategy_used: ctx.strategy,
                num_docs: ctx.num_docs,
                verification_decision: VerificationDecision::Stop,
                stop_reason: Some(reason.clone()),
                created_at: self.clock.now(),
            };
            if let Err(e) = self.repos.traces.append_planner_trace(&trace).await {
                warn!(session_id = %session.id, error = %e, "crash trace write failed");
            }
            ctx.trace_pending = false;
        }

        if let Err(e) = self.fail(session, ctx, reason).await {
            warn!(session_id = %session.id, error = %e, "crash finalization failed");
        }
    }

    async fn append_trace(
        &self,
        session_id: Uuid,
        ctx: &mut RunContext,
        state: SessionStatus,
        decision: VerificationDecision,
        stop_reason: Option<String>,
    ) -> Result<()> {
        let trace = PlannerTrace {
            session_id,
            attempt_number: ctx.attempt,
            planner_state: state,
            strategy_used: ctx.strategy,
            num_docs: ctx.num_docs,
            verification_decision: decision,
            stop_reason,
            created_at: self.clock.now(),
        };
        self.repos
            .traces
            .append_planner_trace(&trace)
            .await
            .map_err(VeriscopeError::Storage)?;
        ctx.trace_pending = false;
        Ok(())
    }

    async fn set_status(&self, session_id: Uuid, status: SessionStatus) -> Result<()> {
        self.repos
            .sessions
            .update_session_status(session_id, status, self.clock.now())
            .await
            .map_err(VeriscopeError::Storage)
    }
}
