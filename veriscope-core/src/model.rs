//! Durable entities and core value types.
//!
//! Everything a `QuerySession` owns — traces, search logs, documents,
//! claims, the answer snapshot, evidence — plus the enums that drive the
//! planner state machine. String renderings match what is persisted and
//! what the HTTP layer returns (`HIGH`, `VERIFIED`, `RETRY`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a query session. Advances monotonically; `Done` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Init,
    Research,
    Verify,
    Synthesize,
    Done,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Init => "INIT",
            SessionStatus::Research => "RESEARCH",
            SessionStatus::Verify => "VERIFY",
            SessionStatus::Synthesize => "SYNTHESIZE",
            SessionStatus::Done => "DONE",
            SessionStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INIT" => Some(SessionStatus::Init),
            "RESEARCH" => Some(SessionStatus::Research),
            "VERIFY" => Some(SessionStatus::Verify),
            "SYNTHESIZE" => Some(SessionStatus::Synthesize),
            "DONE" => Some(SessionStatus::Done),
            "FAILED" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stance a claim takes toward the fact it states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Affirm,
    Negate,
    Unspecified,
}

impl Polarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Affirm => "AFFIRM",
            Polarity::Negate => "NEGATE",
            Polarity::Unspecified => "UNSPECIFIED",
        }
    }
}

/// Resolution of a claim group after cross-source verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    Unverified,
    Conflict,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Unverified => "UNVERIFIED",
            VerificationStatus::Conflict => "CONFLICT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VERIFIED" => Some(VerificationStatus::Verified),
            "UNVERIFIED" => Some(VerificationStatus::Unverified),
            "CONFLICT" => Some(VerificationStatus::Conflict),
            _ => None,
        }
    }
}

/// Aggregate confidence in the synthesized answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(ConfidenceLevel::High),
            "MEDIUM" => Some(ConfidenceLevel::Medium),
            "LOW" => Some(ConfidenceLevel::Low),
            _ => None,
        }
    }
}

/// The planner's next-action directive after verifying an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationDecision {
    Accept,
    Retry,
    Stop,
}

impl VerificationDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationDecision::Accept => "ACCEPT",
            VerificationDecision::Retry => "RETRY",
            VerificationDecision::Stop => "STOP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACCEPT" => Some(VerificationDecision::Accept),
            "RETRY" => Some(VerificationDecision::Retry),
            "STOP" => Some(VerificationDecision::Stop),
            _ => None,
        }
    }
}

/// Question-mutation policy used to form the search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStrategy {
    Verbatim,
    KeywordExpansion,
    QuestionReframing,
    DomainRestricted,
}

impl SearchStrategy {
    /// Rotation order. The first attempt always runs `Verbatim`; each
    /// retry advances one step and the schedule cycles.
    pub const ROTATION: [SearchStrategy; 4] = [
        SearchStrategy::Verbatim,
        SearchStrategy::KeywordExpansion,
        SearchStrategy::QuestionReframing,
        SearchStrategy::DomainRestricted,
    ];

    /// Strategy for a 1-based attempt number.
    pub fn for_attempt(attempt: u32) -> Self {
        Self::ROTATION[((attempt.max(1) - 1) as usize) % Self::ROTATION.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Verbatim => "VERBATIM",
            SearchStrategy::KeywordExpansion => "KEYWORD_EXPANSION",
            SearchStrategy::QuestionReframing => "QUESTION_REFRAMING",
            SearchStrategy::DomainRestricted => "DOMAIN_RESTRICTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VERBATIM" => Some(SearchStrategy::Verbatim),
            "KEYWORD_EXPANSION" => Some(SearchStrategy::KeywordExpansion),
            "QUESTION_REFRAMING" => Some(SearchStrategy::QuestionReframing),
            "DOMAIN_RESTRICTED" => Some(SearchStrategy::DomainRestricted),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user question and its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySession {
    pub id: Uuid,
    pub question: String,
    pub status: SessionStatus,
    /// Confidence recorded at the terminal transition, so `result` can be
    /// served even if the snapshot read races the final write.
    pub final_confidence_level: Option<ConfidenceLevel>,
    pub final_confidence_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuerySession {
    pub fn new(question: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            status: SessionStatus::Init,
            final_confidence_level: None,
            final_confidence_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One attempt row in the planner's decision trace. At most one per
/// `(session_id, attempt_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerTrace {
    pub session_id: Uuid,
    pub attempt_number: u32,
    pub planner_state: SessionStatus,
    pub strategy_used: SearchStrategy,
    pub num_docs: u32,
    pub verification_decision: VerificationDecision,
    pub stop_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One search invocation. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLog {
    pub session_id: Uuid,
    pub attempt_number: u32,
    pub query_used: String,
    pub num_docs: u32,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// A fetched and extracted web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub text: String,
    pub fetched_at: DateTime<Utc>,
}

/// An atomic factual statement extracted from one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub polarity: Polarity,
    pub source_url: String,
    pub source_domain: String,
}

/// A claim group's resolution after cross-source verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedClaim {
    pub canonical_text: String,
    pub status: VerificationStatus,
    pub supporting_urls: Vec<String>,
    pub opposing_urls: Vec<String>,
    /// Count of distinct registered domains among supporting sources.
    pub domain_count: u32,
}

impl VerifiedClaim {
    /// All source URLs, supporting first.
    pub fn source_urls(&self) -> impl Iterator<Item = &str> {
        self.supporting_urls
            .iter()
            .chain(self.opposing_urls.iter())
            .map(String::as_str)
    }
}

/// Final output of a session. At most one per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSnapshot {
    pub session_id: Uuid,
    pub answer_text: String,
    pub confidence_level: ConfidenceLevel,
    pub confidence_reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A verified claim persisted against a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub session_id: Uuid,
    pub claim: VerifiedClaim,
}

/// Cached answer for an exact query fingerprint. Holds an immutable copy
/// of the snapshot and evidence rather than a reference to the producing
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheEntry {
    pub query_hash: String,
    pub snapshot: AnswerSnapshot,
    pub evidence: Vec<VerifiedClaim>,
    pub expires_at: DateTime<Utc>,
}

/// `(level, reason)` pair produced by the confidence scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub reason: String,
}

/// The verifier's directive plus the reasoning behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: VerificationDecision,
    pub reason: String,
    /// Hint for the next strategy pick when the decision is `Retry`.
    pub recommendation: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            SessionStatus::Init,
            SessionStatus::Research,
            SessionStatus::Verify,
            SessionStatus::Synthesize,
            SessionStatus::Done,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("BOGUS"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Done.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Research.is_terminal());
        assert!(!SessionStatus::Init.is_terminal());
    }

    #[test]
    fn strategy_rotation_cycles() {
        assert_eq!(SearchStrategy::for_attempt(1), SearchStrategy::Verbatim);
        assert_eq!(
            SearchStrategy::for_attempt(2),
            SearchStrategy::KeywordExpansion
        );
        assert_eq!(
            SearchStrategy::for_attempt(4),
            SearchStrategy::DomainRestricted
        );
        // Schedule cycles past the rotation length.
        assert_eq!(SearchStrategy::for_attempt(5), SearchStrategy::Verbatim);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ConfidenceLevel::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
        let status: VerificationStatus = serde_json::from_str("\"CONFLICT\"").unwrap();
        assert_eq!(status, VerificationStatus::Conflict);
    }
}
