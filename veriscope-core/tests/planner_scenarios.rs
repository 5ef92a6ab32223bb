//! End-to-end planner scenarios against in-memory fakes for every
//! external capability: search, fetch, LLM, storage, clock.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use veriscope_core::error::{FetchError, LlmError, SearchError};
use veriscope_core::{
    AnswerSynthesizer, ClaimExtractor, Clock, ConfidenceLevel, DocumentFetcher, FixedClock,
    LlmClient, PlannerAgent, PlannerConfig, QuerySession, Repositories, ResearchAgent, SearchHit,
    SearchProvider, SearchRateLimiter, SearchStrategy, SessionStatus, SystemClock,
    VerificationDecision, VerificationEngine, VerificationStatus, WebEnvironment,
    ABSTENTION_ANSWER, NO_PROGRESS_REASON,
};

/// Search provider that replays a scripted result list per call; the
/// final entry repeats once the script runs out.
struct ScriptedSearch {
    script: Mutex<Vec<Vec<SearchHit>>>,
    calls: AtomicU32,
}

impl ScriptedSearch {
    fn new(script: Vec<Vec<SearchHit>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, _query: &str, _limit: u32) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            Ok(script.first().cloned().unwrap_or_default())
        }
    }
}

struct MapFetcher {
    pages: HashMap<String, String>,
}

#[async_trait]
impl DocumentFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Routes extraction prompts by a marker embedded in the document text,
/// answers synthesis prompts with a fixed response, and reframes
/// questions deterministically.
struct FakeLlm {
    extractions: Vec<(String, String)>,
    synthesis_answer: String,
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.contains("information extraction system") {
            for (marker, response) in &self.extractions {
                if prompt.contains(marker.as_str()) {
                    return Ok(response.clone());
                }
            }
            return Ok("NONE".to_string());
        }
        if prompt.contains("research summarizer") {
            return Ok(self.synthesis_answer.clone());
        }
        // Question reframing.
        Ok("rephrased search query".to_string())
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

fn hit(url: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: "title".to_string(),
    }
}

fn page(marker: &str) -> String {
    let filler = "This article discusses the subject at length, providing context, \
                  background, chronology, and enough body text to clear the extraction \
                  floor applied by the web environment. "
        .repeat(2);
    format!(
        "<html><head><title>Doc</title></head><body><article>\
         <p>{marker} {filler}</p></article></body></html>"
    )
}

struct Harness {
    planner: PlannerAgent,
    repos: Repositories,
    search: Arc<ScriptedSearch>,
}

fn harness(
    script: Vec<Vec<SearchHit>>,
    pages: HashMap<String, String>,
    llm: FakeLlm,
    repos: Repositories,
    config: PlannerConfig,
) -> Harness {
    harness_with_clock(script, pages, llm, repos, config, Arc::new(SystemClock))
}

fn harness_with_clock(
    script: Vec<Vec<SearchHit>>,
    pages: HashMap<String, String>,
    llm: FakeLlm,
    repos: Repositories,
    config: PlannerConfig,
    clock: Arc<dyn Clock>,
) -> Harness {
    let search = Arc::new(ScriptedSearch::new(script));
    let llm: Arc<dyn LlmClient> = Arc::new(llm);
    let environment = WebEnvironment::new(
        Arc::clone(&search) as Arc<dyn SearchProvider>,
        Arc::new(MapFetcher { pages }),
        Arc::new(SearchRateLimiter::new(100, Duration::from_secs(1))),
        Arc::clone(&clock),
        &config,
    );
    let research = ResearchAgent::new(
        environment,
        ClaimExtractor::new(Arc::clone(&llm), config.min_claim_chars),
        VerificationEngine::new(&config),
    );
    let planner = PlannerAgent::new(
        research,
        AnswerSynthesizer::new(Arc::clone(&llm)),
        llm,
        repos.clone(),
        clock,
        config,
    );
    Harness {
        planner,
        repos,
        search,
    }
}

async fn start_session(repos: &Repositories, question: &str) -> QuerySession {
    let session = QuerySession::new(question, chrono::Utc::now());
    repos.sessions.create_session(&session).await.unwrap();
    session
}

fn voyager_pages() -> HashMap<String, String> {
    let mut pages = HashMap::new();
    pages.insert("https://nasa.gov/voyager".to_string(), page("alpha"));
    pages.insert("https://britannica.com/voyager".to_string(), page("beta"));
    pages.insert("https://space.com/voyager".to_string(), page("gamma"));
    pages
}

fn voyager_llm() -> FakeLlm {
    let launch = "- [AFFIRM] Voyager 1 was launched in 1977.";
    let rocket = "- [AFFIRM] Voyager 1 was launched from Cape Canaveral aboard a Titan IIIE rocket.";
    FakeLlm {
        extractions: vec![
            ("alpha".to_string(), format!("{launch}\n{rocket}")),
            ("beta".to_string(), format!("{launch}\n{rocket}")),
            ("gamma".to_string(), launch.to_string()),
        ],
        synthesis_answer: "Voyager 1 was launched in 1977.".to_string(),
    }
}

const VOYAGER_QUESTION: &str = "What year was the Voyager 1 probe launched?";

#[tokio::test]
async fn happy_path_accepts_on_first_attempt() {
    let h = harness(
        vec![vec![
            hit("https://nasa.gov/voyager"),
            hit("https://britannica.com/voyager"),
            hit("https://space.com/voyager"),
        ]],
        voyager_pages(),
        voyager_llm(),
        Repositories::in_memory(),
        PlannerConfig::default(),
    );
    let session = start_session(&h.repos, VOYAGER_QUESTION).await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
    assert_eq!(stored.final_confidence_level, Some(ConfidenceLevel::High));

    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(
        traces[0].verification_decision,
        VerificationDecision::Accept
    );
    assert_eq!(traces[0].strategy_used, SearchStrategy::Verbatim);

    let logs = h.repos.search_logs.read_search_logs(session.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].success);

    let (snapshot, evidence) = h.repos.answers.read_result(session.id).await.unwrap().unwrap();
    assert!(snapshot.answer_text.contains("1977"));
    assert_eq!(snapshot.confidence_level, ConfidenceLevel::High);
    assert!(evidence.len() >= 2);
    assert!(evidence
        .iter()
        .all(|e| e.claim.status == VerificationStatus::Verified));
}

#[tokio::test]
async fn accept_writes_cache_entry() {
    let h = harness(
        vec![vec![
            hit("https://nasa.gov/voyager"),
            hit("https://britannica.com/voyager"),
            hit("https://space.com/voyager"),
        ]],
        voyager_pages(),
        voyager_llm(),
        Repositories::in_memory(),
        PlannerConfig::default(),
    );
    let session = start_session(&h.repos, VOYAGER_QUESTION).await;
    h.planner.run(session.id).await.unwrap();

    let hash = veriscope_core::query_fingerprint(VOYAGER_QUESTION, SearchStrategy::Verbatim, 5);
    let entry = h
        .repos
        .cache
        .cache_get(&hash, chrono::Utc::now())
        .await
        .unwrap()
        .expect("ACCEPT should populate the cache");
    assert!(entry.snapshot.answer_text.contains("1977"));
}

fn acme_script() -> Vec<Vec<SearchHit>> {
    vec![
        // Attempt 1: everything on the blocklist.
        vec![hit("https://facebook.com/acme")],
        // Attempt 2 onward.
        vec![
            hit("https://acmecorp.com/leadership"),
            hit("https://reuters.com/acme"),
            hit("https://businesswire.com/acme"),
        ],
    ]
}

fn acme_pages() -> HashMap<String, String> {
    let mut pages = HashMap::new();
    pages.insert("https://acmecorp.com/leadership".to_string(), page("corp"));
    pages.insert("https://reuters.com/acme".to_string(), page("wire"));
    pages.insert("https://businesswire.com/acme".to_string(), page("press"));
    pages
}

fn acme_llm() -> FakeLlm {
    let ceo = "- [AFFIRM] Jane Doe is the chief executive officer of Acme Corp.";
    let hq = "- [AFFIRM] Acme Corp is headquartered in Denver.";
    FakeLlm {
        extractions: vec![
            ("corp".to_string(), format!("{ceo}\n{hq}")),
            ("wire".to_string(), format!("{ceo}\n{hq}")),
            (
                "press".to_string(),
                "- [AFFIRM] Jane Doe is Acme Corp's chief executive officer.".to_string(),
            ),
        ],
        synthesis_answer: "Jane Doe is the chief executive officer of Acme Corp.".to_string(),
    }
}

const ACME_QUESTION: &str = "Who is the current CEO of Acme Corp?";

#[tokio::test]
async fn retry_rotates_strategy_then_accepts() {
    let h = harness(
        acme_script(),
        acme_pages(),
        acme_llm(),
        Repositories::in_memory(),
        PlannerConfig::default(),
    );
    let session = start_session(&h.repos, ACME_QUESTION).await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);

    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].verification_decision, VerificationDecision::Retry);
    assert_eq!(traces[0].strategy_used, SearchStrategy::Verbatim);
    assert_eq!(
        traces[1].verification_decision,
        VerificationDecision::Accept
    );
    assert_eq!(traces[1].strategy_used, SearchStrategy::KeywordExpansion);

    let logs = h.repos.search_logs.read_search_logs(session.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].num_docs, 0);

    let level = stored.final_confidence_level.unwrap();
    assert!(matches!(
        level,
        ConfidenceLevel::High | ConfidenceLevel::Medium
    ));
}

#[tokio::test]
async fn conflicting_numbers_retry_then_stop_and_abstain() {
    let config = PlannerConfig {
        max_attempts: 2,
        ..PlannerConfig::default()
    };
    let mut pages = HashMap::new();
    pages.insert("https://cityhall.gov/stats".to_string(), page("census"));
    pages.insert("https://almanac.org/city".to_string(), page("almanac"));
    pages.insert("https://cityfacts.com/profile".to_string(), page("factbook"));
    let low = "- [AFFIRM] The city has a population of 1.2 million residents.";
    let high = "- [AFFIRM] The city has a population of 2.0 million residents.";
    let llm = FakeLlm {
        extractions: vec![
            ("census".to_string(), low.to_string()),
            ("almanac".to_string(), low.to_string()),
            ("factbook".to_string(), high.to_string()),
        ],
        synthesis_answer: "unused".to_string(),
    };
    let h = harness(
        vec![vec![
            hit("https://cityhall.gov/stats"),
            hit("https://almanac.org/city"),
            hit("https://cityfacts.com/profile"),
        ]],
        pages,
        llm,
        Repositories::in_memory(),
        config,
    );
    let session = start_session(&h.repos, "What is the population of the city?").await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
    assert_eq!(stored.final_confidence_level, Some(ConfidenceLevel::Low));

    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].verification_decision, VerificationDecision::Retry);
    assert_eq!(traces[1].verification_decision, VerificationDecision::Stop);

    let (snapshot, evidence) = h.repos.answers.read_result(session.id).await.unwrap().unwrap();
    assert_eq!(snapshot.answer_text, ABSTENTION_ANSWER);
    assert!(evidence
        .iter()
        .any(|e| e.claim.status == VerificationStatus::Conflict));
    assert!(snapshot.notes.is_some());
}

#[tokio::test]
async fn cache_hit_skips_search_on_retry_attempts() {
    let repos = Repositories::in_memory();

    // First session: fails attempt 1, accepts on attempt 2, caches.
    let first = harness(
        acme_script(),
        acme_pages(),
        acme_llm(),
        repos.clone(),
        PlannerConfig::default(),
    );
    let session_a = start_session(&repos, ACME_QUESTION).await;
    first.planner.run(session_a.id).await.unwrap();
    let (snapshot_a, _) = repos.answers.read_result(session_a.id).await.unwrap().unwrap();

    // Second session, same question modulo case: attempt 1 finds nothing,
    // attempt 2 probes the cache before searching.
    let second = harness(
        vec![vec![hit("https://facebook.com/acme")]],
        HashMap::new(),
        acme_llm(),
        repos.clone(),
        PlannerConfig::default(),
    );
    let session_b = start_session(&repos, "who is the current ceo of acme corp?").await;
    second.planner.run(session_b.id).await.unwrap();

    assert_eq!(second.search.calls(), 1, "attempt 2 must not search");

    let stored = repos.sessions.get_session(session_b.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
    let (snapshot_b, evidence_b) = repos.answers.read_result(session_b.id).await.unwrap().unwrap();
    assert_eq!(snapshot_b.answer_text, snapshot_a.answer_text);
    assert!(!evidence_b.is_empty());

    let logs = repos.search_logs.read_search_logs(session_b.id).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn expired_cache_entries_are_ignored() {
    let repos = Repositories::in_memory();
    let config = PlannerConfig {
        cache_ttl_secs: 60,
        ..PlannerConfig::default()
    };
    let clock = Arc::new(FixedClock::at(Utc::now()));

    let first = harness_with_clock(
        acme_script(),
        acme_pages(),
        acme_llm(),
        repos.clone(),
        config.clone(),
        clock.clone(),
    );
    let session_a = start_session(&repos, ACME_QUESTION).await;
    first.planner.run(session_a.id).await.unwrap();

    // Past the TTL the entry must never be served; the retry attempt
    // searches again instead.
    clock.set(Utc::now() + chrono::Duration::seconds(120));
    let second = harness_with_clock(
        acme_script(),
        acme_pages(),
        acme_llm(),
        repos.clone(),
        config,
        clock,
    );
    let session_b = start_session(&repos, ACME_QUESTION).await;
    second.planner.run(session_b.id).await.unwrap();

    assert_eq!(second.search.calls(), 2, "expired cache must not short-circuit");
    let stored = repos.sessions.get_session(session_b.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
}

#[tokio::test]
async fn budget_exhaustion_stops_with_low_confidence() {
    let config = PlannerConfig {
        max_attempts: 2,
        ..PlannerConfig::default()
    };
    let mut pages = HashMap::new();
    pages.insert("https://valleynews.example.com/dam".to_string(), page("solo"));
    let llm = FakeLlm {
        extractions: vec![(
            "solo".to_string(),
            "- [AFFIRM] The reservoir project remains under construction in the valley."
                .to_string(),
        )],
        synthesis_answer: ABSTENTION_ANSWER.to_string(),
    };
    let h = harness(
        vec![vec![hit("https://valleynews.example.com/dam")]],
        pages,
        llm,
        Repositories::in_memory(),
        config.clone(),
    );
    let session = start_session(&h.repos, "What is the status of the reservoir project?").await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
    assert_eq!(stored.final_confidence_level, Some(ConfidenceLevel::Low));

    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 2);
    assert!(traces.len() <= config.max_attempts as usize);
    assert_eq!(traces[1].verification_decision, VerificationDecision::Stop);

    let logs = h.repos.search_logs.read_search_logs(session.id).await.unwrap();
    assert!(logs.len() <= config.max_searches as usize);

    let (snapshot, _) = h.repos.answers.read_result(session.id).await.unwrap().unwrap();
    assert_eq!(snapshot.answer_text, ABSTENTION_ANSWER);
}

#[tokio::test]
async fn no_progress_forces_stop_and_persists_its_reason() {
    // Attempt budget is roomy; what runs out is progress. Every attempt
    // sees the same single-domain evidence and the same RETRY outcome.
    let config = PlannerConfig {
        max_attempts: 5,
        no_progress_limit: 1,
        ..PlannerConfig::default()
    };
    let mut pages = HashMap::new();
    pages.insert("https://valleynews.example.com/dam".to_string(), page("solo"));
    let llm = FakeLlm {
        extractions: vec![(
            "solo".to_string(),
            "- [AFFIRM] The reservoir project remains under construction in the valley."
                .to_string(),
        )],
        synthesis_answer: ABSTENTION_ANSWER.to_string(),
    };
    let h = harness(
        vec![vec![hit("https://valleynews.example.com/dam")]],
        pages,
        llm,
        Repositories::in_memory(),
        config,
    );
    let session = start_session(&h.repos, "What is the status of the reservoir project?").await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Done);
    assert_eq!(stored.final_confidence_level, Some(ConfidenceLevel::Low));
    assert_eq!(
        stored.final_confidence_reason.as_deref(),
        Some(NO_PROGRESS_REASON)
    );

    // Attempt 2 repeats attempt 1's (confidence, decision) outcome, so
    // the planner stops there and the trace records why.
    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].verification_decision, VerificationDecision::Retry);
    assert_eq!(traces[1].verification_decision, VerificationDecision::Stop);
    assert_eq!(traces[1].stop_reason.as_deref(), Some(NO_PROGRESS_REASON));

    let (snapshot, _) = h.repos.answers.read_result(session.id).await.unwrap().unwrap();
    assert_eq!(snapshot.confidence_reason, NO_PROGRESS_REASON);
    assert_eq!(snapshot.confidence_reason, "No progress across attempts.");
}

#[tokio::test]
async fn zero_documents_every_attempt_fails_session() {
    let config = PlannerConfig {
        max_attempts: 2,
        ..PlannerConfig::default()
    };
    let h = harness(
        vec![vec![]],
        HashMap::new(),
        FakeLlm {
            extractions: vec![],
            synthesis_answer: "unused".to_string(),
        },
        Repositories::in_memory(),
        config,
    );
    let session = start_session(&h.repos, "Completely unanswerable question here?").await;

    h.planner.run(session.id).await.unwrap();

    let stored = h.repos.sessions.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
    assert_eq!(stored.final_confidence_level, Some(ConfidenceLevel::Low));

    // Snapshot existence implies a terminal status; FAILED sessions still
    // serve an abstention result.
    let (snapshot, evidence) = h.repos.answers.read_result(session.id).await.unwrap().unwrap();
    assert_eq!(snapshot.answer_text, ABSTENTION_ANSWER);
    assert!(evidence.is_empty());

    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 2);
}

#[tokio::test]
async fn run_is_single_shot_per_session() {
    let h = harness(
        vec![vec![
            hit("https://nasa.gov/voyager"),
            hit("https://britannica.com/voyager"),
            hit("https://space.com/voyager"),
        ]],
        voyager_pages(),
        voyager_llm(),
        Repositories::in_memory(),
        PlannerConfig::default(),
    );
    let session = start_session(&h.repos, VOYAGER_QUESTION).await;

    h.planner.run(session.id).await.unwrap();
    let first_calls = h.search.calls();

    // A second run observes the terminal status and changes nothing.
    h.planner.run(session.id).await.unwrap();
    assert_eq!(h.search.calls(), first_calls);
    let traces = h.repos.traces.read_traces(session.id).await.unwrap();
    assert_eq!(traces.len(), 1);
}
