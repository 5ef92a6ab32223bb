//! Veriscope server binary: wires configuration, storage, capabilities,
//! the worker pool, and the axum router.

use veriscope_server::app::{self, AppState};
use veriscope_server::worker::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use veriscope_core::{
    AnswerSynthesizer, ClaimExtractor, Clock, Config, HttpFetcher, HttpLlmClient, LlmClient,
    PgStore, PlannerAgent, Repositories, ResearchAgent, SearchRateLimiter, SystemClock,
    VerificationEngine, WebEnvironment, WebSearchClient,
};

/// Worker tasks draining the session queue.
const WORKER_COUNT: usize = 8;

/// Bounded depth of the session queue.
const QUEUE_DEPTH: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let repos = match &config.database_url {
        Some(url) => Repositories::postgres(PgStore::connect(url).await?),
        None => {
            warn!("DATABASE_URL not set; using the in-memory store");
            Repositories::in_memory()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(&config.llm));
    let limiter = Arc::new(SearchRateLimiter::new(
        config.search.rate_limit_per_sec,
        Duration::from_millis(config.search.rate_limit_max_wait_ms),
    ));

    let environment = WebEnvironment::new(
        Arc::new(WebSearchClient::new(&config.search)),
        Arc::new(HttpFetcher::new(config.planner.fetch_timeout_secs)),
        limiter,
        clock.clone(),
        &config.planner,
    );
    let research = ResearchAgent::new(
        environment,
        ClaimExtractor::new(Arc::clone(&llm), config.planner.min_claim_chars),
        VerificationEngine::new(&config.planner),
    );
    let planner = Arc::new(PlannerAgent::new(
        research,
        AnswerSynthesizer::new(Arc::clone(&llm)),
        Arc::clone(&llm),
        repos.clone(),
        clock.clone(),
        config.planner.clone(),
    ));

    let pool = WorkerPool::spawn(planner, WORKER_COUNT, QUEUE_DEPTH);
    let state = AppState {
        repos,
        jobs: pool.sender(),
        trace_token: config.internal_trace_token.clone(),
        clock,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, workers = WORKER_COUNT, "veriscope server listening");

    axum::serve(listener, app::router(state)).await?;
    Ok(())
}
