//! Deep Research Orchestrator
//!
//! An iterative, time-bounded agent that answers an open-ended research
//! question by coordinating web search, structured extraction, and
//! reasoning-model analysis across successive depth levels, streaming
//! progress to an attached [`events::EventSink`] as it goes.
//!
//! The [`research_loop::ResearchLoop`] is the core driver; [`config::Config`]
//! and [`config::Secrets`] are injected at construction rather than read
//! from ambient state at request time.

pub mod config;
pub mod errors;
pub mod events;
pub mod extract;
pub mod reasoning;
pub mod research_loop;
pub mod search;
pub mod session;
pub mod types;

pub use config::{Config, Secrets};
pub use errors::OrchestratorError;
pub use events::{Event, EventSink};
pub use research_loop::{Clients, ResearchLoop};
pub use types::{Finding, ResearchOutcome, ResearchRequest, ResearchState, Source};

use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for the Firecrawl search/extract HTTP client, so a
/// hung TCP connection can't stall a depth indefinitely, per spec.md §5's
/// hard-deadline requirement that "all in-flight outbound calls" are bounded.
const SEARCH_EXTRACT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the default [`Clients`] bundle backed by real HTTP Firecrawl and
/// reasoning-model implementations. Search and extract share one
/// timeout-bounded `reqwest::Client` (the teacher's pattern of one
/// long-lived resource shared by value across call sites rather than
/// recreated per call); the reasoning client gets its own plain client since
/// [`reasoning::HttpReasoningClient`] already wraps its calls in its own
/// `tokio::time::timeout`.
pub fn build_clients(config: &Config, secrets: &Secrets) -> Clients {
    let search_extract_http = reqwest::Client::builder()
        .timeout(SEARCH_EXTRACT_REQUEST_TIMEOUT)
        .build()
        .expect("failed to build search/extract HTTP client");
    let reasoning_http = reqwest::Client::new();

    let search = Arc::new(search::FirecrawlSearchClient::new(
        search_extract_http.clone(),
        secrets.firecrawl_api_key.clone(),
    ));
    let extract = Arc::new(extract::FirecrawlExtractClient::new(
        search_extract_http,
        secrets.firecrawl_api_key.clone(),
    ));
    let reasoning = Arc::new(
        reasoning::HttpReasoningClient::new(
            reasoning_http,
            config.reasoning_api_base.clone(),
            secrets.reasoning_api_key.clone(),
            config.reasoning_model.clone(),
        )
        .with_bypass_json_validation(config.bypass_json_validation)
        .with_synthesis_max_tokens(config.synthesis_max_tokens),
    );

    Clients { search, extract, reasoning }
}
