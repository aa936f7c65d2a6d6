//! Integration test for the research session registry: start a run in the
//! background, observe its event transcript, and read its final outcome —
//! exercising spec.md §4.5's "the Loop continues to completion" guarantee
//! independent of any single subscriber.

use async_trait::async_trait;
use deep_research_orchestrator::errors::OrchestratorError;
use deep_research_orchestrator::extract::{ExtractClient, ExtractOutcome};
use deep_research_orchestrator::reasoning::ReasoningClient;
use deep_research_orchestrator::research_loop::Clients;
use deep_research_orchestrator::search::{SearchClient, SearchOutcome};
use deep_research_orchestrator::session::{ResearchSessionManager, SessionStatus};
use deep_research_orchestrator::types::{Finding, Plan, ResearchRequest, Source};
use std::sync::Arc;
use std::time::Duration;

struct OneShotSearch;
#[async_trait]
impl SearchClient for OneShotSearch {
    async fn search(&self, _query: &str) -> SearchOutcome {
        SearchOutcome::Success(vec![Source {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            description: "An example page".to_string(),
        }])
    }
}

struct OneShotExtract;
#[async_trait]
impl ExtractClient for OneShotExtract {
    async fn extract(&self, url: &str, _prompt: &str) -> ExtractOutcome {
        ExtractOutcome::Success(vec![Finding::new("example finding", url)])
    }
}

struct OneShotPlanner;
#[async_trait]
impl ReasoningClient for OneShotPlanner {
    async fn plan(&self, _topic: &str, _remaining_minutes: f64, _findings: &str) -> Result<Plan, OrchestratorError> {
        Ok(Plan {
            summary: "enough evidence gathered".to_string(),
            gaps: vec![],
            next_steps: vec![],
            should_continue: false,
            next_search_topic: None,
            url_to_search: None,
        })
    }

    async fn synthesize(&self, _combined_prompt: &str) -> Result<String, OrchestratorError> {
        Ok("The example page confirms the hypothesis.".to_string())
    }
}

fn fixture_clients() -> Clients {
    Clients {
        search: Arc::new(OneShotSearch),
        extract: Arc::new(OneShotExtract),
        reasoning: Arc::new(OneShotPlanner),
    }
}

#[tokio::test]
async fn background_session_reaches_completed_and_retains_transcript() {
    let manager = ResearchSessionManager::default();
    let request = ResearchRequest::new("what causes tides?").with_max_depth(1);

    let session = manager.start(fixture_clients(), request).await;

    // Poll for completion; the background task runs independently of this
    // loop, which simulates a consumer that checks in only occasionally.
    for _ in 0..200 {
        if session.status().await != SessionStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(session.status().await, SessionStatus::Completed);

    let outcome = session.outcome().await.expect("outcome should be recorded");
    assert!(outcome.success);
    assert_eq!(outcome.findings.len(), 1);
    assert!(outcome.analysis.unwrap().contains("hypothesis"));

    let events = session.events_so_far().await;
    assert!(!events.is_empty());
}

#[tokio::test]
async fn stopping_a_session_marks_it_cancelled() {
    let manager = ResearchSessionManager::default();
    let request = ResearchRequest::new("a slow topic").with_max_depth(7);

    let session = manager.start(fixture_clients(), request).await;
    session.stop().await;

    assert_eq!(session.status().await, SessionStatus::Cancelled);
}
