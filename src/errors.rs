//! Error taxonomy for the research orchestrator.

use thiserror::Error;

/// Errors that can occur while driving a research run.
///
/// None of these ever escape [`crate::research_loop::ResearchLoop::run`] as a
/// panic or an unhandled `Result::Err`: every variant is caught at its call
/// site and folded into a [`crate::types::ResearchOutcome`].
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("search failed: {0}")]
    Search(String),

    #[error("extract failed: {0}")]
    Extract(String),

    #[error("planner failed: {0}")]
    Planner(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("event sink error: {0}")]
    Sink(String),
}

impl OrchestratorError {
    /// Returns the taxonomy bucket this error counts against, per the
    /// `failedAttempts` cumulative-retry policy (spec.md §4.1/§7). Only
    /// search and planner failures are retryable; extract failures are
    /// swallowed per-URL and never reach this classification.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::Search(_) | OrchestratorError::Planner(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_search_and_planner_errors_are_retryable() {
        assert!(OrchestratorError::Search("x".into()).is_retryable());
        assert!(OrchestratorError::Planner("x".into()).is_retryable());
        assert!(!OrchestratorError::Extract("x".into()).is_retryable());
        assert!(!OrchestratorError::Synthesis("x".into()).is_retryable());
        assert!(!OrchestratorError::Config("x".into()).is_retryable());
        assert!(!OrchestratorError::Sink("x".into()).is_retryable());
    }
}
