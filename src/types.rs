//! Core data model: findings, sources, activities, and the research state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A piece of text the Extract Client returned for a URL, paired with that
/// URL as its source. Immutable once appended to a [`ResearchState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub text: String,
    pub source: String,
}

impl Finding {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }

    /// `true` when `source` parses as a syntactically valid URL, per the
    /// data model invariant "every finding's source is a syntactically valid
    /// URL."
    pub fn has_valid_source(&self) -> bool {
        url::Url::parse(&self.source).is_ok()
    }
}

/// A search result surfaced to the event sink. Weak reference only — never
/// owned by a [`Finding`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub url: String,
    pub title: String,
    pub description: String,
}

/// One observable unit of work reported on the event sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Search,
    Extract,
    Analyze,
    Reasoning,
    Synthesis,
    Thought,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub status: ActivityStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub depth: u32,
    #[serde(rename = "completedSteps")]
    pub completed_steps: u32,
    #[serde(rename = "totalSteps")]
    pub total_steps: u32,
}

impl Activity {
    pub fn new(
        kind: ActivityType,
        status: ActivityStatus,
        message: impl Into<String>,
        depth: u32,
        completed_steps: u32,
        total_steps: u32,
    ) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            timestamp: Utc::now(),
            depth,
            completed_steps,
            total_steps,
        }
    }
}

/// The structured plan a [`crate::reasoning::ReasoningClient::plan`] call
/// returns, per spec.md §4.4.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Plan {
    pub summary: String,
    pub gaps: Vec<String>,
    #[serde(rename = "nextSteps", default)]
    pub next_steps: Vec<String>,
    #[serde(rename = "shouldContinue")]
    pub should_continue: bool,
    #[serde(rename = "nextSearchTopic", default, skip_serializing_if = "Option::is_none")]
    pub next_search_topic: Option<String>,
    #[serde(rename = "urlToSearch", default, skip_serializing_if = "Option::is_none")]
    pub url_to_search: Option<String>,
}

/// The envelope the reasoning model's structured-output call returns:
/// `{ analysis: { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PlanResponse {
    pub analysis: Plan,
}

/// Parameters a caller supplies to one Research Loop invocation.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub topic: String,
    pub max_depth: u32,
    pub time_limit: std::time::Duration,
}

impl ResearchRequest {
    pub const DEFAULT_MAX_DEPTH: u32 = 7;
    pub const DEFAULT_TIME_LIMIT: std::time::Duration = std::time::Duration::from_secs(270);

    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_depth: Self::DEFAULT_MAX_DEPTH,
            time_limit: Self::DEFAULT_TIME_LIMIT,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_time_limit(mut self, time_limit: std::time::Duration) -> Self {
        self.time_limit = time_limit;
        self
    }
}

/// The value returned from one Research Loop invocation, per spec.md §6
/// "Exit / return value."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub success: bool,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "completedSteps")]
    pub completed_steps: u32,
    #[serde(rename = "totalSteps")]
    pub total_steps: u32,
}

/// The Research Loop's exclusively-owned, per-invocation mutable state.
///
/// Never shared across invocations; within one invocation only the extract
/// fan-out writes to `findings` concurrently, and those writes are
/// serialized by the caller (see `research_loop::ResearchLoop::run_extract_phase`).
/// `completed_steps` is the one field the extract fan-out also writes to
/// concurrently (each spawned task emits its own activity and increments the
/// counter as it finishes), so it is backed by an atomic rather than a plain
/// `u32`, per spec.md §5 "`completedSteps` is incremented by the sink's
/// `activity-delta` writer and must also be serialized."
#[derive(Debug, Clone)]
pub struct ResearchState {
    pub findings: Vec<Finding>,
    pub summaries: Vec<String>,
    pub current_topic: String,
    pub next_search_topic: Option<String>,
    pub url_to_search: Option<String>,
    pub current_depth: u32,
    pub failed_attempts: u32,
    pub max_failed_attempts: u32,
    completed_steps: std::sync::Arc<std::sync::atomic::AtomicU32>,
    pub total_expected_steps: u32,
}

impl ResearchState {
    pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;
    /// `totalExpectedSteps = maxDepth * 5`, a fixed heuristic per spec.md §3.
    const STEPS_PER_DEPTH: u32 = 5;

    pub fn new(topic: impl Into<String>, max_depth: u32) -> Self {
        Self {
            findings: Vec::new(),
            summaries: Vec::new(),
            current_topic: topic.into(),
            next_search_topic: None,
            url_to_search: None,
            current_depth: 0,
            failed_attempts: 0,
            max_failed_attempts: Self::DEFAULT_MAX_FAILED_ATTEMPTS,
            completed_steps: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)),
            total_expected_steps: max_depth * Self::STEPS_PER_DEPTH,
        }
    }

    /// The topic to search this iteration: the Planner's hint if present,
    /// else `current_topic`.
    pub fn search_topic(&self) -> &str {
        self.next_search_topic
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.current_topic)
    }

    pub fn has_failed_too_often(&self) -> bool {
        self.failed_attempts >= self.max_failed_attempts
    }

    /// The current snapshot of `completedSteps`.
    pub fn completed_steps(&self) -> u32 {
        self.completed_steps.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Atomically increments `completedSteps` and returns the new value.
    /// Safe to call from multiple concurrently-spawned extract tasks.
    pub fn increment_completed_steps(&self) -> u32 {
        self.completed_steps.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
    }

    /// A clone of the shared atomic handle, for passing into tasks spawned
    /// off the extract fan-out that need to increment the counter
    /// themselves rather than through `&self`.
    pub fn completed_steps_handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicU32> {
        std::sync::Arc::clone(&self.completed_steps)
    }

    /// Format all findings and summaries for a reasoning-model prompt, per
    /// spec.md §4.4: `"[From <source>]: <text>"` for findings joined by
    /// newlines, plus `"[Summary]: <s>"` lines for the Synthesizer.
    pub fn format_findings(&self) -> String {
        self.findings
            .iter()
            .map(|f| format!("[From {}]: {}", f.source, f.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn format_summaries(&self) -> String {
        self.summaries
            .iter()
            .map(|s| format!("[Summary]: {s}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_validates_its_source_url() {
        assert!(Finding::new("text", "https://example.com/page").has_valid_source());
        assert!(!Finding::new("text", "not a url").has_valid_source());
    }

    #[test]
    fn search_topic_prefers_planner_hint_over_current_topic() {
        let mut state = ResearchState::new("original topic", 3);
        assert_eq!(state.search_topic(), "original topic");

        state.next_search_topic = Some("hinted topic".to_string());
        assert_eq!(state.search_topic(), "hinted topic");

        // Empty hint means absent, not "search for the empty string".
        state.next_search_topic = Some(String::new());
        assert_eq!(state.search_topic(), "original topic");
    }

    #[test]
    fn total_expected_steps_is_fixed_at_construction() {
        let state = ResearchState::new("t", 4);
        assert_eq!(state.total_expected_steps, 20);
    }

    #[test]
    fn failed_attempts_trip_at_the_configured_cap() {
        let mut state = ResearchState::new("t", 1);
        assert!(!state.has_failed_too_often());
        state.failed_attempts = ResearchState::DEFAULT_MAX_FAILED_ATTEMPTS;
        assert!(state.has_failed_too_often());
    }

    #[test]
    fn format_findings_matches_the_planner_prompt_shape() {
        let mut state = ResearchState::new("t", 1);
        state.findings.push(Finding::new("sky is blue", "https://a/"));
        assert_eq!(state.format_findings(), "[From https://a/]: sky is blue");
    }
}
