//! Research Loop: the orchestrator driver.
//!
//! Owns the Research State and issues Search→Extract→Plan cycles up to
//! `maxDepth` times under a wall-clock `timeLimit`, finalizing with a
//! Synthesizer call before closing the stream, per spec.md §4.1.

use crate::errors::OrchestratorError;
use crate::events::{DepthDelta, Event, EventSink, Finish, ProgressInit};
use crate::extract::{ExtractClient, ExtractOutcome};
use crate::reasoning::ReasoningClient;
use crate::search::{SearchClient, SearchOutcome};
use crate::types::{Activity, ActivityStatus, ActivityType, Finding, ResearchOutcome, ResearchRequest, ResearchState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// At most 3 search-derived URLs plus one Planner-hinted URL per depth, per
/// spec.md §5.
const MAX_SEARCH_URLS_PER_DEPTH: usize = 3;

/// The injected bundle of collaborators a Research Loop closes over, per
/// spec.md §9 "Replacing ambient/global state."
pub struct Clients {
    pub search: Arc<dyn SearchClient>,
    pub extract: Arc<dyn ExtractClient>,
    pub reasoning: Arc<dyn ReasoningClient>,
}

pub struct ResearchLoop {
    clients: Clients,
    sink: Arc<dyn EventSink>,
    cancellation: CancellationToken,
}

/// Outcome of racing a suspension point against the cancellation token.
enum Raced<T> {
    Finished(T),
    Cancelled,
}

impl ResearchLoop {
    /// Hard wall-clock deadline per spec.md §5 ("the outer request carries a
    /// hard deadline (e.g. 5 minutes) that cancels all in-flight outbound
    /// calls"), distinct from the soft, per-iteration `timeLimit` inside
    /// [`ResearchRequest`].
    pub const DEFAULT_HARD_DEADLINE: Duration = Duration::from_secs(300);

    pub fn new(clients: Clients, sink: Arc<dyn EventSink>) -> Self {
        Self {
            clients,
            sink,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    async fn emit(&self, event: Event) {
        self.sink.emit(event).await;
    }

    /// Races `fut` against the cancellation signal so in-flight calls abort
    /// promptly on a hard deadline, per spec.md §5 "In-flight extract/
    /// search/planner calls must accept a cancellation signal and abort
    /// promptly."
    async fn race<T>(&self, fut: impl std::future::Future<Output = T>) -> Raced<T> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Raced::Cancelled,
            result = fut => Raced::Finished(result),
        }
    }

    /// Runs one invocation under an additional hard wall-clock deadline, per
    /// spec.md §5: "the outer request carries a hard deadline ... that
    /// cancels all in-flight outbound calls." If `run` hasn't returned by
    /// `hard_deadline`, the cancellation token is triggered so every
    /// in-flight search/extract/planner call aborts at its next suspension
    /// point; `run` itself is then allowed to keep unwinding rather than
    /// being dropped outright, so it can still proceed to Synthesis if time
    /// permits, per §5 "on cancellation the Loop proceeds to Synthesis if
    /// time permits, else emits a terminal error activity and returns."
    pub async fn run_with_hard_deadline(
        &self,
        request: ResearchRequest,
        hard_deadline: Duration,
    ) -> ResearchOutcome {
        let run_future = self.run(request);
        tokio::pin!(run_future);

        match tokio::time::timeout(hard_deadline, &mut run_future).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("hard deadline of {hard_deadline:?} exceeded, cancelling in-flight calls");
                self.cancellation.cancel();
                run_future.await
            }
        }
    }

    async fn emit_activity(
        &self,
        state: &ResearchState,
        kind: ActivityType,
        status: ActivityStatus,
        message: impl Into<String>,
    ) {
        // Incrementing before emit (rather than after) is an acknowledged
        // approximation, not a contract — see spec.md §9's open question on
        // `completedSteps`. We increment only after constructing the
        // message so a sink failure never advances the counter without a
        // corresponding event having been built.
        let completed_steps = if matches!(status, ActivityStatus::Complete) {
            state.increment_completed_steps()
        } else {
            state.completed_steps()
        };
        let activity = Activity::new(
            kind,
            status,
            message,
            state.current_depth,
            completed_steps,
            state.total_expected_steps,
        );
        self.emit(Event::ActivityDelta(activity)).await;
    }

    /// Runs one invocation of the Research Loop to completion, returning the
    /// structured result of spec.md §6. Never panics and never propagates an
    /// unhandled error across the boundary, per spec.md §7.
    pub async fn run(&self, request: ResearchRequest) -> ResearchOutcome {
        let start = Instant::now();
        let mut state = ResearchState::new(request.topic.clone(), request.max_depth);

        self.emit(Event::ProgressInit(ProgressInit {
            max_depth: request.max_depth,
            total_steps: state.total_expected_steps,
        }))
        .await;

        let mut aborted_without_time = false;

        'depths: while state.current_depth < request.max_depth {
            if start.elapsed() >= request.time_limit {
                break;
            }
            if self.cancellation.is_cancelled() {
                break;
            }

            state.current_depth += 1;
            self.emit(Event::DepthDelta(DepthDelta {
                current: state.current_depth,
                max: request.max_depth,
                completed_steps: state.completed_steps(),
                total_steps: state.total_expected_steps,
            }))
            .await;

            // --- Search phase ---
            let search_topic = state.search_topic().to_string();
            self.emit_activity(
                &state,
                ActivityType::Search,
                ActivityStatus::Pending,
                format!("Searching for {search_topic}"),
            )
            .await;

            let search_outcome = match self.race(self.clients.search.search(&search_topic)).await {
                Raced::Finished(outcome) => outcome,
                Raced::Cancelled => {
                    aborted_without_time = start.elapsed() >= request.time_limit;
                    break 'depths;
                }
            };

            let search_results = match search_outcome {
                SearchOutcome::Success(results) => {
                    self.emit_activity(
                        &state,
                        ActivityType::Search,
                        ActivityStatus::Complete,
                        format!("Found {} results", results.len()),
                    )
                    .await;
                    for source in &results {
                        self.emit(Event::SourceDelta(source.clone())).await;
                    }
                    results
                }
                SearchOutcome::Failure(err) => {
                    self.emit_activity(
                        &state,
                        ActivityType::Search,
                        ActivityStatus::Error,
                        format!("Search failed: {err}"),
                    )
                    .await;
                    if OrchestratorError::Search(err).is_retryable() {
                        state.failed_attempts += 1;
                    }
                    if state.has_failed_too_often() {
                        break 'depths;
                    }
                    continue 'depths;
                }
            };

            // --- Extract phase ---
            let mut urls: Vec<String> = Vec::new();
            if let Some(hint) = state.url_to_search.take() {
                // Prepended even when empty per spec.md §9's first open
                // question; the Extract Client rejects the empty string as
                // a structural failure, which the fan-out swallows like any
                // other per-URL error.
                urls.push(hint);
            }
            urls.extend(
                search_results
                    .iter()
                    .take(MAX_SEARCH_URLS_PER_DEPTH)
                    .map(|s| s.url.clone()),
            );

            let extract_prompt = state.current_topic.clone();
            let new_findings = match self.race(self.run_extract_phase(&state, &urls, &extract_prompt)).await {
                Raced::Finished(findings) => findings,
                Raced::Cancelled => {
                    aborted_without_time = start.elapsed() >= request.time_limit;
                    break 'depths;
                }
            };
            state.findings.extend(new_findings);

            // --- Analyze phase ---
            self.emit_activity(
                &state,
                ActivityType::Analyze,
                ActivityStatus::Pending,
                "Analyzing findings",
            )
            .await;

            let remaining_minutes = request
                .time_limit
                .saturating_sub(start.elapsed())
                .as_secs_f64()
                / 60.0;
            let findings_prompt = state.format_findings();

            let plan_result = match self
                .race(self.clients.reasoning.plan(&request.topic, remaining_minutes, &findings_prompt))
                .await
            {
                Raced::Finished(result) => result,
                Raced::Cancelled => {
                    aborted_without_time = start.elapsed() >= request.time_limit;
                    break 'depths;
                }
            };

            let plan = match plan_result {
                Ok(plan) => {
                    self.emit_activity(
                        &state,
                        ActivityType::Analyze,
                        ActivityStatus::Complete,
                        plan.summary.clone(),
                    )
                    .await;
                    plan
                }
                Err(err) => {
                    self.emit_activity(
                        &state,
                        ActivityType::Analyze,
                        ActivityStatus::Error,
                        format!("Planner failed: {err}"),
                    )
                    .await;
                    if err.is_retryable() {
                        state.failed_attempts += 1;
                    }
                    if state.has_failed_too_often() {
                        break 'depths;
                    }
                    continue 'depths;
                }
            };

            state.next_search_topic = plan.next_search_topic.filter(|s| !s.is_empty());
            state.url_to_search = plan.url_to_search;
            state.summaries.push(plan.summary);

            // Termination check: honor `shouldContinue` even if gaps exist.
            if !plan.should_continue || plan.gaps.is_empty() {
                break 'depths;
            }
            state.current_topic = plan.gaps[0].clone();
        }

        if aborted_without_time {
            self.emit_activity(
                &state,
                ActivityType::Thought,
                ActivityStatus::Error,
                "Research failed: cancelled with no time remaining for synthesis",
            )
            .await;
            return ResearchOutcome {
                success: false,
                findings: state.findings,
                analysis: None,
                error: Some("research cancelled before synthesis could run".to_string()),
                completed_steps: state.completed_steps(),
                total_steps: state.total_expected_steps,
            };
        }

        self.synthesize(state).await
    }

    /// Fans out N ≤ 4 concurrent extract calls and awaits all, per spec.md
    /// §5. Each task emits its own `activity{extract, pending}` and
    /// `activity{extract, complete|error}` directly on the shared sink as it
    /// starts and finishes, so a live consumer sees them as they happen
    /// rather than as a burst after the slowest URL completes. Findings are
    /// still gathered into one `Vec` and appended by the caller, since
    /// `findings` itself isn't safe for concurrent writers.
    async fn run_extract_phase(&self, state: &ResearchState, urls: &[String], prompt: &str) -> Vec<Finding> {
        if urls.is_empty() {
            return Vec::new();
        }

        let mut join_set = tokio::task::JoinSet::new();

        for url in urls.iter().cloned() {
            let extract = Arc::clone(&self.clients.extract);
            let prompt = prompt.to_string();
            let sink = Arc::clone(&self.sink);
            let completed_steps = state.completed_steps_handle();
            let current_depth = state.current_depth;
            let total_expected_steps = state.total_expected_steps;
            join_set.spawn(async move {
                emit_extract_activity(
                    &sink,
                    &completed_steps,
                    current_depth,
                    total_expected_steps,
                    ActivityStatus::Pending,
                    format!("Extracting {url}"),
                    false,
                )
                .await;

                let outcome = extract.extract(&url, &prompt).await;

                match outcome {
                    ExtractOutcome::Success(findings) => {
                        emit_extract_activity(
                            &sink,
                            &completed_steps,
                            current_depth,
                            total_expected_steps,
                            ActivityStatus::Complete,
                            format!("Extracted {} findings from {url}", findings.len()),
                            true,
                        )
                        .await;
                        findings
                    }
                    ExtractOutcome::Failure(err) => {
                        let host = url::Url::parse(&url)
                            .ok()
                            .and_then(|u| u.host_str().map(str::to_string))
                            .unwrap_or_else(|| url.clone());
                        emit_extract_activity(
                            &sink,
                            &completed_steps,
                            current_depth,
                            total_expected_steps,
                            ActivityStatus::Error,
                            format!("Extract failed for {host}: {err}"),
                            false,
                        )
                        .await;
                        Vec::new()
                    }
                }
            });
        }

        let mut collected = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(findings) => collected.extend(findings),
                Err(e) => warn!("extract task panicked: {e}"),
            }
        }

        collected
    }

    async fn synthesize(&self, state: ResearchState) -> ResearchOutcome {
        self.emit_activity(
            &state,
            ActivityType::Synthesis,
            ActivityStatus::Pending,
            "Preparing final analysis",
        )
        .await;

        let combined_prompt = format!("{}\n{}", state.format_findings(), state.format_summaries());

        match self.clients.reasoning.synthesize(&combined_prompt).await {
            Ok(analysis) => {
                self.emit_activity(
                    &state,
                    ActivityType::Synthesis,
                    ActivityStatus::Complete,
                    "Research completed",
                )
                .await;
                self.emit(Event::Finish(Finish { content: analysis.clone() })).await;

                info!(
                    "research completed: {} findings, {} depths",
                    state.findings.len(),
                    state.current_depth
                );

                ResearchOutcome {
                    success: true,
                    findings: state.findings,
                    analysis: Some(analysis),
                    error: None,
                    completed_steps: state.completed_steps(),
                    total_steps: state.total_expected_steps,
                }
            }
            Err(err) => {
                self.emit_activity(
                    &state,
                    ActivityType::Thought,
                    ActivityStatus::Error,
                    format!("Research failed: {err}"),
                )
                .await;

                ResearchOutcome {
                    success: false,
                    findings: state.findings,
                    analysis: None,
                    error: Some(err.to_string()),
                    completed_steps: state.completed_steps(),
                    total_steps: state.total_expected_steps,
                }
            }
        }
    }
}

/// Builds and emits one `activity{extract, ...}` event directly from a
/// spawned extract task, incrementing the shared `completedSteps` counter
/// first when the status is `Complete`.
async fn emit_extract_activity(
    sink: &Arc<dyn EventSink>,
    completed_steps: &AtomicU32,
    depth: u32,
    total_steps: u32,
    status: ActivityStatus,
    message: impl Into<String>,
    completes_a_step: bool,
) {
    let completed_steps = if completes_a_step {
        completed_steps.fetch_add(1, Ordering::SeqCst) + 1
    } else {
        completed_steps.load(Ordering::SeqCst)
    };
    let activity = Activity::new(ActivityType::Extract, status, message, depth, completed_steps, total_steps);
    sink.emit(Event::ActivityDelta(activity)).await;
}

/// `timeLimit` is small enough that even one search's latency can exhaust it
/// before the loop re-checks at the top of the next iteration (spec.md §8
/// boundary case). This helper exists purely so callers can compute a
/// sensible `ResearchRequest::time_limit` default outside of tests.
pub fn default_time_limit() -> Duration {
    ResearchRequest::DEFAULT_TIME_LIMIT
}
