//! Research session registry: background, detachable Research Loop runs.
//!
//! Generalizes the teacher's `research/session_manager.rs` +
//! `research/registry.rs` pair (which track a long-running browser crawl so
//! a client can poll for progress) into a wrapper around one Research Loop
//! invocation, letting a caller start a run, detach, and later poll or
//! re-attach for status — implementing spec.md §4.5's "if the consumer
//! disconnects, the Loop continues to completion" by decoupling the sink
//! from any single subscriber. See SPEC_FULL.md §9.1.

use crate::events::{Event, RecordingEventSink};
use crate::research_loop::{Clients, ResearchLoop};
use crate::types::{ResearchOutcome, ResearchRequest};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Sessions older than this and no longer running are reclaimed by the
/// periodic cleanup sweep, mirroring `SESSION_TIMEOUT` in the teacher's
/// `session_manager.rs`.
const SESSION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One background Research Loop run plus its retained event transcript.
pub struct ResearchSession {
    pub session_id: String,
    pub topic: String,
    status: RwLock<SessionStatus>,
    started_at: Instant,
    sink: Arc<RecordingEventSink>,
    cancellation: CancellationToken,
    outcome: RwLock<Option<ResearchOutcome>>,
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl ResearchSession {
    fn new(session_id: String, topic: String, cancellation: CancellationToken) -> Self {
        Self {
            session_id,
            topic,
            status: RwLock::new(SessionStatus::Running),
            started_at: Instant::now(),
            sink: Arc::new(RecordingEventSink::new()),
            cancellation,
            outcome: RwLock::new(None),
            task_handle: RwLock::new(None),
        }
    }

    pub fn runtime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub async fn status(&self) -> SessionStatus {
        *self.status.read().await
    }

    pub async fn events_so_far(&self) -> Vec<Event> {
        self.sink.events().await
    }

    pub async fn outcome(&self) -> Option<ResearchOutcome> {
        self.outcome.read().await.clone()
    }

    /// Requests graceful cancellation, per spec.md §9.2: the Research Loop
    /// observes this at the same checkpoints as deadline exhaustion and
    /// either proceeds to synthesis (if time remains) or returns a terminal
    /// error — this is not a separate abort mechanism from the hard
    /// deadline, it is the same signal.
    pub async fn stop(&self) {
        self.cancellation.cancel();
        *self.status.write().await = SessionStatus::Cancelled;
    }
}

/// Registry of active and recently-finished research sessions, keyed by
/// session id. Mirrors the teacher's `ResearchSessionManager` global
/// singleton pattern, generalized to hold sessions for this orchestrator
/// instead of browser crawls.
pub struct ResearchSessionManager {
    sessions: DashMap<String, Arc<ResearchSession>>,
}

impl ResearchSessionManager {
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<ResearchSessionManager> = OnceLock::new();
        INSTANCE.get_or_init(|| {
            let manager = Self { sessions: DashMap::new() };
            manager.spawn_cleanup_task();
            manager
        })
    }

    /// Starts a new Research Loop run in a background task and registers it
    /// under a fresh UUID, returning the session immediately so the caller
    /// can detach.
    pub async fn start(&self, clients: Clients, request: ResearchRequest) -> Arc<ResearchSession> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let cancellation = CancellationToken::new();
        let session = Arc::new(ResearchSession::new(session_id.clone(), request.topic.clone(), cancellation.clone()));

        let research_loop = ResearchLoop::new(clients, session.sink.clone()).with_cancellation(cancellation);
        let session_for_task = Arc::clone(&session);

        let handle = tokio::spawn(async move {
            let outcome = research_loop
                .run_with_hard_deadline(request, ResearchLoop::DEFAULT_HARD_DEADLINE)
                .await;
            *session_for_task.status.write().await = if outcome.success {
                SessionStatus::Completed
            } else {
                SessionStatus::Failed
            };
            *session_for_task.outcome.write().await = Some(outcome);
        });

        *session.task_handle.write().await = Some(handle);
        self.sessions.insert(session_id, Arc::clone(&session));
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ResearchSession>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    pub async fn stop(&self, session_id: &str) -> bool {
        match self.get(session_id) {
            Some(session) => {
                session.stop().await;
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn spawn_cleanup_task(&self) {
        tokio::spawn(async {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                Self::global().cleanup_old_sessions().await;
            }
        });
    }

    async fn cleanup_old_sessions(&self) {
        let mut to_remove = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            let status = session.status().await;
            if session.runtime() > SESSION_TIMEOUT && status != SessionStatus::Running {
                to_remove.push(entry.key().clone());
            }
        }
        for session_id in to_remove {
            debug!("reclaiming stale research session {session_id}");
            self.sessions.remove(&session_id);
        }
    }
}

impl Default for ResearchSessionManager {
    fn default() -> Self {
        Self { sessions: DashMap::new() }
    }
}
