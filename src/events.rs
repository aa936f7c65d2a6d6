//! Event Sink: a write-only, ordered channel of tagged progress events.
//!
//! Replaces the legacy `writeData({type, content})` pattern (spec.md §9)
//! with a compile-time-checked tagged variant, one per row of spec.md §6's
//! event table.

use crate::types::Activity;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInit {
    #[serde(rename = "maxDepth")]
    pub max_depth: u32,
    #[serde(rename = "totalSteps")]
    pub total_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthDelta {
    pub current: u32,
    pub max: u32,
    #[serde(rename = "completedSteps")]
    pub completed_steps: u32,
    #[serde(rename = "totalSteps")]
    pub total_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finish {
    pub content: String,
}

/// One entry of the orchestrator's progress stream, tagged by `type` to
/// match the wire shape of spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum Event {
    #[serde(rename = "progress-init")]
    ProgressInit(ProgressInit),
    #[serde(rename = "depth-delta")]
    DepthDelta(DepthDelta),
    #[serde(rename = "activity-delta")]
    ActivityDelta(Activity),
    #[serde(rename = "source-delta")]
    SourceDelta(crate::types::Source),
    #[serde(rename = "finish")]
    Finish(Finish),
}

/// A write-only, ordered output channel for [`Event`]s.
///
/// Implementations must not block the Research Loop on a slow consumer
/// beyond a bounded buffer; if the consumer has disconnected, `emit` should
/// return `Ok(())` and silently drop the event rather than error, per
/// spec.md §4.5.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// An [`EventSink`] backed by a bounded `tokio::sync::mpsc` channel.
///
/// Mirrors the teacher's `ctx.stream(&status)` progress-notification pattern
/// in `tools/browser_research.rs`, generalized to a typed channel instead of
/// a bare string. A full buffer means a slow or vanished consumer; the send
/// is dropped rather than awaited, so the Research Loop is never blocked.
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::Sender<Event>,
}

impl ChannelEventSink {
    /// Buffer capacity chosen to hold roughly one depth's worth of events
    /// (one search, up to four extracts times two events, one analyze) so a
    /// consumer reading in bursts doesn't cause event loss under normal load.
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<Event>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("event sink buffer full or consumer gone, dropping event: {e}");
        }
    }
}

/// An in-memory [`EventSink`] that retains every event, for tests and for
/// callers that want to inspect the full transcript after a run completes.
#[derive(Default)]
pub struct RecordingEventSink {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}
