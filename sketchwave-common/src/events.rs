//! Event types for the SketchWave event system
//!
//! Provides the generation progress event vocabulary and the EventBus used
//! to broadcast events to SSE subscribers. Events are observational only:
//! emit failures (no subscribers) are ignored by producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted during one generation run
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GenerationEvent {
    /// A generation run started
    RunStarted {
        request_id: Uuid,
        mode: String,
        timestamp: DateTime<Utc>,
    },

    /// One board's vision analysis finished (successfully or not)
    BoardAnalyzed {
        request_id: Uuid,
        board_id: String,
        ok: bool,
        timestamp: DateTime<Utc>,
    },

    /// The final composition prompt is ready
    PromptReady {
        request_id: Uuid,
        /// True when the refinement call produced the prompt,
        /// false for single-brief passthrough or the deterministic fallback
        refined: bool,
        timestamp: DateTime<Utc>,
    },

    /// The compose service accepted the prompt and returned a task id
    TaskSubmitted {
        request_id: Uuid,
        task_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One poll tick completed without reaching a terminal state
    PollProgress {
        request_id: Uuid,
        task_id: String,
        attempt: u32,
        max_attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// The run finished with a rendered track
    RunCompleted {
        request_id: Uuid,
        task_id: String,
        track_url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The run failed at a named stage
    RunFailed {
        request_id: Uuid,
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// The run was cancelled by the caller
    RunCancelled {
        request_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl GenerationEvent {
    /// Event type name for SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            GenerationEvent::RunStarted { .. } => "RunStarted",
            GenerationEvent::BoardAnalyzed { .. } => "BoardAnalyzed",
            GenerationEvent::PromptReady { .. } => "PromptReady",
            GenerationEvent::TaskSubmitted { .. } => "TaskSubmitted",
            GenerationEvent::PollProgress { .. } => "PollProgress",
            GenerationEvent::RunCompleted { .. } => "RunCompleted",
            GenerationEvent::RunFailed { .. } => "RunFailed",
            GenerationEvent::RunCancelled { .. } => "RunCancelled",
        }
    }
}

/// Broadcast bus for generation events
///
/// Uses tokio::broadcast internally: multiple subscribers, bounded buffer,
/// old events dropped for slow consumers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GenerationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` when nobody is listening. Producers treat both as success.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GenerationEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<GenerationEvent>> {
        self.tx.send(event)
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
