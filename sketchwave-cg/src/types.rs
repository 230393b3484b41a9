//! Domain types for the composition generation pipeline
//!
//! All entities here live for exactly one generation run: they are built from
//! the inbound request, threaded through the pipeline, and discarded with the
//! response. Nothing in this service persists across requests.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Default total track duration in seconds when the request omits it
pub const DEFAULT_TOTAL_DURATION_SECS: u32 = 60;

/// One submitted drawing board, order-significant
///
/// Board order defines segment order in the final track; no stage of the
/// pipeline may reorder boards or the briefs derived from them.
#[derive(Debug, Clone)]
pub struct BoardSubmission {
    /// Board identifier from the UI layer
    pub id: String,
    /// Optional user-visible board name
    pub name: Option<String>,
    /// Decoded image payload, None when absent or undecodable
    pub image: Option<Vec<u8>>,
    /// Number of strokes drawn on the board
    pub stroke_count: u32,
}

/// Natural-language musical description derived from one board
///
/// Exactly one Brief exists per eligible board, in board order. A failed
/// vision call populates `error` and leaves `text` empty; it never aborts
/// the sibling analyses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    /// Board this brief was derived from
    pub canvas_id: String,
    /// Board display name, used in fallback prompt formatting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_name: Option<String>,
    /// Musical description, None when analysis failed
    pub text: Option<String>,
    /// Analysis failure detail, None on success
    pub error: Option<String>,
    /// Segment duration assigned to this board
    pub segment_duration_seconds: u32,
}

impl Brief {
    /// Display label for prompt formatting: board name, falling back to id
    pub fn label(&self) -> &str {
        self.canvas_name.as_deref().unwrap_or(&self.canvas_id)
    }
}

/// Terminal and non-terminal states of one composition task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, not yet rendered
    Pending,
    /// Rendered successfully
    Composed,
    /// The compose service reported failure
    Failed,
    /// The poll ceiling was exceeded before a terminal status
    TimedOut,
}

/// Handle for one in-flight composition job
///
/// Created by submission with status Pending; the poller transitions it to
/// exactly one terminal state. No polling occurs after a terminal state.
#[derive(Debug, Clone)]
pub struct CompositionTask {
    /// Task id assigned by the compose service
    pub task_id: String,
    pub status: TaskStatus,
    /// Rendered track reference, present only when Composed and extractable
    pub result_track_ref: Option<String>,
    /// Raw payload from the last status query, for diagnostics
    pub raw: Value,
}

/// Poll loop parameters, threaded through each tick
///
/// Explicit value object rather than module-level counters: 2 s fixed
/// interval, 90-attempt ceiling (~3 minutes).
#[derive(Debug, Clone)]
pub struct PollPlan {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPlan {
    fn default() -> Self {
        Self {
            max_attempts: 90,
            interval: Duration::from_secs(2),
        }
    }
}

/// Per-board segment duration as a pure function of the eligible-board count
///
/// Table: 1 board → 60 s, 2 → 30 s, 3 → 20 s, 4 → 15 s. Other counts fall
/// back to `max(15, total / count)`.
pub fn segment_duration_secs(eligible_count: usize, total_duration_secs: u32) -> u32 {
    match eligible_count {
        1 => 60,
        2 => 30,
        3 => 20,
        4 => 15,
        0 => total_duration_secs,
        n => (total_duration_secs / n as u32).max(15),
    }
}
