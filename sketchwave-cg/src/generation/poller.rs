//! Composition task polling
//!
//! Drives one submitted task to a terminal state: fixed-interval status
//! queries up to a hard attempt ceiling. A transport failure on a single
//! tick is swallowed and consumes an attempt; it is never escalated. The
//! ceiling yields TimedOut, which callers must be able to distinguish from
//! a service-reported failure.

use super::GenerationError;
use crate::clients::{compose::extract_track_url, ComposeService};
use crate::types::{CompositionTask, PollPlan, TaskStatus};
use chrono::Utc;
use sketchwave_common::events::{EventBus, GenerationEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Classification of one status string from the compose service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollClass {
    Composed,
    Failed,
    Pending,
}

/// Classify a service status string
///
/// Anything that is not a known terminal status counts as pending-like,
/// so unknown in-progress vocabularies ("composing", "running", ...) keep
/// the loop alive rather than failing the run.
fn classify_status(status: &str) -> PollClass {
    match status.to_ascii_lowercase().as_str() {
        "composed" => PollClass::Composed,
        "failed" | "error" => PollClass::Failed,
        _ => PollClass::Pending,
    }
}

/// Poll a composition task until it reaches a terminal state
///
/// Exactly one terminal transition occurs: Composed, Failed (service
/// reported), TimedOut (ceiling exceeded) or cancellation. No status query
/// is issued after a terminal state.
pub async fn poll_until_terminal(
    compose: &Arc<dyn ComposeService>,
    task_id: &str,
    plan: &PollPlan,
    cancel: &CancellationToken,
    events: &EventBus,
    request_id: Uuid,
) -> Result<CompositionTask, GenerationError> {
    for attempt in 1..=plan.max_attempts {
        if cancel.is_cancelled() {
            info!(task_id = %task_id, attempt, "Polling cancelled");
            return Err(GenerationError::Cancelled);
        }

        let snapshot = tokio::select! {
            _ = cancel.cancelled() => {
                info!(task_id = %task_id, attempt, "Polling cancelled mid-query");
                return Err(GenerationError::Cancelled);
            }
            result = compose.task_status(task_id) => result,
        };

        match snapshot {
            Ok(snapshot) => match classify_status(&snapshot.status) {
                PollClass::Composed => {
                    let track_url = extract_track_url(&snapshot.raw);
                    info!(
                        task_id = %task_id,
                        attempt,
                        track_url = ?track_url,
                        "Composition complete"
                    );
                    return Ok(CompositionTask {
                        task_id: task_id.to_string(),
                        status: TaskStatus::Composed,
                        result_track_ref: track_url,
                        raw: snapshot.raw,
                    });
                }
                PollClass::Failed => {
                    warn!(task_id = %task_id, attempt, status = %snapshot.status, "Composition failed");
                    return Err(GenerationError::CompositionFailed { raw: snapshot.raw });
                }
                PollClass::Pending => {
                    debug!(task_id = %task_id, attempt, status = %snapshot.status, "Composition pending");
                    let _ = events.emit(GenerationEvent::PollProgress {
                        request_id,
                        task_id: task_id.to_string(),
                        attempt,
                        max_attempts: plan.max_attempts,
                        timestamp: Utc::now(),
                    });
                }
            },
            Err(e) => {
                // Transient transport error: wasted attempt, not a terminal state
                warn!(task_id = %task_id, attempt, error = %e, "Status query failed, retrying next tick");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(task_id = %task_id, attempt, "Polling cancelled during wait");
                return Err(GenerationError::Cancelled);
            }
            _ = tokio::time::sleep(plan.interval) => {}
        }
    }

    warn!(task_id = %task_id, attempts = plan.max_attempts, "Poll ceiling exceeded");
    Err(GenerationError::Timeout {
        attempts: plan.max_attempts,
    })
}
