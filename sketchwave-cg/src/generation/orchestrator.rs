//! Generation run orchestration
//!
//! Sequences one complete run for whichever mode the request resolved to,
//! emits progress events per stage, and assembles the terminal outcome.
//! Everything is scoped to the single run: the cancellation token supplied
//! by the caller is honored at every suspension point.

use super::briefs::generate_briefs;
use super::eligibility::eligible_boards;
use super::mode::{GenerationMode, GenerationRequest};
use super::poller::poll_until_terminal;
use super::refiner::build_prompt;
use super::GenerationError;
use crate::clients::{ComposeError, ComposeService, VisionAnalyzer};
use crate::types::{segment_duration_secs, Brief, CompositionTask, PollPlan};
use chrono::Utc;
use sketchwave_common::events::{EventBus, GenerationEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// Read-only collaborators for one or more generation runs
#[derive(Clone)]
pub struct GenerationContext {
    pub vision: Arc<dyn VisionAnalyzer>,
    pub compose: Arc<dyn ComposeService>,
    pub events: EventBus,
    pub poll: PollPlan,
}

/// Assembled result of one successful generation run
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Mode that produced this outcome
    pub mode: &'static str,
    /// Per-board briefs, fresh mode only
    pub briefs: Option<Vec<Brief>>,
    /// The combined multi-board prompt, fresh mode only
    pub combined_prompt: Option<String>,
    /// The prompt actually submitted for composition
    pub final_prompt: String,
    /// Terminal composition task (always Composed here)
    pub task: CompositionTask,
}

/// Instruction for the adjust-mode revision call
fn adjust_instruction(prompt: &str, instructions: &str) -> String {
    format!(
        "You are a music director. Revise the following music-composition \
         prompt according to the instructions. Preserve the prompt's segment \
         structure and durations. Reply with the revised prompt text only.\n\n\
         Prompt:\n{}\n\nInstructions:\n{}",
        prompt, instructions
    )
}

/// Run one generation request end to end
///
/// Validates the mode, executes the selected path, and emits terminal
/// progress events. All failures are `GenerationError`s classified for the
/// API layer.
pub async fn run_generation(
    ctx: &GenerationContext,
    request_id: Uuid,
    request: GenerationRequest,
    cancel: CancellationToken,
) -> Result<GenerationOutcome, GenerationError> {
    let mode = GenerationMode::resolve(request)?;

    info!(request_id = %request_id, mode = mode.name(), "Generation run started");
    let _ = ctx.events.emit(GenerationEvent::RunStarted {
        request_id,
        mode: mode.name().to_string(),
        timestamp: Utc::now(),
    });

    let result = execute(ctx, request_id, mode, &cancel).await;

    match &result {
        Ok(outcome) => {
            info!(
                request_id = %request_id,
                task_id = %outcome.task.task_id,
                track_url = ?outcome.task.result_track_ref,
                "Generation run completed"
            );
            let _ = ctx.events.emit(GenerationEvent::RunCompleted {
                request_id,
                task_id: outcome.task.task_id.clone(),
                track_url: outcome.task.result_track_ref.clone(),
                timestamp: Utc::now(),
            });
        }
        Err(GenerationError::Cancelled) => {
            info!(request_id = %request_id, "Generation run cancelled");
            let _ = ctx.events.emit(GenerationEvent::RunCancelled {
                request_id,
                timestamp: Utc::now(),
            });
        }
        Err(e) => {
            info!(request_id = %request_id, stage = e.stage(), error = %e, "Generation run failed");
            let _ = ctx.events.emit(GenerationEvent::RunFailed {
                request_id,
                stage: e.stage().to_string(),
                error: e.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    result
}

/// Execute the resolved mode
async fn execute(
    ctx: &GenerationContext,
    request_id: Uuid,
    mode: GenerationMode,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome, GenerationError> {
    match mode {
        GenerationMode::Fresh {
            boards,
            total_duration_secs,
        } => {
            let eligible = eligible_boards(boards);
            if eligible.is_empty() {
                return Err(GenerationError::NoEligibleBoards);
            }

            let segment_secs = segment_duration_secs(eligible.len(), total_duration_secs);
            info!(
                request_id = %request_id,
                boards = eligible.len(),
                segment_secs,
                "Analyzing eligible boards"
            );

            let briefs = generate_briefs(&ctx.vision, &eligible, segment_secs, cancel).await;
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            for brief in &briefs {
                let _ = ctx.events.emit(GenerationEvent::BoardAnalyzed {
                    request_id,
                    board_id: brief.canvas_id.clone(),
                    ok: brief.error.is_none(),
                    timestamp: Utc::now(),
                });
            }

            let prompt = build_prompt(&ctx.vision, &briefs, total_duration_secs, cancel).await?;
            let _ = ctx.events.emit(GenerationEvent::PromptReady {
                request_id,
                refined: prompt.refined,
                timestamp: Utc::now(),
            });

            let task = submit_and_poll(ctx, request_id, &prompt.text, cancel).await?;
            Ok(GenerationOutcome {
                mode: "fresh",
                briefs: Some(briefs),
                combined_prompt: Some(prompt.text.clone()),
                final_prompt: prompt.text,
                task,
            })
        }

        GenerationMode::Retry { prompt } => {
            // The stored prompt is resubmitted unchanged; no analysis or
            // refinement re-runs.
            let task = submit_and_poll(ctx, request_id, &prompt, cancel).await?;
            Ok(GenerationOutcome {
                mode: "retry",
                briefs: None,
                combined_prompt: None,
                final_prompt: prompt,
                task,
            })
        }

        GenerationMode::Adjust {
            prompt,
            instructions,
        } => {
            let instruction = adjust_instruction(&prompt, &instructions);
            let revised = tokio::select! {
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                result = ctx.vision.generate_text(&instruction) => {
                    result.map_err(|e| GenerationError::AdjustFailed {
                        detail: e.to_string(),
                    })?
                }
            };
            let _ = ctx.events.emit(GenerationEvent::PromptReady {
                request_id,
                refined: true,
                timestamp: Utc::now(),
            });

            let task = submit_and_poll(ctx, request_id, &revised, cancel).await?;
            Ok(GenerationOutcome {
                mode: "adjust",
                briefs: None,
                combined_prompt: None,
                final_prompt: revised,
                task,
            })
        }
    }
}

/// Submit the final prompt and poll the resulting task to a terminal state
async fn submit_and_poll(
    ctx: &GenerationContext,
    request_id: Uuid,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<CompositionTask, GenerationError> {
    let submission = tokio::select! {
        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
        result = ctx.compose.submit(prompt) => {
            result.map_err(|e| match e {
                ComposeError::MissingTaskId { raw } => GenerationError::Submission {
                    detail: "response did not include a task id".to_string(),
                    raw: Some(raw),
                },
                other => GenerationError::Submission {
                    detail: other.to_string(),
                    raw: None,
                },
            })?
        }
    };

    info!(request_id = %request_id, task_id = %submission.task_id, "Composition task submitted");
    let _ = ctx.events.emit(GenerationEvent::TaskSubmitted {
        request_id,
        task_id: submission.task_id.clone(),
        timestamp: Utc::now(),
    });

    poll_until_terminal(
        &ctx.compose,
        &submission.task_id,
        &ctx.poll,
        cancel,
        &ctx.events,
        request_id,
    )
    .await
}
