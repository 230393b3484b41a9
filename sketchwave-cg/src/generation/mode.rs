//! Invocation mode routing
//!
//! The wire request selects its execution path through overlapping optional
//! flags. That shape is validated exactly once here into a tagged
//! `GenerationMode`, so the rest of the pipeline never branches on raw
//! booleans and conflicting flag combinations are rejected up front.

use super::GenerationError;
use crate::types::{BoardSubmission, DEFAULT_TOTAL_DURATION_SECS};

/// Domain-level generation request, decoded from the wire by the API layer
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Submitted boards, order-significant (fresh mode)
    pub boards: Vec<BoardSubmission>,
    /// Target total track duration in seconds
    pub total_duration_secs: Option<u32>,
    pub retry_mode: bool,
    pub adjust_mode: bool,
    /// Prompt from a previous run (retry/adjust modes)
    pub stored_prompt: Option<String>,
    /// Free-text revision instructions (adjust mode)
    pub adjust_instructions: Option<String>,
}

/// One of three mutually exclusive execution paths
#[derive(Debug, Clone)]
pub enum GenerationMode {
    /// Full pipeline: eligibility → analysis → refinement → compose → poll
    Fresh {
        boards: Vec<BoardSubmission>,
        total_duration_secs: u32,
    },
    /// Resubmit a previously generated prompt unchanged
    Retry { prompt: String },
    /// Revise a previously generated prompt per instructions, then submit
    Adjust {
        prompt: String,
        instructions: String,
    },
}

impl GenerationMode {
    /// Validate request flags into a mode, rejecting conflicting combinations
    pub fn resolve(request: GenerationRequest) -> Result<Self, GenerationError> {
        if request.retry_mode && request.adjust_mode {
            return Err(GenerationError::ConflictingModes);
        }

        // Blankness is judged on the trimmed view, but the prompt itself is
        // kept byte for byte: retry must resubmit the exact stored string.
        let stored_prompt = request.stored_prompt.filter(|p| !p.trim().is_empty());

        if request.retry_mode {
            let prompt = stored_prompt.ok_or(GenerationError::MissingPrompt)?;
            return Ok(GenerationMode::Retry { prompt });
        }

        if request.adjust_mode {
            let prompt = stored_prompt.ok_or(GenerationError::MissingPrompt)?;
            let instructions = request
                .adjust_instructions
                .filter(|i| !i.trim().is_empty())
                .ok_or(GenerationError::BlankAdjustInstructions)?;
            return Ok(GenerationMode::Adjust {
                prompt,
                instructions,
            });
        }

        Ok(GenerationMode::Fresh {
            boards: request.boards,
            total_duration_secs: request
                .total_duration_secs
                .unwrap_or(DEFAULT_TOTAL_DURATION_SECS),
        })
    }

    /// Mode name for logging and events
    pub fn name(&self) -> &'static str {
        match self {
            GenerationMode::Fresh { .. } => "fresh",
            GenerationMode::Retry { .. } => "retry",
            GenerationMode::Adjust { .. } => "adjust",
        }
    }
}
