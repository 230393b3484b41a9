//! Composition generation pipeline
//!
//! Orchestrates one sketch-to-music run: board eligibility filtering,
//! concurrent per-board vision analysis, prompt refinement with a
//! deterministic fallback, asynchronous composition submission, and bounded
//! status polling. Entry is `orchestrator::run_generation`; everything here
//! is scoped to a single request and shares no state across runs.

pub mod briefs;
pub mod eligibility;
pub mod mode;
pub mod orchestrator;
pub mod poller;
pub mod refiner;

pub use mode::{GenerationMode, GenerationRequest};
pub use orchestrator::{run_generation, GenerationContext, GenerationOutcome};

use crate::types::Brief;
use serde_json::Value;
use thiserror::Error;

/// Terminal pipeline failures, classified per the error taxonomy
///
/// Validation variants are caller mistakes reported before any network call;
/// the rest carry enough diagnostic payload to distinguish service failures
/// from timeouts from cancellation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No submitted board passed the eligibility rule
    #[error("No eligible boards: draw on at least one board before generating")]
    NoEligibleBoards,

    /// Retry/adjust invoked without a previously generated prompt
    #[error("Retry and adjust require the prompt from a previous generation")]
    MissingPrompt,

    /// Adjust invoked with empty or whitespace-only instructions
    #[error("Adjust instructions must not be empty")]
    BlankAdjustInstructions,

    /// Both retry and adjust flags were set
    #[error("retryMode and adjustMode are mutually exclusive")]
    ConflictingModes,

    /// Every per-board vision call failed, leaving nothing to compose from
    #[error("All board analyses failed")]
    AllAnalysesFailed { briefs: Vec<Brief> },

    /// The adjustment revision call failed
    #[error("Prompt adjustment failed: {detail}")]
    AdjustFailed { detail: String },

    /// The compose service rejected the submission or returned no task id
    #[error("Composition submission failed: {detail}")]
    Submission {
        detail: String,
        raw: Option<Value>,
    },

    /// The compose service reported a failed/error task status
    #[error("Composition failed")]
    CompositionFailed { raw: Value },

    /// The poll ceiling was exceeded before a terminal task status
    #[error("Composition timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// The caller cancelled the run
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Pipeline stage that produced this error, for diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            GenerationError::NoEligibleBoards => "eligibility",
            GenerationError::MissingPrompt
            | GenerationError::BlankAdjustInstructions
            | GenerationError::ConflictingModes => "validation",
            GenerationError::AllAnalysesFailed { .. } => "analysis",
            GenerationError::AdjustFailed { .. } => "adjustment",
            GenerationError::Submission { .. } => "submission",
            GenerationError::CompositionFailed { .. } => "composition",
            GenerationError::Timeout { .. } => "polling",
            GenerationError::Cancelled => "cancelled",
        }
    }

    /// True for caller mistakes that should map to a 400-class response
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GenerationError::NoEligibleBoards
                | GenerationError::MissingPrompt
                | GenerationError::BlankAdjustInstructions
                | GenerationError::ConflictingModes
        )
    }
}
