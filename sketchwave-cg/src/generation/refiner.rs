//! Prompt refinement (fan-in)
//!
//! Merges ordered per-board briefs into one composition prompt. With two or
//! more usable briefs a text-only refinement call produces the unified
//! prompt; any refinement failure falls back to deterministic string
//! formatting, so this stage can never dead-end. A single usable brief is
//! passed through verbatim with no refinement call, regardless of how many
//! boards were originally submitted.

use super::GenerationError;
use crate::clients::VisionAnalyzer;
use crate::types::Brief;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cross-fade length instructed between adjacent segments
pub const CROSSFADE_SECS: u32 = 2;

/// Final composition prompt plus how it was produced
#[derive(Debug, Clone)]
pub struct RefinedPrompt {
    pub text: String,
    /// True only when the refinement call produced the text
    pub refined: bool,
}

/// Fixed coherence instruction appended to the fallback prompt
fn coherence_suffix(total_duration_secs: u32) -> String {
    format!(
        "Blend all segments into one continuous piece: use {}s cross-fades \
         between segments, carry a recurring motif across segments, and keep \
         the overall energy arc coherent. Target total duration: {}s.",
        CROSSFADE_SECS, total_duration_secs
    )
}

/// Deterministic fallback prompt: pure string formatting over the briefs
///
/// Always succeeds; this is the backstop for refinement failure.
pub fn fallback_prompt(briefs: &[&Brief], total_duration_secs: u32) -> String {
    let mut prompt = String::new();
    for (i, brief) in briefs.iter().enumerate() {
        let _ = write!(
            prompt,
            "Segment {} ({}): {} Duration: {}s. ",
            i + 1,
            brief.label(),
            brief.text.as_deref().unwrap_or_default(),
            brief.segment_duration_seconds
        );
    }
    prompt.push_str(&coherence_suffix(total_duration_secs));
    prompt
}

/// Instruction for the refinement call, with briefs as ordered context
fn refine_instruction(briefs: &[&Brief], total_duration_secs: u32) -> String {
    let mut instruction = String::from(
        "You are a music director. Combine the following ordered segment \
         descriptions into a single coherent music-composition prompt. Keep \
         the segments in order, describe how adjacent segments cross-fade \
         into each other, describe the overall energy arc, and state the \
         total duration. Reply with the prompt text only.\n\nSegments:\n",
    );
    for (i, brief) in briefs.iter().enumerate() {
        let _ = writeln!(
            instruction,
            "{}. ({}, {}s): {}",
            i + 1,
            brief.label(),
            brief.segment_duration_seconds,
            brief.text.as_deref().unwrap_or_default()
        );
    }
    let _ = write!(
        instruction,
        "\nTotal duration: {}s.",
        total_duration_secs
    );
    instruction
}

/// Produce the final composition prompt from the ordered briefs
///
/// Errors only when no brief carries text (nothing to compose from) or the
/// run was cancelled; refinement failures degrade to the fallback.
pub async fn build_prompt(
    vision: &Arc<dyn VisionAnalyzer>,
    briefs: &[Brief],
    total_duration_secs: u32,
    cancel: &CancellationToken,
) -> Result<RefinedPrompt, GenerationError> {
    let usable: Vec<&Brief> = briefs.iter().filter(|b| b.text.is_some()).collect();

    if usable.is_empty() {
        return Err(GenerationError::AllAnalysesFailed {
            briefs: briefs.to_vec(),
        });
    }

    if usable.len() == 1 {
        debug!("Single usable brief, skipping refinement");
        return Ok(RefinedPrompt {
            text: usable[0].text.clone().unwrap_or_default(),
            refined: false,
        });
    }

    let instruction = refine_instruction(&usable, total_duration_secs);
    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
        result = vision.generate_text(&instruction) => result,
    };

    match result {
        Ok(text) => {
            debug!(briefs = usable.len(), "Refinement call succeeded");
            Ok(RefinedPrompt {
                text,
                refined: true,
            })
        }
        Err(e) => {
            warn!(error = %e, "Refinement failed, using deterministic fallback");
            Ok(RefinedPrompt {
                text: fallback_prompt(&usable, total_duration_secs),
                refined: false,
            })
        }
    }
}
