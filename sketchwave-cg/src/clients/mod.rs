//! HTTP clients for the two external collaborators
//!
//! Both clients sit behind object-safe traits (`VisionAnalyzer`,
//! `ComposeService`) so the generation pipeline can run against mock
//! implementations in tests.

pub mod compose;
pub mod vision;

pub use compose::{
    BeatovenComposeClient, ComposeError, ComposeService, ComposeSubmission, ComposeTaskSnapshot,
};
pub use vision::{GeminiVisionClient, VisionAnalyzer, VisionError};
