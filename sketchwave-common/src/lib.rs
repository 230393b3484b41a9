//! # SketchWave Common Library
//!
//! Shared code for SketchWave services including:
//! - Error types
//! - Generation event types (GenerationEvent enum) and EventBus
//! - Configuration file loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
