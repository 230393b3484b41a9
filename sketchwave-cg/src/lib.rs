//! sketchwave-cg library interface
//!
//! Exposes the application state, router construction, and the generation
//! pipeline for integration testing.

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod generation;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use crate::clients::{ComposeService, VisionAnalyzer};
use crate::config::CgConfig;
use crate::generation::GenerationContext;
use axum::Router;
use chrono::{DateTime, Utc};
use sketchwave_common::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation token registry keyed by request id
///
/// A synchronous lock, never held across an await: entries must be removable
/// from `Drop` when axum drops a handler future on client disconnect.
pub type TokenRegistry = Arc<std::sync::RwLock<HashMap<Uuid, CancellationToken>>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolved service configuration, read-only
    pub config: Arc<CgConfig>,
    /// Vision-language collaborator
    pub vision: Arc<dyn VisionAnalyzer>,
    /// Async compose collaborator
    pub compose: Arc<dyn ComposeService>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Cancellation tokens for in-flight generation runs
    pub cancellation_tokens: TokenRegistry,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last terminal error for diagnostic purposes
    pub last_error: Arc<tokio::sync::RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        config: CgConfig,
        vision: Arc<dyn VisionAnalyzer>,
        compose: Arc<dyn ComposeService>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config: Arc::new(config),
            vision,
            compose,
            event_bus,
            cancellation_tokens: Arc::new(std::sync::RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(tokio::sync::RwLock::new(None)),
        }
    }

    /// Generation context for one run, borrowing the shared collaborators
    pub fn generation_context(&self) -> GenerationContext {
        GenerationContext {
            vision: Arc::clone(&self.vision),
            compose: Arc::clone(&self.compose),
            events: self.event_bus.clone(),
            poll: self.config.poll.clone(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::generate_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
