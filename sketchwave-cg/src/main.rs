//! sketchwave-cg - Composition Generator Microservice
//!
//! Turns user sketches into a single rendered music track by orchestrating
//! a vision-language analysis service and an asynchronous compose service.
//! Serves HTTP REST + SSE.

use anyhow::Result;
use sketchwave_cg::clients::{BeatovenComposeClient, GeminiVisionClient};
use sketchwave_cg::config::CgConfig;
use sketchwave_cg::AppState;
use sketchwave_common::config::TomlConfig;
use sketchwave_common::events::EventBus;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting sketchwave-cg (Composition Generator) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration: ENV overrides the TOML config file
    let toml_config = TomlConfig::load()?;
    let config = CgConfig::resolve(&toml_config)?;
    info!("Poll plan: every {:?}, up to {} attempts", config.poll.interval, config.poll.max_attempts);

    // External collaborators
    let vision = Arc::new(GeminiVisionClient::new(
        config.vision_api_key.clone(),
        config.vision_base_url.clone(),
        config.vision_model.clone(),
    ));
    let compose = Arc::new(BeatovenComposeClient::new(
        config.compose_api_key.clone(),
        config.compose_base_url.clone(),
    ));

    // Event bus for SSE broadcasting
    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let listen_port = config.listen_port;
    let state = AppState::new(config, vision, compose, event_bus);
    let app = sketchwave_cg::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", listen_port)).await?;
    info!("Listening on http://127.0.0.1:{}", listen_port);
    info!("Health check: http://127.0.0.1:{}/health", listen_port);

    axum::serve(listener, app).await?;

    Ok(())
}
