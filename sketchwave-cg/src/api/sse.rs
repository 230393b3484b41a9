//! Server-Sent Events (SSE) for generation progress streaming

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

/// GET /events - SSE stream of generation progress
///
/// Streams every `GenerationEvent` emitted by in-flight runs: RunStarted,
/// BoardAnalyzed, PromptReady, TaskSubmitted, PollProgress, and the terminal
/// RunCompleted / RunFailed / RunCancelled events.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to generation events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            let event_type = event.event_type();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    debug!("SSE: Broadcasting event: {}", event_type);
                                    yield Ok(Event::default()
                                        .event(event_type)
                                        .data(event_json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                        }
                        Err(e) => {
                            // Lagged subscriber or closed bus: keep the
                            // connection alive on heartbeats
                            debug!("SSE: receive error: {}", e);
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
