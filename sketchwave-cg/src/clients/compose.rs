//! Async compose service client
//!
//! Wraps a Beatoven-style submit/poll task protocol: POST a prompt to start
//! a composition task, GET the task until it reaches a terminal status.
//! Track references are extracted from the status payload through an ordered
//! list of known locations, first non-null wins.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default base URL for the compose service
pub const DEFAULT_COMPOSE_BASE_URL: &str = "https://public-api.beatoven.ai";

/// Output format requested for rendered tracks
const OUTPUT_FORMAT: &str = "wav";

/// Request timeout for compose calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Known locations of the rendered track reference in status payloads,
/// tried in order
const TRACK_URL_POINTERS: [&str; 4] = [
    "/meta/track_url",
    "/meta/trackUrl",
    "/track_url",
    "/meta/output/track_url",
];

/// Compose service call failures
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Transport-level failure
    #[error("Compose API request failed: {0}")]
    Network(String),

    /// Non-success HTTP status from the service
    #[error("Compose API returned error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body was not parseable JSON
    #[error("Failed to parse compose response: {0}")]
    Parse(String),

    /// Submission response carried no task identifier
    #[error("Compose response did not include a task id")]
    MissingTaskId { raw: Value },
}

/// Accepted submission: the service's task handle plus the raw body
#[derive(Debug, Clone)]
pub struct ComposeSubmission {
    pub task_id: String,
    pub raw: Value,
}

/// One status query result, classification left to the poller
#[derive(Debug, Clone)]
pub struct ComposeTaskSnapshot {
    pub status: String,
    pub raw: Value,
}

/// Seam for the async compose collaborator
#[async_trait]
pub trait ComposeService: Send + Sync {
    /// Submit a prompt for composition, returning the assigned task handle
    async fn submit(&self, prompt: &str) -> Result<ComposeSubmission, ComposeError>;

    /// Query current status of a composition task
    async fn task_status(&self, task_id: &str) -> Result<ComposeTaskSnapshot, ComposeError>;
}

/// HTTP client for a Beatoven-style compose service
pub struct BeatovenComposeClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl BeatovenComposeClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ComposeService for BeatovenComposeClient {
    async fn submit(&self, prompt: &str) -> Result<ComposeSubmission, ComposeError> {
        let body = json!({
            "prompt": { "text": prompt },
            "format": OUTPUT_FORMAT,
            "looping": false,
        });

        let response = self
            .http_client
            .post(self.url("/api/v1/tracks/compose"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComposeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComposeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ComposeError::Parse(e.to_string()))?;

        let task_id = extract_task_id(&raw).ok_or(ComposeError::MissingTaskId { raw: raw.clone() })?;

        debug!(task_id = %task_id, "Composition task submitted");
        Ok(ComposeSubmission { task_id, raw })
    }

    async fn task_status(&self, task_id: &str) -> Result<ComposeTaskSnapshot, ComposeError> {
        let response = self
            .http_client
            .get(self.url(&format!("/api/v1/tasks/{}", task_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ComposeError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComposeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ComposeError::Parse(e.to_string()))?;

        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        Ok(ComposeTaskSnapshot { status, raw })
    }
}

/// Extract the task id from a submission response
///
/// Accepts both top-level and data-wrapped shapes.
pub fn extract_task_id(raw: &Value) -> Option<String> {
    ["/task_id", "/data/task_id"]
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}

/// Extract the rendered track reference from a terminal status payload
///
/// Tries each known location in order; first non-null string wins.
pub fn extract_track_url(raw: &Value) -> Option<String> {
    TRACK_URL_POINTERS
        .iter()
        .find_map(|p| raw.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_from_top_level() {
        let raw = json!({ "task_id": "t1" });
        assert_eq!(extract_task_id(&raw).as_deref(), Some("t1"));
    }

    #[test]
    fn task_id_from_data_wrapper() {
        let raw = json!({ "data": { "task_id": "t2" } });
        assert_eq!(extract_task_id(&raw).as_deref(), Some("t2"));
    }

    #[test]
    fn missing_task_id_is_none() {
        assert!(extract_task_id(&json!({ "status": "ok" })).is_none());
    }

    #[test]
    fn track_url_from_meta_snake_case() {
        let raw = json!({ "meta": { "track_url": "https://cdn/track.wav" } });
        assert_eq!(
            extract_track_url(&raw).as_deref(),
            Some("https://cdn/track.wav")
        );
    }

    #[test]
    fn track_url_prefers_first_matching_shape() {
        let raw = json!({
            "meta": { "track_url": "first", "trackUrl": "second" },
            "track_url": "third",
        });
        assert_eq!(extract_track_url(&raw).as_deref(), Some("first"));
    }

    #[test]
    fn track_url_falls_through_shapes_in_order() {
        let raw = json!({ "meta": { "output": { "track_url": "nested" } } });
        assert_eq!(extract_track_url(&raw).as_deref(), Some("nested"));

        let raw = json!({ "track_url": "flat" });
        assert_eq!(extract_track_url(&raw).as_deref(), Some("flat"));
    }

    #[test]
    fn track_url_absent_is_none() {
        assert!(extract_track_url(&json!({ "meta": {} })).is_none());
        assert!(extract_track_url(&json!({ "meta": { "track_url": 42 } })).is_none());
    }

    #[test]
    fn null_track_url_falls_through_to_next_shape() {
        let raw = json!({ "meta": { "track_url": null }, "track_url": "flat" });
        assert_eq!(extract_track_url(&raw).as_deref(), Some("flat"));
    }
}
