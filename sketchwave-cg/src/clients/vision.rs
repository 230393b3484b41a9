//! Vision-language service client
//!
//! Wraps a Gemini-style `generateContent` endpoint for two call shapes:
//! image+text analysis (board → musical brief) and text-only generation
//! (prompt refinement / adjustment). Response text is extracted defensively:
//! all text parts of the first candidate are joined, and an empty result is
//! an error, never a success.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default public endpoint for the vision-language service
pub const DEFAULT_VISION_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for both image and text calls
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";

/// Request timeout for vision calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Vision-language call failures
#[derive(Debug, Error)]
pub enum VisionError {
    /// Transport-level failure
    #[error("Vision API request failed: {0}")]
    Network(String),

    /// Non-success HTTP status from the service
    #[error("Vision API returned error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body was not parseable JSON
    #[error("Failed to parse vision response: {0}")]
    Parse(String),

    /// Response parsed but carried no usable text
    #[error("Vision response contained no text")]
    EmptyText,
}

/// Seam for the vision-language collaborator
///
/// Object-safe so the pipeline can run against mock implementations in tests.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Analyze one image with the given instruction, returning the text reply
    async fn describe_image(&self, image: &[u8], instruction: &str)
        -> Result<String, VisionError>;

    /// Text-only generation call (refinement, adjustment)
    async fn generate_text(&self, instruction: &str) -> Result<String, VisionError>;
}

/// HTTP client for a Gemini-style vision-language service
pub struct GeminiVisionClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiVisionClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            model,
        }
    }

    /// Issue one generateContent call and return the extracted reply text
    async fn generate(&self, request: Value) -> Result<String, VisionError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        debug!(model = %self.model, "Vision call complete");
        extract_reply_text(&body).ok_or(VisionError::EmptyText)
    }
}

#[async_trait]
impl VisionAnalyzer for GeminiVisionClient {
    async fn describe_image(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<String, VisionError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let request = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inline_data": { "mime_type": "image/png", "data": encoded } },
                    { "text": instruction }
                ]
            }]
        });
        self.generate(request).await
    }

    async fn generate_text(&self, instruction: &str) -> Result<String, VisionError> {
        let request = json!({
            "contents": [{
                "role": "user",
                "parts": [ { "text": instruction } ]
            }]
        });
        self.generate(request).await
    }
}

/// Extract reply text from a generateContent response
///
/// Joins all text parts of the first candidate. Returns None for missing
/// candidates, missing parts, or whitespace-only text, so degenerate
/// placeholder replies are treated as failures by the caller.
pub fn extract_reply_text(body: &Value) -> Option<String> {
    let parts = body
        .pointer("/candidates/0/content/parts")?
        .as_array()?;

    let mut text = String::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(t);
        }
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_text_part() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "calm ambient piano" } ] }
            }]
        });
        assert_eq!(
            extract_reply_text(&body).as_deref(),
            Some("calm ambient piano")
        );
    }

    #[test]
    fn joins_multiple_text_parts() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "line one" }, { "text": "line two" } ] }
            }]
        });
        assert_eq!(
            extract_reply_text(&body).as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn empty_text_is_none() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [ { "text": "   " } ] }
            }]
        });
        assert!(extract_reply_text(&body).is_none());
    }

    #[test]
    fn missing_candidates_is_none() {
        assert!(extract_reply_text(&json!({})).is_none());
        assert!(extract_reply_text(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn non_text_parts_are_skipped() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [ { "inline_data": {} }, { "text": "tail" } ] }
            }]
        });
        assert_eq!(extract_reply_text(&body).as_deref(), Some("tail"));
    }
}
