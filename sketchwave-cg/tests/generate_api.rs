//! Generation API integration tests
//!
//! Drives the full router with mock external collaborators injected through
//! AppState, covering the three invocation modes, validation failures, and
//! terminal error classification on the wire.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sketchwave_cg::clients::{
    ComposeError, ComposeService, ComposeSubmission, ComposeTaskSnapshot, VisionAnalyzer,
    VisionError,
};
use sketchwave_cg::config::CgConfig;
use sketchwave_cg::types::PollPlan;
use sketchwave_cg::{build_router, AppState};
use sketchwave_common::events::EventBus;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Mock vision service with canned replies and call counters
struct MockVision {
    image_reply: Result<&'static str, ()>,
    text_reply: &'static str,
    calls: AtomicU32,
}

impl MockVision {
    fn ok(image_reply: &'static str, text_reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            image_reply: Ok(image_reply),
            text_reply,
            calls: AtomicU32::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            image_reply: Err(()),
            text_reply: "",
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl VisionAnalyzer for MockVision {
    async fn describe_image(
        &self,
        _image: &[u8],
        _instruction: &str,
    ) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.image_reply
            .map(str::to_string)
            .map_err(|_| VisionError::EmptyText)
    }

    async fn generate_text(&self, _instruction: &str) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.text_reply.is_empty() {
            Err(VisionError::EmptyText)
        } else {
            Ok(self.text_reply.to_string())
        }
    }
}

/// Mock compose service with scripted status responses
struct MockCompose {
    submitted: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<Value>>,
    reject_submission: bool,
}

impl MockCompose {
    fn with_statuses(statuses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
            reject_submission: false,
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            reject_submission: true,
        })
    }
}

#[async_trait]
impl ComposeService for MockCompose {
    async fn submit(&self, prompt: &str) -> Result<ComposeSubmission, ComposeError> {
        self.submitted.lock().unwrap().push(prompt.to_string());
        if self.reject_submission {
            return Err(ComposeError::MissingTaskId {
                raw: json!({ "detail": "quota exceeded" }),
            });
        }
        Ok(ComposeSubmission {
            task_id: "t1".to_string(),
            raw: json!({ "task_id": "t1" }),
        })
    }

    async fn task_status(&self, _task_id: &str) -> Result<ComposeTaskSnapshot, ComposeError> {
        let mut statuses = self.statuses.lock().unwrap();
        let raw = if statuses.len() > 1 {
            statuses.pop_front().unwrap()
        } else {
            statuses.front().expect("status script must not be empty").clone()
        };
        let status = raw["status"].as_str().unwrap_or("").to_string();
        Ok(ComposeTaskSnapshot { status, raw })
    }
}

fn test_config() -> CgConfig {
    CgConfig {
        listen_port: 0,
        vision_api_key: "vk-test".to_string(),
        vision_base_url: "http://vision.invalid".to_string(),
        vision_model: "test-model".to_string(),
        compose_api_key: "ck-test".to_string(),
        compose_base_url: "http://compose.invalid".to_string(),
        poll: PollPlan {
            max_attempts: 10,
            interval: Duration::from_millis(1),
        },
    }
}

fn test_app(vision: Arc<MockVision>, compose: Arc<MockCompose>) -> axum::Router {
    let state = AppState::new(test_config(), vision, compose, EventBus::new(100));
    build_router(state)
}

fn composed(url: &str) -> Value {
    json!({ "status": "composed", "meta": { "track_url": url } })
}

fn pending() -> Value {
    json!({ "status": "composing" })
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn board_image() -> String {
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; 4096])
}

#[tokio::test]
async fn fresh_generation_two_boards_end_to_end() {
    let vision = MockVision::ok("a calm brief", "one unified prompt");
    let compose = MockCompose::with_statuses(vec![pending(), pending(), composed("https://cdn/track.wav")]);
    let app = test_app(vision, compose.clone());

    let request = json!({
        "boards": [
            { "id": "b1", "name": "Dawn", "imageBase64": board_image() },
            { "id": "b2", "strokeCount": 6 }
        ],
        "totalDuration": 60
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], "t1");
    assert_eq!(body["trackUrl"], "https://cdn/track.wav");
    assert_eq!(body["beatovenPrompt"], "one unified prompt");
    assert_eq!(body["perBoardResults"].as_array().unwrap().len(), 2);
    assert_eq!(body["perBoardDurations"][0]["duration"], 30);
    assert_eq!(body["perBoardDurations"][1]["duration"], 30);
    assert_eq!(body["perBoardResults"][0]["canvasId"], "b1");
    assert_eq!(body["beatovenMeta"]["status"], "composed");
    assert_eq!(compose.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_eligible_boards_is_400_without_external_calls() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision.clone(), compose.clone());

    let request = json!({
        "boards": [ { "id": "b1", "strokeCount": 2 } ]
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "NO_ELIGIBLE_BOARDS");
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    assert!(compose.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn retry_mode_submits_stored_prompt_unchanged() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("https://cdn/retry.wav")]);
    let app = test_app(vision.clone(), compose.clone());

    let request = json!({
        "retryMode": true,
        "beatovenPrompt": "the stored prompt"
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["beatovenPrompt"], "the stored prompt");
    assert!(body.get("perBoardResults").is_none());
    assert_eq!(
        compose.submitted.lock().unwrap().as_slice(),
        &["the stored prompt".to_string()]
    );
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retry_without_prompt_is_400() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision, compose);

    let (status, body) = post_json(app, "/generate", json!({ "retryMode": true })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_PROMPT");
}

#[tokio::test]
async fn adjust_with_blank_instructions_is_400() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision.clone(), compose);

    let request = json!({
        "adjustMode": true,
        "beatovenPrompt": "old",
        "adjustInstructions": "   "
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BLANK_ADJUST_INSTRUCTIONS");
    assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn conflicting_mode_flags_are_rejected() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision, compose);

    let request = json!({
        "retryMode": true,
        "adjustMode": true,
        "beatovenPrompt": "p",
        "adjustInstructions": "i"
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CONFLICTING_MODES");
}

#[tokio::test]
async fn adjust_mode_submits_revised_prompt() {
    let vision = MockVision::ok("unused", "revised by instructions");
    let compose = MockCompose::with_statuses(vec![composed("https://cdn/adj.wav")]);
    let app = test_app(vision, compose.clone());

    let request = json!({
        "adjustMode": true,
        "beatovenPrompt": "old prompt",
        "adjustInstructions": "add strings"
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["beatovenPrompt"], "revised by instructions");
    assert_eq!(
        compose.submitted.lock().unwrap().as_slice(),
        &["revised by instructions".to_string()]
    );
}

#[tokio::test]
async fn failed_composition_is_502_with_upstream_payload() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![json!({
        "status": "failed",
        "meta": { "reason": "render error" }
    })]);
    let app = test_app(vision, compose);

    let request = json!({ "retryMode": true, "beatovenPrompt": "p" });
    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "COMPOSE_FAILED");
    assert_eq!(body["error"]["upstream"]["meta"]["reason"], "render error");
}

#[tokio::test]
async fn poll_ceiling_is_504_timeout() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![pending()]);
    let app = test_app(vision, compose);

    let request = json!({ "retryMode": true, "beatovenPrompt": "p" });
    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "COMPOSE_TIMEOUT");
}

#[tokio::test]
async fn missing_task_id_is_submission_failure() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::rejecting();
    let app = test_app(vision, compose);

    let request = json!({ "retryMode": true, "beatovenPrompt": "p" });
    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "COMPOSE_SUBMISSION_FAILED");
    assert_eq!(body["error"]["upstream"]["detail"], "quota exceeded");
}

#[tokio::test]
async fn analysis_failure_on_every_board_reports_briefs() {
    let vision = MockVision::failing();
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision, compose);

    let request = json!({
        "boards": [
            { "id": "b1", "imageBase64": board_image() },
            { "id": "b2", "imageBase64": board_image() }
        ]
    });

    let (status, body) = post_json(app, "/generate", request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "ANALYSIS_FAILED");
    let briefs = body["error"]["perBoardResults"].as_array().unwrap();
    assert_eq!(briefs.len(), 2);
    assert!(briefs[0]["error"].is_string());
}

#[tokio::test]
async fn client_disconnect_releases_cancellation_token() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![pending()]);
    // Slow poll plan so the run is still in flight when the client goes away
    let mut config = test_config();
    config.poll = PollPlan {
        max_attempts: 90,
        interval: Duration::from_secs(2),
    };
    let state = AppState::new(config, vision, compose, EventBus::new(100));
    let app = build_router(state.clone());

    let request_id = uuid::Uuid::new_v4();
    let body = json!({
        "retryMode": true,
        "beatovenPrompt": "p",
        "requestId": request_id
    });
    let handle = tokio::spawn(async move {
        let _ = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        state
            .cancellation_tokens
            .read()
            .unwrap()
            .contains_key(&request_id),
        "token should be registered while the run is in flight"
    );

    // Aborting the task drops the handler future mid-run, as axum does
    // when the client disconnects
    handle.abort();
    let _ = handle.await;

    assert!(
        state.cancellation_tokens.read().unwrap().is_empty(),
        "token registry must not leak entries for abandoned requests"
    );
}

#[tokio::test]
async fn cancel_unknown_request_is_404() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision, compose);

    let (status, body) = post_json(
        app,
        &format!("/generate/cancel/{}", uuid::Uuid::new_v4()),
        Value::Null,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn health_endpoint_reports_module_and_uptime() {
    let vision = MockVision::ok("x", "x");
    let compose = MockCompose::with_statuses(vec![composed("u")]);
    let app = test_app(vision, compose);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["module"], "sketchwave-cg");
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_seconds"].is_u64());
}
