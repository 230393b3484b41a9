//! Generation API handlers
//!
//! POST /generate runs one sketch-to-music orchestration to completion and
//! returns the assembled result. POST /generate/cancel/:request_id aborts an
//! in-flight run via its cancellation token.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::generation::eligibility::decode_image_payload;
use crate::generation::{run_generation, GenerationRequest};
use crate::types::{BoardSubmission, Brief};
use crate::{AppState, TokenRegistry};

/// One board in the POST /generate request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPayload {
    pub id: String,
    pub name: Option<String>,
    /// Board image, base64 with or without a data-URL prefix
    pub image_base64: Option<String>,
    #[serde(default)]
    pub stroke_count: u32,
}

/// POST /generate request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateApiRequest {
    #[serde(default)]
    pub boards: Vec<BoardPayload>,
    pub total_duration: Option<u32>,
    #[serde(default)]
    pub retry_mode: bool,
    #[serde(default)]
    pub adjust_mode: bool,
    /// Prompt from a previous run, required for retry/adjust
    pub beatoven_prompt: Option<String>,
    /// Required for adjust mode
    pub adjust_instructions: Option<String>,
    /// Caller-supplied id enabling mid-run cancellation
    pub request_id: Option<Uuid>,
}

/// Per-board duration entry in the response
#[derive(Debug, Serialize)]
pub struct BoardDuration {
    pub id: String,
    pub duration: u32,
}

/// POST /generate response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateApiResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_board_results: Option<Vec<Brief>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_board_durations: Option<Vec<BoardDuration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_prompt: Option<String>,
    /// The prompt submitted for composition; input to later retry/adjust
    pub beatoven_prompt: String,
    #[serde(rename = "task_id")]
    pub task_id: String,
    pub track_url: Option<String>,
    /// Raw terminal payload from the compose service
    pub beatoven_meta: Value,
    pub request_id: Uuid,
}

/// POST /generate/cancel/:request_id response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub request_id: Uuid,
    pub cancelled: bool,
}

/// Registry entry for one run's cancellation token
///
/// Removal happens in `Drop`, so the entry is released both on normal
/// completion and when axum drops the handler future on client disconnect.
/// Without this, abandoned requests would leak registry entries for runs
/// nobody can ever complete or cancel.
struct TokenRegistration {
    request_id: Uuid,
    tokens: TokenRegistry,
}

impl TokenRegistration {
    fn register(tokens: &TokenRegistry, request_id: Uuid, token: CancellationToken) -> Self {
        if let Ok(mut map) = tokens.write() {
            map.insert(request_id, token);
        }
        Self {
            request_id,
            tokens: std::sync::Arc::clone(tokens),
        }
    }
}

impl Drop for TokenRegistration {
    fn drop(&mut self) {
        if let Ok(mut map) = self.tokens.write() {
            map.remove(&self.request_id);
        }
    }
}

fn to_domain_request(request: GenerateApiRequest) -> GenerationRequest {
    let boards = request
        .boards
        .into_iter()
        .map(|board| BoardSubmission {
            id: board.id,
            name: board.name,
            image: board.image_base64.as_deref().and_then(decode_image_payload),
            stroke_count: board.stroke_count,
        })
        .collect();

    GenerationRequest {
        boards,
        total_duration_secs: request.total_duration,
        retry_mode: request.retry_mode,
        adjust_mode: request.adjust_mode,
        stored_prompt: request.beatoven_prompt,
        adjust_instructions: request.adjust_instructions,
    }
}

/// POST /generate
///
/// Runs the orchestration to completion; the response includes the rendered
/// track reference. Long-running: polling can take up to the configured
/// ceiling (~3 minutes by default).
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateApiRequest>,
) -> ApiResult<Json<GenerateApiResponse>> {
    let request_id = request.request_id.unwrap_or_else(Uuid::new_v4);

    let cancel = CancellationToken::new();
    let _registration =
        TokenRegistration::register(&state.cancellation_tokens, request_id, cancel.clone());

    let ctx = state.generation_context();
    let result = run_generation(&ctx, request_id, to_domain_request(request), cancel).await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            return Err(ApiError::from(e));
        }
    };

    let per_board_durations = outcome.briefs.as_ref().map(|briefs| {
        briefs
            .iter()
            .map(|b| BoardDuration {
                id: b.canvas_id.clone(),
                duration: b.segment_duration_seconds,
            })
            .collect()
    });

    Ok(Json(GenerateApiResponse {
        per_board_results: outcome.briefs,
        per_board_durations,
        combined_prompt: outcome.combined_prompt,
        beatoven_prompt: outcome.final_prompt,
        task_id: outcome.task.task_id,
        track_url: outcome.task.result_track_ref,
        beatoven_meta: outcome.task.raw,
        request_id,
    }))
}

/// POST /generate/cancel/:request_id
///
/// Cancels an in-flight generation run. The run itself responds to its
/// original caller with a cancelled error; this endpoint only fires the
/// token.
pub async fn cancel_generation(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let token = state
        .cancellation_tokens
        .read()
        .map_err(|_| ApiError::Internal("cancellation registry lock poisoned".to_string()))?
        .get(&request_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("No active generation run: {}", request_id)))?;

    token.cancel();
    tracing::info!(request_id = %request_id, "Generation run cancellation requested");

    Ok(Json(CancelResponse {
        request_id,
        cancelled: true,
    }))
}

/// Build generation routes
pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate))
        .route("/generate/cancel/:request_id", post(cancel_generation))
}
