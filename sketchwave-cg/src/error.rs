//! Error types for sketchwave-cg
//!
//! Maps pipeline failures onto HTTP responses. Validation mistakes are
//! 400s; upstream/submission/composition failures are 502s with the raw
//! service payload attached for diagnostics; the poll ceiling is a 504
//! distinct from service-reported failure; caller cancellation is 499.

use crate::generation::GenerationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generation pipeline failure
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// sketchwave-common error
    #[error("Common error: {0}")]
    Common(#[from] sketchwave_common::Error),
}

/// Client-closed-request, used for caller-initiated cancellation
fn status_cancelled() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, extra) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, Value::Null),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, Value::Null)
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
                Value::Null,
            ),
            ApiError::Generation(err) => return generation_response(err),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                Value::Null,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
                Value::Null,
            ),
        };

        error_response(status, error_code, &message, "api", extra)
    }
}

/// Map one pipeline failure to its response, attaching diagnostics
fn generation_response(err: GenerationError) -> Response {
    let stage = err.stage();
    let message = err.to_string();
    let (status, code, extra) = match err {
        GenerationError::NoEligibleBoards => {
            (StatusCode::BAD_REQUEST, "NO_ELIGIBLE_BOARDS", Value::Null)
        }
        GenerationError::MissingPrompt => {
            (StatusCode::BAD_REQUEST, "MISSING_PROMPT", Value::Null)
        }
        GenerationError::BlankAdjustInstructions => (
            StatusCode::BAD_REQUEST,
            "BLANK_ADJUST_INSTRUCTIONS",
            Value::Null,
        ),
        GenerationError::ConflictingModes => {
            (StatusCode::BAD_REQUEST, "CONFLICTING_MODES", Value::Null)
        }
        GenerationError::AllAnalysesFailed { briefs } => (
            StatusCode::BAD_GATEWAY,
            "ANALYSIS_FAILED",
            json!({ "perBoardResults": briefs }),
        ),
        GenerationError::AdjustFailed { .. } => {
            (StatusCode::BAD_GATEWAY, "ADJUST_FAILED", Value::Null)
        }
        GenerationError::Submission { raw, .. } => (
            StatusCode::BAD_GATEWAY,
            "COMPOSE_SUBMISSION_FAILED",
            raw.map(|raw| json!({ "upstream": raw })).unwrap_or(Value::Null),
        ),
        GenerationError::CompositionFailed { raw } => (
            StatusCode::BAD_GATEWAY,
            "COMPOSE_FAILED",
            json!({ "upstream": raw }),
        ),
        GenerationError::Timeout { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "COMPOSE_TIMEOUT", Value::Null)
        }
        GenerationError::Cancelled => (status_cancelled(), "CANCELLED", Value::Null),
    };

    error_response(status, code, &message, stage, extra)
}

fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    stage: &str,
    extra: Value,
) -> Response {
    let mut error = json!({
        "code": code,
        "message": message,
        "stage": stage,
    });
    if let (Some(obj), Some(extra)) = (error.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }

    (status, Json(json!({ "error": error }))).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
