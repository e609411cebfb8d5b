use super::state::AppState;
use crate::error::TaskError;
use crate::session::TaskKind;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub text: String,

    /// "repeat" (default) or "chat"
    #[serde(default)]
    pub kind: TaskKind,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub task_id: String,
    pub path: PathBuf,
    pub has_audio: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /speak
/// Run one speak task and return the exported file
pub async fn speak(State(state): State<AppState>, Json(req): Json<SpeakRequest>) -> impl IntoResponse {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "text must not be empty");
    }

    info!("Speak request ({} chars)", req.text.len());

    match state.orchestrator.process_text_task(&req.text, req.kind).await {
        Ok(Some(path)) => {
            let report = state.orchestrator.last_report().await;
            let task_id = report
                .as_ref()
                .map(|r| r.task_id.clone())
                .unwrap_or_default();
            let has_audio = report
                .as_ref()
                .and_then(|r| r.output.as_ref())
                .map_or(false, |o| o.has_audio);

            (
                StatusCode::OK,
                Json(SpeakResponse {
                    task_id,
                    path,
                    has_audio,
                }),
            )
                .into_response()
        }
        Ok(None) => {
            let reason = state
                .orchestrator
                .last_report()
                .await
                .and_then(|r| r.error)
                .unwrap_or_else(|| "task failed".to_string());
            error_response(StatusCode::BAD_GATEWAY, reason)
        }
        Err(TaskError::AlreadyProcessing) => {
            warn!("Speak rejected: task in flight");
            error_response(StatusCode::CONFLICT, TaskError::AlreadyProcessing.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /interrupt
/// Stop the current task, keeping what was captured
pub async fn interrupt(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.orchestrator.interrupt().await;
    (StatusCode::OK, Json(outcome))
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.orchestrator.status().await))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
