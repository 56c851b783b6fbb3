//! Call lifecycle endpoints
//!
//! Clients open a call, post audio fragments to it, and hang up. Each
//! fragment runs through the pipeline and answers with the transcript, the
//! reply text and the synthesized reply as base64.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::pipeline::{Outcome, PipelineResult};
use crate::session::{SessionAnalytics, SessionExport};

#[derive(Deserialize)]
pub struct CreateCallRequest {
    pub client_id: String,
    pub user_id: Option<String>,
}

/// Pipeline result with audio encoded for JSON
#[derive(Serialize)]
pub struct FragmentResponse {
    pub session_id: String,
    pub outcome: Outcome,
    pub transcript: String,
    pub reply: String,
    /// Base64 encoded reply audio
    pub audio: Option<String>,
    pub confidence: f32,
    pub processing_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<PipelineResult> for FragmentResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            session_id: result.session_id,
            outcome: result.outcome,
            transcript: result.transcript,
            reply: result.reply,
            audio: result
                .audio
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            confidence: result.confidence,
            processing_time_ms: result.processing_time.as_millis(),
            error: result.error,
        }
    }
}

#[derive(Serialize)]
pub struct ActiveCallsResponse {
    pub count: usize,
    pub sessions: Vec<SessionAnalytics>,
}

/// Open a call for a client
async fn create_call(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateCallRequest>,
) -> Result<(StatusCode, Json<SessionAnalytics>), ApiError> {
    if req.client_id.trim().is_empty() {
        return Err(ApiError::BadRequest("client_id must not be empty"));
    }

    let session = state
        .service
        .create_session(&req.client_id, req.user_id.as_deref())?;

    Ok((StatusCode::CREATED, Json(session.analytics(Utc::now()))))
}

/// Run one audio fragment through the pipeline
async fn post_audio(
    State(state): State<Arc<ApiState>>,
    Path(client_id): Path<String>,
    body: Bytes,
) -> Result<Json<FragmentResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("audio body is empty"));
    }

    tracing::debug!(client_id = %client_id, bytes = body.len(), "audio fragment received");

    let result = state.service.process_fragment(&client_id, &body).await?;
    Ok(Json(result.into()))
}

/// Hang up a call and return its final record
async fn end_call(
    State(state): State<Arc<ApiState>>,
    Path(client_id): Path<String>,
) -> Result<Json<SessionExport>, ApiError> {
    state
        .service
        .end_session(&client_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no active call for client {client_id}")))
}

async fn active_calls(State(state): State<Arc<ApiState>>) -> Json<ActiveCallsResponse> {
    let sessions = state.service.active_sessions();
    Json(ActiveCallsResponse {
        count: sessions.len(),
        sessions,
    })
}

async fn session_analytics(
    State(state): State<Arc<ApiState>>,
    Path(client_id): Path<String>,
) -> Result<Json<SessionAnalytics>, ApiError> {
    state
        .service
        .session_analytics(&client_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no session for client {client_id}")))
}

async fn user_sessions(
    State(state): State<Arc<ApiState>>,
    Path(user_id): Path<String>,
) -> Json<Vec<SessionExport>> {
    Json(state.service.user_sessions(&user_id))
}

/// Build calls router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/calls", post(create_call))
        .route("/calls/{client_id}", delete(end_call))
        .route("/calls/{client_id}/audio", post(post_audio))
        .route("/active-calls", get(active_calls))
        .route("/sessions/{client_id}/analytics", get(session_analytics))
        .route("/users/{user_id}/sessions", get(user_sessions))
        .with_state(state)
}
