//! Analytics endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use super::ApiState;
use crate::analytics::{CallAnalytics, CommonQuestions, ErrorAnalytics};
use crate::session::SessionsSummary;

const DEFAULT_QUESTION_LIMIT: usize = 10;

#[derive(Deserialize)]
pub struct QuestionsQuery {
    pub limit: Option<usize>,
}

async fn calls(State(state): State<Arc<ApiState>>) -> Json<CallAnalytics> {
    Json(state.service.call_analytics())
}

async fn common_questions(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<QuestionsQuery>,
) -> Json<CommonQuestions> {
    let limit = query.limit.unwrap_or(DEFAULT_QUESTION_LIMIT);
    Json(state.service.common_questions(limit))
}

async fn errors(State(state): State<Arc<ApiState>>) -> Json<ErrorAnalytics> {
    Json(state.service.error_analytics())
}

async fn sessions(State(state): State<Arc<ApiState>>) -> Json<SessionsSummary> {
    Json(state.service.sessions_summary())
}

/// Build analytics router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/calls", get(calls))
        .route("/common-questions", get(common_questions))
        .route("/errors", get(errors))
        .route("/sessions", get(sessions))
        .with_state(state)
}
