//! Topic listing and history endpoints

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::access::AccessResolver;
use crate::api::types::ApiError;
use crate::domain::HistoryService;
use crate::domain::history::{HistoryParams, HistoryResponse, TopicSummary};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct HistoryApiState {
    pub history: Arc<HistoryService>,
    pub access: Arc<dyn AccessResolver>,
}

pub fn routes(history: Arc<HistoryService>, access: Arc<dyn AccessResolver>) -> Router<()> {
    let state = HistoryApiState { history, access };
    Router::new()
        .route("/topics", get(list_topics))
        .route("/history", get(get_history))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Registered topics visible to the caller
pub async fn list_topics(
    State(state): State<HistoryApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TopicSummary>>, ApiError> {
    let acl = state.access.resolve(&headers);
    let topics = state.history.list_topics(&acl).await?;
    Ok(Json(topics))
}

/// Raw or bucketed history of one topic
pub async fn get_history(
    State(state): State<HistoryApiState>,
    headers: HeaderMap,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) =
        params.map_err(|e| ApiError::bad_request("INVALID_QUERY", e.body_text()))?;
    let acl = state.access.resolve(&headers);
    let response = state.history.get_history(&acl, &params).await?;
    Ok(Json(response))
}
