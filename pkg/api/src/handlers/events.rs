use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};

use pkg_state::registry::EventStore;

use super::registry_error;
use crate::AppState;

/// GET /api/v1/namespaces/{ns}/events, oldest first.
pub async fn list_events(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.registry.list_events(&ns).await {
        Ok(events) => (StatusCode::OK, Json(events)).into_response(),
        Err(e) => registry_error(e),
    }
}
