use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use pkg_types::object::ObjectKey;
use pkg_types::tuner::HpaTuner;
use pkg_types::validate::{validate_name, validate_tuner_spec};
use pkg_state::registry::TunerStore;

use super::registry_error;
use crate::AppState;

/// GET /api/v1/hpatuners
pub async fn list_all_tuners(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_tuners(None).await {
        Ok(tuners) => (StatusCode::OK, Json(tuners)).into_response(),
        Err(e) => registry_error(e),
    }
}

/// GET /api/v1/namespaces/{ns}/hpatuners
pub async fn list_tuners(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.registry.list_tuners(Some(&ns)).await {
        Ok(tuners) => (StatusCode::OK, Json(tuners)).into_response(),
        Err(e) => registry_error(e),
    }
}

pub async fn get_tuner(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.registry.get_tuner(&ObjectKey::new(ns, name)).await {
        Ok(Some(tuner)) => (StatusCode::OK, Json(tuner)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => registry_error(e),
    }
}

/// PUT /api/v1/namespaces/{ns}/hpatuners/{name}
///
/// Creates or replaces the tuner spec. Any status in the body is ignored.
pub async fn put_tuner(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut tuner): Json<HpaTuner>,
) -> impl IntoResponse {
    for n in [&ns, &name] {
        if let Err(e) = validate_name(n) {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }
    if let Err(e) = validate_tuner_spec(&tuner.spec) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    tuner.namespace = ns;
    tuner.name = name;

    match state.registry.apply_tuner(tuner).await {
        Ok(tuner) => {
            info!(
                "Applied hpatuner {} (version {})",
                tuner.key(),
                tuner.resource_version
            );
            let code = if tuner.resource_version == 1 {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (code, Json(tuner)).into_response()
        }
        Err(e) => registry_error(e),
    }
}

pub async fn delete_tuner(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    let key = ObjectKey::new(ns, name);
    match state.registry.delete_tuner(&key).await {
        Ok(true) => {
            info!("Deleted hpatuner {}", key);
            StatusCode::OK.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => registry_error(e),
    }
}
