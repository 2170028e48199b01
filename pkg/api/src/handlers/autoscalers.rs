use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use pkg_state::registry::AutoscalerStore;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::object::ObjectKey;
use pkg_types::validate::validate_name;

use super::registry_error;
use crate::AppState;

pub async fn list_all_autoscalers(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_autoscalers(None).await {
        Ok(hpas) => (StatusCode::OK, Json(hpas)).into_response(),
        Err(e) => registry_error(e),
    }
}

pub async fn list_autoscalers(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.registry.list_autoscalers(Some(&ns)).await {
        Ok(hpas) => (StatusCode::OK, Json(hpas)).into_response(),
        Err(e) => registry_error(e),
    }
}

pub async fn get_autoscaler(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.registry.get_autoscaler(&ObjectKey::new(ns, name)).await {
        Ok(Some(hpa)) => (StatusCode::OK, Json(hpa)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => registry_error(e),
    }
}

/// PUT /api/v1/namespaces/{ns}/horizontalpodautoscalers/{name}
///
/// Records an autoscaler together with its observed status, the way the
/// native autoscaling mechanism would publish it.
pub async fn put_autoscaler(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut hpa): Json<HorizontalPodAutoscaler>,
) -> impl IntoResponse {
    for n in [&ns, &name] {
        if let Err(e) = validate_name(n) {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }
    if hpa.spec.min_replicas > hpa.spec.max_replicas {
        return (
            StatusCode::BAD_REQUEST,
            format!(
                "min_replicas ({}) must not exceed max_replicas ({})",
                hpa.spec.min_replicas, hpa.spec.max_replicas
            ),
        )
            .into_response();
    }
    hpa.namespace = ns;
    hpa.name = name;

    match state.registry.apply_autoscaler(hpa).await {
        Ok(hpa) => {
            info!("Applied autoscaler {}", hpa.summary());
            let code = if hpa.resource_version == 1 {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (code, Json(hpa)).into_response()
        }
        Err(e) => registry_error(e),
    }
}

pub async fn delete_autoscaler(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    let key = ObjectKey::new(ns, name);
    match state.registry.delete_autoscaler(&key).await {
        Ok(true) => {
            info!("Deleted autoscaler {}", key);
            StatusCode::OK.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => registry_error(e),
    }
}
