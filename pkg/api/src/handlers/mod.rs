pub mod autoscalers;
pub mod events;
pub mod health;
pub mod tuners;
pub mod watch;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use pkg_state::registry::RegistryError;

/// Map a registry failure to an HTTP response.
pub(crate) fn registry_error(e: RegistryError) -> Response {
    match e {
        RegistryError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        RegistryError::Conflict { .. } => (StatusCode::CONFLICT, e.to_string()).into_response(),
        other => {
            warn!("Registry error: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}
