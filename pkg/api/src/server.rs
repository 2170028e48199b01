use axum::{
    Router, middleware,
    routing::get,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::AppState;
use crate::handlers::{autoscalers, events, health, tuners, watch};
use crate::request_id::request_id_middleware;

/// Build the HTTP router over `state`.
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/watch", get(watch::watch_events))
        // tuners
        .route("/api/v1/hpatuners", get(tuners::list_all_tuners))
        .route(
            "/api/v1/namespaces/{ns}/hpatuners",
            get(tuners::list_tuners),
        )
        .route(
            "/api/v1/namespaces/{ns}/hpatuners/{name}",
            get(tuners::get_tuner)
                .put(tuners::put_tuner)
                .delete(tuners::delete_tuner),
        )
        // autoscalers
        .route(
            "/api/v1/horizontalpodautoscalers",
            get(autoscalers::list_all_autoscalers),
        )
        .route(
            "/api/v1/namespaces/{ns}/horizontalpodautoscalers",
            get(autoscalers::list_autoscalers),
        )
        .route(
            "/api/v1/namespaces/{ns}/horizontalpodautoscalers/{name}",
            get(autoscalers::get_autoscaler)
                .put(autoscalers::put_autoscaler)
                .delete(autoscalers::delete_autoscaler),
        )
        // events
        .route(
            "/api/v1/namespaces/{ns}/events",
            get(events::list_events),
        )
        .route_layer(middleware::from_fn(request_id_middleware));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(health::metrics))
        .merge(api_routes)
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);

    info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
