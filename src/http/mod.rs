use std::future::ready;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

pub mod admission;

/// Routes served to the apiserver over TLS.
pub fn webhook_router() -> Router {
    Router::new()
        .route(admission::MUTATE_PATH, post(admission::mutate_handler))
        .route(admission::VALIDATE_PATH, post(admission::validate_handler))
}

/// Probes and metrics, served in plain HTTP on the management address.
pub fn management_router(recorder_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/healthz", get(|| ready("ok")))
        .route("/readyz", get(|| ready("ok")))
        .route("/metrics", get(move || ready(recorder_handle.render())))
}
