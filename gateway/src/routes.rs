//! Route definitions and endpoint mappings for the gateway API.
//!
//! This file should remain minimal, containing only endpoint path definitions and their handler mappings.

use axum::Router;
use axum::routing::get;
use gateway_core::endpoints;
use gateway_core::endpoints::openai_compatible::RouterExt as _;
use gateway_core::utils::gateway::AppStateData;
use metrics_exporter_prometheus::PrometheusHandle;

pub fn build_api_routes(metrics_handle: PrometheusHandle) -> Router<AppStateData> {
    Router::new()
        .register_openai_compatible_routes()
        .route("/", get(endpoints::status::root_handler))
        .route("/health", get(endpoints::status::health_handler))
        .route(
            "/metrics",
            get(move || std::future::ready(metrics_handle.render())),
        )
}
