pub mod error;
pub mod rest;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use scamwatch_store::ReportStore;

pub struct AppState {
    pub store: Arc<dyn ReportStore>,
    /// Attempt cutoff used to count stalled reports.
    pub max_attempts: i32,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        .route("/api/reports", get(rest::api_reports))
        .route("/api/reports/search", get(rest::api_search_reports))
        .route("/api/reports/{id}", get(rest::api_report_detail))
        .route(
            "/api/reports/{id}/engagement/{kind}",
            post(rest::api_record_engagement),
        )
        .route("/api/stats", get(rest::api_stats))
        .route("/api/locations", get(rest::api_locations))
        .route("/api/locations/geojson", get(rest::api_locations_geojson))
        .route("/api/locations/{country}", get(rest::api_location_detail))
        .route("/api/countries/resolve", get(rest::api_resolve_country))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CompressionLayer::new())
        // Method, path and status only; query strings may carry search text.
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}
