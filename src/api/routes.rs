use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

use super::handlers;
use super::AppState;

/// Creates the query API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Recommendations
        .route(
            "/users/:user_id/recommendations",
            get(handlers::recommend),
        )
        // Diagnostics
        .route("/users/:user_id/affinities", get(handlers::get_affinities))
        .route("/events/:event_id/neighbors", get(handlers::get_neighbors))
        .route("/events/:event_id/similar", get(handlers::get_similar))
        .route("/events/interactions", post(handlers::interactions_count))
        .route("/ingest/status", get(handlers::ingest_status))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}
