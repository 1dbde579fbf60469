//! Router construction for the action-logging server.

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::ops::ops_middleware;
use crate::state::AppState;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    Router::new()
        .route("/v1/actions", post(handlers::write::write_action))
        .route("/v1/actions/recent", get(handlers::read::recent))
        .route("/v1/actions/session/:session_id", get(handlers::read::by_session))
        .route("/v1/reconcile", post(handlers::reconcile::reconcile))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(axum_mw::from_fn_with_state(state.clone(), ops_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    if state.config.cors_allow_origins.is_empty() {
        return CorsLayer::new().allow_origin(Any);
    }
    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors_allow_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(origins)
}
