//! `GET /health` and `GET /ready`. Both always answer 200 — the payload,
//! not the status code, carries the verdict.

use axum::extract::State;
use axum::Json;

use opslog_core::health::{HealthReport, ReadinessReport};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.health().await)
}

pub async fn ready(State(state): State<AppState>) -> Json<ReadinessReport> {
    Json(state.health.readiness().await)
}
