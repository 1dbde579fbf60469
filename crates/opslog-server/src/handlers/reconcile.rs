//! `POST /v1/reconcile` — on-demand reconciliation trigger. The timer-
//! driven invocation lives in `main.rs`'s background task; this handler
//! is the on-demand half of the same `Reconciler`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::Instrument;

use opslog_core::types::ReconcileSummary;

use crate::state::AppState;

const DEFAULT_WINDOW_HOURS: i64 = 1;

#[derive(Deserialize)]
pub struct ReconcileQuery {
    window_hours: Option<i64>,
    #[serde(default)]
    dry_run: bool,
}

pub async fn reconcile(State(state): State<AppState>, Query(query): Query<ReconcileQuery>) -> Json<ReconcileSummary> {
    let window_hours = query.window_hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    let span = tracing::info_span!("reconcile", window_hours, dry_run = query.dry_run);
    let summary = state.reconciler.run(window_hours, query.dry_run).instrument(span).await;
    Json(summary)
}
