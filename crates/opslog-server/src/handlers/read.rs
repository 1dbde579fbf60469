//! `GET /v1/actions/recent` and `GET /v1/actions/session/:session_id`.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use opslog_core::types::LogItem;

use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 20;

#[derive(Deserialize)]
pub struct RecentQuery {
    limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ItemsResponse {
    items: Vec<LogItem>,
    session_id: Option<String>,
}

pub async fn recent(State(state): State<AppState>, Query(query): Query<RecentQuery>) -> Json<ItemsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let span = tracing::info_span!("read_recent", limit);
    let items = tracing::Instrument::instrument(state.reader.recent(limit), span).await;
    Json(ItemsResponse { items, session_id: None })
}

pub async fn by_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<RecentQuery>,
) -> Json<ItemsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let span = tracing::info_span!("read_by_session", session_id = %session_id, limit);
    let items = tracing::Instrument::instrument(state.reader.by_session(&session_id, limit), span).await;
    Json(ItemsResponse { items, session_id: Some(session_id) })
}
