//! `POST /v1/actions` — the write path.

use std::collections::BTreeSet;

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use opslog_core::write_coordinator::WriteRequest;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WriteBody {
    #[serde(rename = "operationId")]
    operation_id: String,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    who: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    payload: serde_json::Value,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Serialize)]
pub struct WriteResponse {
    success: bool,
    #[serde(rename = "logId")]
    log_id: String,
    session_id: String,
    stores: BTreeSet<opslog_core::types::StoreTag>,
    store_results: std::collections::BTreeMap<opslog_core::types::StoreTag, opslog_core::types::StoreOutcome>,
    idempotent_hit: bool,
}

pub async fn write_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> Result<Json<WriteResponse>, AppError> {
    let idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let span = tracing::info_span!("write_action", operation_id = %body.operation_id);
    let result = state
        .writer
        .write(WriteRequest {
            operation_id: body.operation_id,
            session_id: body.session_id,
            who: body.who,
            tags: body.tags,
            payload: body.payload,
            is_error: body.is_error,
            idempotency_key,
        })
        .instrument(span)
        .await?;

    Ok(Json(WriteResponse {
        success: matches!(result.status, opslog_core::types::WriteStatus::Ok | opslog_core::types::WriteStatus::Degraded),
        log_id: result.id,
        session_id: result.session_id,
        stores: result.stores,
        store_results: result.status_per_store,
        idempotent_hit: result.idempotent_hit,
    }))
}
