//! Maps `OpsLogError` to HTTP status codes and JSON error bodies.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use opslog_core::error::OpsLogError;
use serde_json::json;

pub struct AppError(OpsLogError);

impl From<OpsLogError> for AppError {
    fn from(e: OpsLogError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": self.0.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
