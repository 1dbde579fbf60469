//! Error kinds for the action-logging core.
//! Mirrors the write-path policy: Rel durability failure is the only
//! fatal write-path error; everything else degrades.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsLogError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request size exceeded")]
    SizeExceeded,

    #[error("rate limited")]
    RateLimited,

    #[error("store unavailable: {store}: {reason}")]
    StoreUnavailable { store: &'static str, reason: String },

    #[error("relational store durability failure: {0}")]
    RelDurabilityFailure(String),

    #[error("idempotency conflict for key {0}")]
    IdempotencyConflict(String),

    #[error("metrics failure: {0}")]
    MetricsFailure(String),

    #[error("reconciler partial failure: {0}")]
    ReconcilerPartial(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OpsLogError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::SizeExceeded => 413,
            Self::RateLimited => 429,
            Self::StoreUnavailable { .. } => 503,
            Self::RelDurabilityFailure(_) => 500,
            Self::IdempotencyConflict(_) => 409,
            Self::MetricsFailure(_) => 500,
            Self::ReconcilerPartial(_) => 207,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, OpsLogError>;
