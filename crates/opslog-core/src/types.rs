//! Core domain types for the action-logging core.
//! Pure value types — no sqlx, no storage-engine dependencies.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Log severity. `kind` ends in `_error` iff `level == Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Store tag — discriminates the four persistence layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTag {
    Rel,
    Kv,
    Obj,
    Vec,
}

impl StoreTag {
    pub const ALL: [StoreTag; 4] = [StoreTag::Rel, StoreTag::Kv, StoreTag::Obj, StoreTag::Vec];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rel => "rel",
            Self::Kv => "kv",
            Self::Obj => "obj",
            Self::Vec => "vec",
        }
    }
}

impl fmt::Display for StoreTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-store outcome of a single fan-out write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Ok,
    SkippedBreaker,
    Error,
    Disabled,
}

/// R2 policy — per-operation directive controlling whether the object
/// store receives a copy (glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum R2Policy {
    Required,
    Optional,
    None,
}

/// The envelope every store agrees on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_id: String,
    pub kind: String,
    pub level: Level,
    pub session_id: String,
    pub who: String,
    pub tags: BTreeSet<String>,
    pub payload: serde_json::Value,
    pub stores: BTreeSet<StoreTag>,
    pub idempotency_key: Option<String>,
    /// Set by the reconciler on backfilled copies.
    pub backfilled: bool,
    pub backfilled_at: Option<DateTime<Utc>>,
}

impl LogRecord {
    /// Build a fresh envelope for a new write. `kind` and `level` are
    /// derived together so the invariant `kind ends in _error iff level
    /// == error` can never be violated by construction.
    pub fn new(
        operation_id: String,
        session_id: String,
        who: String,
        tags: BTreeSet<String>,
        payload: serde_json::Value,
        is_error: bool,
        idempotency_key: Option<String>,
    ) -> Self {
        let level = if is_error { Level::Error } else { Level::Info };
        let kind = if is_error {
            format!("{operation_id}_error")
        } else {
            operation_id.clone()
        };
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            operation_id,
            kind,
            level,
            session_id,
            who,
            tags,
            payload,
            stores: BTreeSet::new(),
            idempotency_key,
            backfilled: false,
            backfilled_at: None,
        }
    }

    pub fn validates_kind_level_invariant(&self) -> bool {
        self.kind.ends_with("_error") == (self.level == Level::Error)
    }

    /// The R2 object key for this record: `logs/<kind>/<YYYY-MM-DD>/<id>.json`.
    pub fn obj_key(&self) -> String {
        format!(
            "logs/{}/{}/{}.json",
            self.kind,
            self.timestamp.format("%Y-%m-%d"),
            self.id
        )
    }
}

/// A single idempotency record: (key, operationId, created_at, result_summary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation_id: String,
    pub created_at: DateTime<Utc>,
    pub result_summary: WriteResult,
}

/// The public contract of `WriteCoordinator::write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    pub operation_id: String,
    pub session_id: String,
    pub stores: BTreeSet<StoreTag>,
    pub idempotent_hit: bool,
    pub status_per_store: std::collections::BTreeMap<StoreTag, StoreOutcome>,
    pub status: WriteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Ok,
    Degraded,
    Error,
}

/// A read item, the canonicalized shape returned by `LogReader`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_id: String,
    pub kind: String,
    pub level: Level,
    pub session_id: String,
    pub tags: BTreeSet<String>,
    pub payload: serde_json::Value,
    pub stores: BTreeSet<StoreTag>,
}

impl From<LogRecord> for LogItem {
    fn from(r: LogRecord) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
            operation_id: r.operation_id,
            kind: r.kind,
            level: r.level,
            session_id: r.session_id,
            tags: r.tags,
            payload: r.payload,
            stores: r.stores,
        }
    }
}

/// Reconciliation summary returned by `Reconciler::run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub analyzed: usize,
    pub missing_counts: std::collections::BTreeMap<StoreTag, usize>,
    pub backfilled: usize,
    pub consistency: Consistency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    Perfect,
    Restored,
    Degraded,
}
