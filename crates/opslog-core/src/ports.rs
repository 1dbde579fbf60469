//! Storage port traits — implemented by `opslog-stores`.
//! Core logic depends only on these traits, never on a concrete engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{LogItem, LogRecord};

/// The relational store: primary, authoritative. Reads probe the current
/// schema first and fall back to a legacy schema transparently; that
/// fallback is an adapter-internal detail, never exposed here.
#[async_trait]
pub trait RelStore: Send + Sync {
    async fn write(&self, record: &LogRecord) -> Result<()>;
    async fn recent(&self, limit: i64) -> Result<Vec<LogItem>>;
    async fn by_session(&self, session_id: &str, limit: i64) -> Result<Vec<LogItem>>;
    async fn recent_in_window(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<LogItem>>;
}

/// Generic byte-oriented key-value port. Backs the KV store-adapter
/// (`log:<id>` entries) as well as circuit-breaker, rate-limiter,
/// idempotency, and metrics-snapshot persistence — they are all just
/// different key prefixes over the same port.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// `ttl_seconds = 0` means no expiry.
    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Object store: one object per record under `logs/<kind>/<YYYY-MM-DD>/<id>.json`.
#[async_trait]
pub trait ObjStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Vector index: one vector per record keyed by `id`.
#[async_trait]
pub trait VecStore: Send + Sync {
    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: serde_json::Value) -> Result<()>;
    async fn exists(&self, id: &str) -> Result<bool>;
}

/// External embedding provider — opaque to the core beyond "text/payload
/// summary in, vector out". Failure here is non-fatal to a write.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}
