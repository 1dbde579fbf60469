//! Postgres implementations of the relational and vector store ports.
//!
//! Both adapters wrap the same `PgPool` — the vector index rides on the
//! `pgvector` extension installed alongside the primary schema. All SQL
//! is runtime-checked (`sqlx::query`/`query_as`, not `sqlx::query!`) so
//! building this crate never requires a live database connection.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{PgPool, Row};

use opslog_core::error::{OpsLogError, Result};
use opslog_core::ports::RelStore;
use opslog_core::ports::VecStore;
use opslog_core::types::{Level, LogItem, LogRecord, StoreTag};

const SCHEMA_PROBE_TTL_SECONDS: i64 = 60;

/// Caches whether the current schema (`metamorphic_logs`) exists, so a
/// reader never probes twice within the TTL and never runs both the
/// current-schema and legacy-schema query concurrently for one call.
struct SchemaProbe {
    checked_at_epoch: AtomicI64,
    current_schema_present: std::sync::atomic::AtomicBool,
}

impl SchemaProbe {
    fn new() -> Self {
        Self {
            checked_at_epoch: AtomicI64::new(0),
            current_schema_present: std::sync::atomic::AtomicBool::new(true),
        }
    }

    async fn current_schema_present(&self, pool: &PgPool) -> bool {
        let now = Utc::now().timestamp();
        let last = self.checked_at_epoch.load(Ordering::Relaxed);
        if now - last < SCHEMA_PROBE_TTL_SECONDS {
            return self.current_schema_present.load(Ordering::Relaxed);
        }

        let present = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'metamorphic_logs')",
        )
        .fetch_one(pool)
        .await
        .unwrap_or(true);

        if !present {
            tracing::warn!("metamorphic_logs not found, reads will fall back to event_log");
        }
        self.current_schema_present.store(present, Ordering::Relaxed);
        self.checked_at_epoch.store(now, Ordering::Relaxed);
        present
    }
}

pub struct PgRelStore {
    pool: PgPool,
    schema_probe: SchemaProbe,
}

impl PgRelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, schema_probe: SchemaProbe::new() }
    }

    fn row_to_item(row: &sqlx::postgres::PgRow) -> std::result::Result<LogItem, sqlx::Error> {
        let level_str: String = row.try_get("level")?;
        let level = match level_str.as_str() {
            "error" => Level::Error,
            "warn" => Level::Warn,
            _ => Level::Info,
        };
        let tags: Vec<String> = row.try_get("tags").unwrap_or_default();
        Ok(LogItem {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            operation_id: row.try_get("operation_id")?,
            kind: row.try_get("kind")?,
            level,
            session_id: row.try_get("session_id")?,
            tags: tags.into_iter().collect(),
            payload: row.try_get("payload")?,
            stores: BTreeSet::from([StoreTag::Rel]),
        })
    }

    fn legacy_row_to_item(row: &sqlx::postgres::PgRow) -> std::result::Result<LogItem, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(LogItem {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            operation_id: kind.clone(),
            kind,
            level: Level::Info,
            session_id: row.try_get("session_id")?,
            tags: BTreeSet::new(),
            payload: row.try_get("payload")?,
            stores: BTreeSet::from([StoreTag::Rel]),
        })
    }
}

#[async_trait]
impl RelStore for PgRelStore {
    async fn write(&self, record: &LogRecord) -> Result<()> {
        let tags: Vec<String> = record.tags.iter().cloned().collect();
        sqlx::query(
            r#"
            INSERT INTO metamorphic_logs
                (id, timestamp, operation_id, kind, level, session_id, who, tags, payload,
                 idempotency_key, backfilled, backfilled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(record.timestamp)
        .bind(&record.operation_id)
        .bind(&record.kind)
        .bind(record.level.to_string())
        .bind(&record.session_id)
        .bind(&record.who)
        .bind(&tags)
        .bind(&record.payload)
        .bind(&record.idempotency_key)
        .bind(record.backfilled)
        .bind(record.backfilled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OpsLogError::RelDurabilityFailure(e.to_string()))?;
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LogItem>> {
        if self.schema_probe.current_schema_present(&self.pool).await {
            let rows = sqlx::query(
                r#"
                SELECT id, timestamp, operation_id, kind, level, session_id, tags, payload
                FROM metamorphic_logs
                ORDER BY timestamp DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "rel", reason: e.to_string() })?;
            rows.iter().map(Self::row_to_item).collect::<std::result::Result<_, _>>().map_err(|e| anyhow!(e).into())
        } else {
            let rows = sqlx::query(
                r#"
                SELECT id, ts AS timestamp, type AS kind, session_id, payload AS payload
                FROM event_log
                ORDER BY ts DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "rel", reason: e.to_string() })?;
            rows.iter().map(Self::legacy_row_to_item).collect::<std::result::Result<_, _>>().map_err(|e| anyhow!(e).into())
        }
    }

    async fn by_session(&self, session_id: &str, limit: i64) -> Result<Vec<LogItem>> {
        if self.schema_probe.current_schema_present(&self.pool).await {
            let rows = sqlx::query(
                r#"
                SELECT id, timestamp, operation_id, kind, level, session_id, tags, payload
                FROM metamorphic_logs
                WHERE session_id = $1
                ORDER BY timestamp DESC
                LIMIT $2
                "#,
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "rel", reason: e.to_string() })?;
            rows.iter().map(Self::row_to_item).collect::<std::result::Result<_, _>>().map_err(|e| anyhow!(e).into())
        } else {
            let rows = sqlx::query(
                r#"
                SELECT id, ts AS timestamp, type AS kind, session_id, payload AS payload
                FROM event_log
                WHERE session_id = $1
                ORDER BY ts DESC
                LIMIT $2
                "#,
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "rel", reason: e.to_string() })?;
            rows.iter().map(Self::legacy_row_to_item).collect::<std::result::Result<_, _>>().map_err(|e| anyhow!(e).into())
        }
    }

    async fn recent_in_window(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<LogItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, operation_id, kind, level, session_id, tags, payload
            FROM metamorphic_logs
            WHERE timestamp >= $1 AND timestamp < $2
            ORDER BY timestamp DESC
            "#,
        )
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OpsLogError::StoreUnavailable { store: "rel", reason: e.to_string() })?;
        rows.iter().map(Self::row_to_item).collect::<std::result::Result<_, _>>().map_err(|e| anyhow!(e).into())
    }
}

/// Vector index riding on `pgvector`, sharing the relational pool.
pub struct PgVecStore {
    pool: PgPool,
}

impl PgVecStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VecStore for PgVecStore {
    async fn upsert(&self, id: &str, embedding: Vec<f32>, metadata: serde_json::Value) -> Result<()> {
        let vector = Vector::from(embedding);
        sqlx::query(
            r#"
            INSERT INTO log_embeddings (id, embedding, metadata)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET embedding = EXCLUDED.embedding, metadata = EXCLUDED.metadata
            "#,
        )
        .bind(id)
        .bind(vector)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| OpsLogError::StoreUnavailable { store: "vec", reason: e.to_string() })?;
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let present: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM log_embeddings WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "vec", reason: e.to_string() })?;
        Ok(present)
    }
}
