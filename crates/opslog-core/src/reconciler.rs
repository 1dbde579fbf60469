//! Periodic and on-demand consistency sweep. Rel is ground truth;
//! KV/Vec/Obj are checked for presence and backfilled when missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::metrics::Metrics;
use crate::op_registry::OpRegistry;
use crate::ports::{EmbeddingProvider, KvStore, ObjStore, RelStore, VecStore};
use crate::types::{Consistency, LogItem, LogRecord, R2Policy, ReconcileSummary, StoreTag};

pub struct Reconciler {
    pub rel: Arc<dyn RelStore>,
    pub kv: Arc<dyn KvStore>,
    pub obj: Arc<dyn ObjStore>,
    pub vec: Arc<dyn VecStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub ops: Arc<OpRegistry>,
    pub metrics: Arc<Metrics>,
    pub kv_ttl_seconds: u64,
}

impl Reconciler {
    pub async fn run(&self, window_hours: i64, dry_run: bool) -> ReconcileSummary {
        let until = Utc::now();
        let since = until - ChronoDuration::hours(window_hours);

        let items = match self.rel.recent_in_window(since, until).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("reconciler: recent_in_window failed: {e}");
                self.metrics.increment("reconcile_error_total", &[]).await;
                return ReconcileSummary {
                    analyzed: 0,
                    missing_counts: BTreeMap::new(),
                    backfilled: 0,
                    consistency: Consistency::Degraded,
                };
            }
        };

        let mut missing_counts: BTreeMap<StoreTag, usize> = BTreeMap::new();
        let mut backfilled = 0usize;
        let mut any_missing = false;
        let mut any_unbackfilled = false;

        for item in &items {
            let r2_policy = self.ops.r2_policy(&item.operation_id);

            let kv_missing = !self.kv_present(&item.id).await;
            let vec_missing = !self.vec.exists(&item.id).await.unwrap_or(false);
            let obj_missing = r2_policy != R2Policy::None && !self.obj_present(item).await;

            if kv_missing {
                *missing_counts.entry(StoreTag::Kv).or_insert(0) += 1;
                any_missing = true;
            }
            if vec_missing {
                *missing_counts.entry(StoreTag::Vec).or_insert(0) += 1;
                any_missing = true;
            }
            if obj_missing {
                *missing_counts.entry(StoreTag::Obj).or_insert(0) += 1;
                any_missing = true;
            }

            if dry_run {
                if kv_missing || vec_missing || obj_missing {
                    any_unbackfilled = true;
                }
                continue;
            }

            if kv_missing && self.backfill_kv(item).await {
                backfilled += 1;
                self.metrics.increment("reconcile_backfills_total", &[("store", "kv")]).await;
            } else if kv_missing {
                any_unbackfilled = true;
            }

            if vec_missing && self.backfill_vec(item).await {
                backfilled += 1;
                self.metrics.increment("reconcile_backfills_total", &[("store", "vec")]).await;
            } else if vec_missing {
                any_unbackfilled = true;
            }

            if obj_missing && self.backfill_obj(item).await {
                backfilled += 1;
                self.metrics.increment("reconcile_backfills_total", &[("store", "obj")]).await;
            } else if obj_missing {
                any_unbackfilled = true;
            }
        }

        let consistency = if !any_missing {
            Consistency::Perfect
        } else if !any_unbackfilled {
            Consistency::Restored
        } else {
            Consistency::Degraded
        };

        ReconcileSummary {
            analyzed: items.len(),
            missing_counts,
            backfilled,
            consistency,
        }
    }

    async fn kv_present(&self, id: &str) -> bool {
        matches!(self.kv.get(&format!("log:{id}")).await, Ok(Some(_)))
    }

    async fn obj_present(&self, item: &LogItem) -> bool {
        let key = backfill_record(item).obj_key();
        self.obj.exists(&key).await.unwrap_or(false)
    }

    async fn backfill_kv(&self, item: &LogItem) -> bool {
        let record = backfill_record(item);
        match serde_json::to_vec(&record) {
            Ok(bytes) => self.kv.put(&format!("log:{}", record.id), bytes, self.kv_ttl_seconds).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn backfill_obj(&self, item: &LogItem) -> bool {
        let record = backfill_record(item);
        let key = record.obj_key();
        match serde_json::to_vec(&record) {
            Ok(bytes) => self.obj.put_object(&key, bytes, "application/json").await.is_ok(),
            Err(_) => false,
        }
    }

    async fn backfill_vec(&self, item: &LogItem) -> bool {
        let text = item.payload.to_string();
        let embedding = match self.embedder.embed(&text).await {
            Ok(e) => e,
            Err(_) => return false,
        };
        let metadata = serde_json::json!({
            "timestamp": item.timestamp,
            "kind": item.kind,
            "backfilled": true,
        });
        self.vec.upsert(&item.id, embedding, metadata).await.is_ok()
    }
}

/// Reconstructs a full envelope from a canonicalized read item for
/// backfill purposes, stamping the `backfilled` marker.
fn backfill_record(item: &LogItem) -> LogRecord {
    LogRecord {
        id: item.id.clone(),
        timestamp: item.timestamp,
        operation_id: item.operation_id.clone(),
        kind: item.kind.clone(),
        level: item.level,
        session_id: item.session_id.clone(),
        who: String::new(),
        tags: item.tags.clone(),
        payload: item.payload.clone(),
        stores: item.stores.clone(),
        idempotency_key: None,
        backfilled: true,
        backfilled_at: Some(Utc::now()),
    }
}
