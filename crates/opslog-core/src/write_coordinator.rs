//! Fan-out write path — the central algorithm of this core.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::idempotency::IdempotencyStore;
use crate::metrics::Metrics;
use crate::op_registry::OpRegistry;
use crate::ports::{EmbeddingProvider, KvStore, ObjStore, RelStore, VecStore};
use crate::types::{LogRecord, R2Policy, StoreOutcome, StoreTag, WriteResult, WriteStatus};

const STORE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the write path needs, independent of transport. Stores are
/// trait objects so this crate never names a concrete storage engine.
pub struct WriteCoordinator {
    pub rel: Arc<dyn RelStore>,
    pub kv: Arc<dyn KvStore>,
    pub obj: Arc<dyn ObjStore>,
    pub vec: Arc<dyn VecStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub ops: Arc<OpRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub metrics: Arc<Metrics>,
    pub kv_ttl_seconds: u64,
}

/// Incoming write request, pre-validation.
pub struct WriteRequest {
    pub operation_id: String,
    pub session_id: Option<String>,
    pub who: String,
    pub tags: BTreeSet<String>,
    pub payload: serde_json::Value,
    pub is_error: bool,
    pub idempotency_key: Option<String>,
}

impl WriteCoordinator {
    /// Runs the full algorithm: canonicalize, idempotency short-circuit,
    /// concurrent fan-out, per-store bookkeeping, status rollup.
    pub async fn write(&self, request: WriteRequest) -> crate::error::Result<WriteResult> {
        let operation_id = self.ops.to_canonical(&request.operation_id);
        let session_id = request.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(key) = &request.idempotency_key {
            if let Some(prior) = IdempotencyStore::lookup(self.kv.as_ref(), key).await? {
                self.metrics
                    .increment("idempotency_hits_total", &[("operationId", &operation_id)])
                    .await;
                let mut hit = prior;
                hit.idempotent_hit = true;
                return Ok(hit);
            }
        }

        let r2_policy = self.ops.r2_policy(&operation_id);

        let record = LogRecord::new(
            operation_id.clone(),
            session_id.clone(),
            request.who,
            request.tags,
            request.payload,
            request.is_error,
            request.idempotency_key.clone(),
        );

        let status_per_store = self.fan_out(&record, r2_policy).await;

        let mut stores = BTreeSet::new();
        let mut rel_ok = false;
        for (store, outcome) in &status_per_store {
            if *outcome == StoreOutcome::Ok {
                stores.insert(*store);
                if *store == StoreTag::Rel {
                    rel_ok = true;
                }
            }
        }

        let obj_degraded = r2_policy == R2Policy::Required
            && status_per_store.get(&StoreTag::Obj) != Some(&StoreOutcome::Ok);

        let status = if !rel_ok {
            WriteStatus::Error
        } else if obj_degraded {
            WriteStatus::Degraded
        } else {
            WriteStatus::Ok
        };

        if status == WriteStatus::Error {
            self.metrics
                .increment("action_error_total", &[("operationId", &operation_id)])
                .await;
            return Err(crate::error::OpsLogError::RelDurabilityFailure(format!(
                "rel store write failed for operation {operation_id} (record {})",
                record.id
            )));
        }

        self.metrics
            .increment("action_success_total", &[("operationId", &operation_id)])
            .await;

        let result = WriteResult {
            id: record.id,
            operation_id,
            session_id,
            stores,
            idempotent_hit: false,
            status_per_store,
            status,
        };

        if let Some(key) = &request.idempotency_key {
            IdempotencyStore::record(self.kv.as_ref(), key, &result.operation_id, &result).await;
        }

        Ok(result)
    }

    async fn fan_out(&self, record: &LogRecord, r2_policy: R2Policy) -> BTreeMap<StoreTag, StoreOutcome> {
        let (rel, kv, obj, vec) = tokio::join!(
            self.write_rel(record),
            self.write_kv(record),
            self.write_obj(record, r2_policy),
            self.write_vec(record),
        );

        let mut outcomes = BTreeMap::new();
        outcomes.insert(StoreTag::Rel, rel);
        outcomes.insert(StoreTag::Kv, kv);
        outcomes.insert(StoreTag::Obj, obj);
        outcomes.insert(StoreTag::Vec, vec);

        for (store, outcome) in &outcomes {
            match outcome {
                StoreOutcome::Error => {
                    self.breaker.record_failure(self.kv.as_ref(), &self.metrics, *store).await;
                    self.metrics
                        .increment("missing_store_write_total", &[("store", store.as_str())])
                        .await;
                }
                StoreOutcome::Ok => {
                    self.metrics
                        .increment("log_written_total", &[("store", store.as_str())])
                        .await;
                }
                _ => {}
            }
        }

        outcomes
    }

    async fn write_rel(&self, record: &LogRecord) -> StoreOutcome {
        let check = self.breaker.check(self.kv.as_ref(), StoreTag::Rel).await;
        if check.should_skip {
            return StoreOutcome::SkippedBreaker;
        }
        match tokio::time::timeout(STORE_WRITE_TIMEOUT, self.rel.write(record)).await {
            Ok(Ok(())) => StoreOutcome::Ok,
            Ok(Err(e)) => {
                tracing::warn!("rel write failed for {}: {e}", record.id);
                StoreOutcome::Error
            }
            Err(_) => {
                tracing::warn!("rel write timed out for {}", record.id);
                StoreOutcome::Error
            }
        }
    }

    async fn write_kv(&self, record: &LogRecord) -> StoreOutcome {
        let check = self.breaker.check(self.kv.as_ref(), StoreTag::Kv).await;
        if check.should_skip {
            return StoreOutcome::SkippedBreaker;
        }
        let bytes = match serde_json::to_vec(record) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("kv envelope serialization failed for {}: {e}", record.id);
                return StoreOutcome::Error;
            }
        };
        let key = format!("log:{}", record.id);
        match tokio::time::timeout(STORE_WRITE_TIMEOUT, self.kv.put(&key, bytes, self.kv_ttl_seconds)).await {
            Ok(Ok(())) => StoreOutcome::Ok,
            Ok(Err(e)) => {
                tracing::warn!("kv write failed for {}: {e}", record.id);
                StoreOutcome::Error
            }
            Err(_) => StoreOutcome::Error,
        }
    }

    async fn write_obj(&self, record: &LogRecord, r2_policy: R2Policy) -> StoreOutcome {
        if r2_policy == R2Policy::None {
            return StoreOutcome::Disabled;
        }
        let check = self.breaker.check(self.kv.as_ref(), StoreTag::Obj).await;
        if check.should_skip {
            return StoreOutcome::SkippedBreaker;
        }
        let bytes = match serde_json::to_vec(record) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("obj envelope serialization failed for {}: {e}", record.id);
                return StoreOutcome::Error;
            }
        };
        let key = record.obj_key();
        match tokio::time::timeout(STORE_WRITE_TIMEOUT, self.obj.put_object(&key, bytes, "application/json")).await
        {
            Ok(Ok(())) => StoreOutcome::Ok,
            Ok(Err(e)) => {
                tracing::warn!("obj write failed for {}: {e}", record.id);
                StoreOutcome::Error
            }
            Err(_) => StoreOutcome::Error,
        }
    }

    async fn write_vec(&self, record: &LogRecord) -> StoreOutcome {
        let check = self.breaker.check(self.kv.as_ref(), StoreTag::Vec).await;
        if check.should_skip {
            return StoreOutcome::SkippedBreaker;
        }
        let text = record.payload.to_string();
        let embedding = match tokio::time::timeout(STORE_WRITE_TIMEOUT, self.embedder.embed(&text)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                tracing::warn!("embedding failed for {}: {e}", record.id);
                return StoreOutcome::Error;
            }
            Err(_) => return StoreOutcome::Error,
        };
        let metadata = serde_json::json!({
            "timestamp": record.timestamp,
            "kind": record.kind,
            "backfilled": record.backfilled,
        });
        match tokio::time::timeout(STORE_WRITE_TIMEOUT, self.vec.upsert(&record.id, embedding, metadata)).await {
            Ok(Ok(())) => StoreOutcome::Ok,
            Ok(Err(e)) => {
                tracing::warn!("vec write failed for {}: {e}", record.id);
                StoreOutcome::Error
            }
            Err(_) => StoreOutcome::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::KvStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemKv(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl KvStore for MemKv {
        async fn get(&self, key: &str) -> crate::error::Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn put(&self, key: &str, value: Vec<u8>, _ttl_seconds: u64) -> crate::error::Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> crate::error::Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    struct OkRel;
    #[async_trait]
    impl RelStore for OkRel {
        async fn write(&self, _record: &LogRecord) -> crate::error::Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: i64) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
        async fn by_session(&self, _session_id: &str, _limit: i64) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
        async fn recent_in_window(
            &self,
            _since: chrono::DateTime<chrono::Utc>,
            _until: chrono::DateTime<chrono::Utc>,
        ) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
    }

    struct FailingRel;
    #[async_trait]
    impl RelStore for FailingRel {
        async fn write(&self, _record: &LogRecord) -> crate::error::Result<()> {
            Err(crate::error::OpsLogError::RelDurabilityFailure("boom".into()))
        }
        async fn recent(&self, _limit: i64) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
        async fn by_session(&self, _session_id: &str, _limit: i64) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
        async fn recent_in_window(
            &self,
            _since: chrono::DateTime<chrono::Utc>,
            _until: chrono::DateTime<chrono::Utc>,
        ) -> crate::error::Result<Vec<crate::types::LogItem>> {
            Ok(vec![])
        }
    }

    struct OkObj;
    #[async_trait]
    impl ObjStore for OkObj {
        async fn put_object(&self, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> crate::error::Result<()> {
            Ok(())
        }
        async fn get_object(&self, _key: &str) -> crate::error::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn exists(&self, _key: &str) -> crate::error::Result<bool> {
            Ok(false)
        }
    }

    struct OkVec;
    #[async_trait]
    impl VecStore for OkVec {
        async fn upsert(&self, _id: &str, _embedding: Vec<f32>, _metadata: serde_json::Value) -> crate::error::Result<()> {
            Ok(())
        }
        async fn exists(&self, _id: &str) -> crate::error::Result<bool> {
            Ok(false)
        }
    }

    struct OkEmbedder;
    #[async_trait]
    impl EmbeddingProvider for OkEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn request() -> WriteRequest {
        WriteRequest {
            operation_id: "trustCheckIn".into(),
            session_id: None,
            who: "user".into(),
            tags: BTreeSet::new(),
            payload: serde_json::json!({"note": "hi"}),
            is_error: false,
            idempotency_key: None,
        }
    }

    fn coordinator(rel: Arc<dyn RelStore>) -> WriteCoordinator {
        WriteCoordinator {
            rel,
            kv: Arc::new(MemKv(Mutex::new(HashMap::new()))),
            obj: Arc::new(OkObj),
            vec: Arc::new(OkVec),
            embedder: Arc::new(OkEmbedder),
            ops: Arc::new(OpRegistry::new()),
            breaker: Arc::new(CircuitBreaker::new(true, 5)),
            metrics: Arc::new(Metrics::new()),
            kv_ttl_seconds: 0,
        }
    }

    #[tokio::test]
    async fn successful_write_reports_ok_and_all_stores() {
        let c = coordinator(Arc::new(OkRel));
        let result = c.write(request()).await.unwrap();
        assert_eq!(result.status, WriteStatus::Ok);
        assert!(result.stores.contains(&StoreTag::Rel));
        assert!(!result.idempotent_hit);
    }

    #[tokio::test]
    async fn rel_failure_surfaces_as_rel_durability_error() {
        let c = coordinator(Arc::new(FailingRel));
        let err = c.write(request()).await.unwrap_err();
        assert!(matches!(err, crate::error::OpsLogError::RelDurabilityFailure(_)));
    }

    #[tokio::test]
    async fn rel_failure_does_not_record_idempotency() {
        let c = coordinator(Arc::new(FailingRel));
        let mut req = request();
        req.idempotency_key = Some("key-failing".into());
        assert!(c.write(req).await.is_err());

        let prior = IdempotencyStore::lookup(c.kv.as_ref(), "key-failing").await.unwrap();
        assert!(prior.is_none());
    }

    #[tokio::test]
    async fn idempotency_key_short_circuits_second_write() {
        let c = coordinator(Arc::new(OkRel));
        let mut req = request();
        req.idempotency_key = Some("key-abc".into());
        let first = c.write(req).await.unwrap();
        assert!(!first.idempotent_hit);

        let mut req2 = request();
        req2.idempotency_key = Some("key-abc".into());
        let second = c.write(req2).await.unwrap();
        assert!(second.idempotent_hit);
        assert_eq!(second.id, first.id);
    }
}
