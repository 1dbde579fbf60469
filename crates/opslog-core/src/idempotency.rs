//! Idempotency key lookup and recording. Keyed entries live in KV
//! under `idempotency:<key>` with a >= 24h retention window; a hit short
//! circuits the write coordinator before any store is touched.

use chrono::Utc;

use crate::error::Result;
use crate::ports::KvStore;
use crate::types::{IdempotencyRecord, WriteResult};

const RETENTION_SECONDS: u64 = 24 * 60 * 60;

fn key_for(idempotency_key: &str) -> String {
    format!("idempotency:{idempotency_key}")
}

pub struct IdempotencyStore;

impl IdempotencyStore {
    pub async fn lookup(kv: &dyn KvStore, idempotency_key: &str) -> Result<Option<WriteResult>> {
        match kv.get(&key_for(idempotency_key)).await? {
            Some(bytes) => {
                let record: IdempotencyRecord = serde_json::from_slice(&bytes)
                    .map_err(|e| crate::error::OpsLogError::Internal(e.into()))?;
                Ok(Some(record.result_summary))
            }
            None => Ok(None),
        }
    }

    /// Records the result of a fresh (non-idempotent-hit) write. Failure
    /// to persist is logged and swallowed — a missed idempotency record
    /// only risks a duplicate write on retry, never data loss.
    pub async fn record(kv: &dyn KvStore, idempotency_key: &str, operation_id: &str, result: &WriteResult) {
        let record = IdempotencyRecord {
            key: idempotency_key.to_string(),
            operation_id: operation_id.to_string(),
            created_at: Utc::now(),
            result_summary: result.clone(),
        };
        match serde_json::to_vec(&record) {
            Ok(bytes) => {
                if let Err(e) = kv.put(&key_for(idempotency_key), bytes, RETENTION_SECONDS).await {
                    tracing::warn!("idempotency record persist failed for key {idempotency_key}: {e}");
                }
            }
            Err(e) => tracing::warn!("idempotency record serialization failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::KvStore;
    use crate::types::{StoreOutcome, StoreTag, WriteStatus};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use std::sync::Mutex;

    struct MemKv(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl KvStore for MemKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
        async fn put(&self, key: &str, value: Vec<u8>, _ttl_seconds: u64) -> Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn sample_result() -> WriteResult {
        WriteResult {
            id: "abc".into(),
            operation_id: "trustCheckIn".into(),
            session_id: "s1".into(),
            stores: StoreTag::ALL.into_iter().collect::<BTreeSet<_>>(),
            idempotent_hit: false,
            status_per_store: BTreeMap::from([(StoreTag::Rel, StoreOutcome::Ok)]),
            status: WriteStatus::Ok,
        }
    }

    #[tokio::test]
    async fn miss_then_hit_after_record() {
        let kv = MemKv(Mutex::new(HashMap::new()));
        assert!(IdempotencyStore::lookup(&kv, "key-1").await.unwrap().is_none());

        let result = sample_result();
        IdempotencyStore::record(&kv, "key-1", "trustCheckIn", &result).await;

        let hit = IdempotencyStore::lookup(&kv, "key-1").await.unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().id, "abc");
    }
}
