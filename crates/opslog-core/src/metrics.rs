//! In-memory labeled counters with optional periodic snapshot to KV.
//!
//! The counter map is the one process-global this core keeps — every
//! other component is either read-only after init (`OpRegistry`) or
//! backed by external storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::ports::KvStore;

const SNAPSHOT_KEY: &str = "metrics:counters";
const SNAPSHOT_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

pub type Labels = BTreeMap<String, String>;

fn key_for(name: &str, labels: &Labels) -> String {
    let mut s = name.to_string();
    for (k, v) in labels {
        s.push(';');
        s.push_str(k);
        s.push('=');
        s.push_str(v);
    }
    s
}

/// In-memory counter map, independent per environment (constructed
/// fresh by whoever builds the process state — never shared globally
/// across environments).
#[derive(Clone)]
pub struct Metrics {
    counters: Arc<RwLock<BTreeMap<String, u64>>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Never throws; failures (there are none in-process) are swallowed.
    pub async fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_by(name, labels, 1).await;
    }

    pub async fn increment_by(&self, name: &str, labels: &[(&str, &str)], delta: u64) {
        let labels: Labels = labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let key = key_for(name, &labels);
        let mut guard = self.counters.write().await;
        *guard.entry(key).or_insert(0) += delta;
    }

    /// Snapshot the in-memory map, label-preserving.
    pub async fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.read().await.clone()
    }

    /// Fire-and-forget persistence of the current snapshot to KV. Errors
    /// never propagate, they are logged and dropped.
    pub async fn persist(&self, kv: &dyn KvStore) {
        let snapshot = self.snapshot().await;
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(e) = kv.put(SNAPSHOT_KEY, bytes, SNAPSHOT_TTL_SECONDS).await {
                    tracing::warn!("metrics persist failed: {e}");
                }
            }
            Err(e) => tracing::warn!("metrics snapshot serialization failed: {e}"),
        }
    }

    /// Load persisted counters (if any) and merge with the in-memory map,
    /// label-preserving, in-memory values winning ties.
    pub async fn snapshot_merged(&self, kv: &dyn KvStore) -> BTreeMap<String, u64> {
        let mut merged = match kv.get(SNAPSHOT_KEY).await {
            Ok(Some(bytes)) => serde_json::from_slice::<BTreeMap<String, u64>>(&bytes).unwrap_or_default(),
            _ => BTreeMap::new(),
        };
        for (k, v) in self.snapshot().await {
            merged.insert(k, v);
        }
        merged
    }
}
