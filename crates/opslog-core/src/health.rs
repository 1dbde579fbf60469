//! Health and readiness surfaces. Both always report success at
//! the HTTP layer; it is the payload's `ready`/content that callers act on.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::metrics::Metrics;
use crate::op_registry::OpRegistry;
use crate::ports::KvStore;
use crate::types::StoreTag;

const ERROR_RATE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub stores_bound: BTreeMap<StoreTag, bool>,
    pub canonical_op_count: usize,
    pub breaker_open: BTreeMap<StoreTag, bool>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub stores_bound: BTreeMap<StoreTag, bool>,
    pub breaker_open: BTreeMap<StoreTag, bool>,
    pub recent_error_count: u64,
    pub recent_success_count: u64,
}

/// `stores_bound` reflects which adapters were actually wired at boot —
/// an environment can legitimately run with, say, the vector store
/// disabled, and readiness should not lie about that.
pub struct HealthReporter {
    kv: Arc<dyn KvStore>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<Metrics>,
    ops: Arc<OpRegistry>,
    stores_bound: BTreeMap<StoreTag, bool>,
}

impl HealthReporter {
    pub fn new(
        kv: Arc<dyn KvStore>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<Metrics>,
        ops: Arc<OpRegistry>,
        stores_bound: BTreeMap<StoreTag, bool>,
    ) -> Self {
        Self { kv, breaker, metrics, ops, stores_bound }
    }

    async fn breaker_open_states(&self) -> BTreeMap<StoreTag, bool> {
        let mut states = BTreeMap::new();
        for store in StoreTag::ALL {
            let check = self.breaker.check(self.kv.as_ref(), store).await;
            states.insert(store, check.open);
        }
        states
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            stores_bound: self.stores_bound.clone(),
            canonical_op_count: self.ops.all_canonical().len(),
            breaker_open: self.breaker_open_states().await,
        }
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let breaker_open = self.breaker_open_states().await;
        let any_breaker_open = breaker_open.values().any(|open| *open);
        let all_stores_bound = self.stores_bound.values().all(|bound| *bound);

        let snapshot = self.metrics.snapshot().await;
        let mut success_count = 0u64;
        let mut error_count = 0u64;
        for (key, value) in &snapshot {
            if key.starts_with("action_success_total") {
                success_count += value;
            } else if key.starts_with("action_error_total") {
                error_count += value;
            }
        }

        let total = success_count + error_count;
        let error_rate = if total == 0 { 0.0 } else { error_count as f64 / total as f64 };

        let ready = !any_breaker_open && all_stores_bound && error_rate < ERROR_RATE_THRESHOLD;

        ReadinessReport {
            ready,
            stores_bound: self.stores_bound.clone(),
            breaker_open,
            recent_error_count: error_count,
            recent_success_count: success_count,
        }
    }
}
