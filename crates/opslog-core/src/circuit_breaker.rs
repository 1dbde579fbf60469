//! Per-store circuit breaker. State is persisted in KV under
//! `circuit_breaker:<store>`, read-modify-write, best-effort. A lost
//! update merely delays opening by one sample, which is acceptable
//! because the breaker is advisory, not a correctness mechanism.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::ports::KvStore;
use crate::types::StoreTag;

const WINDOW_SECONDS: i64 = 60;
const COOLDOWN_SECONDS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BreakerState {
    failures: u32,
    window_start: DateTime<Utc>,
    is_open: bool,
    opened_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            failures: 0,
            window_start: now,
            is_open: false,
            opened_at: None,
        }
    }
}

pub struct CheckResult {
    pub open: bool,
    pub should_skip: bool,
}

pub struct CircuitBreaker {
    enabled: bool,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(enabled: bool, threshold: u32) -> Self {
        Self { enabled, threshold }
    }

    fn state_key(store: StoreTag) -> String {
        format!("circuit_breaker:{store}")
    }

    async fn load(&self, kv: &dyn KvStore, store: StoreTag) -> BreakerState {
        match kv.get(&Self::state_key(store)).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|_| BreakerState::fresh(Utc::now())),
            _ => BreakerState::fresh(Utc::now()),
        }
    }

    /// Failure on state persistence degrades to open-circuit-not-enforced
    /// for that request (fail-open) — store() errors are logged, not propagated.
    async fn store(&self, kv: &dyn KvStore, store: StoreTag, state: &BreakerState) {
        match serde_json::to_vec(state) {
            Ok(bytes) => {
                if let Err(e) = kv.put(&Self::state_key(store), bytes, 0).await {
                    tracing::warn!("circuit breaker state persist failed for {store}: {e}");
                }
            }
            Err(e) => tracing::warn!("circuit breaker state serialization failed: {e}"),
        }
    }

    pub async fn check(&self, kv: &dyn KvStore, store: StoreTag) -> CheckResult {
        if !self.enabled {
            return CheckResult { open: false, should_skip: false };
        }

        let now = Utc::now();
        let mut state = self.load(kv, store).await;

        if (now - state.window_start).num_seconds() > WINDOW_SECONDS {
            state.failures = 0;
            state.window_start = now;
        }

        if state.is_open {
            if let Some(opened_at) = state.opened_at {
                if (now - opened_at).num_seconds() > COOLDOWN_SECONDS {
                    state.is_open = false;
                    state.failures = 0;
                    state.opened_at = None;
                }
            }
        }

        let should_skip = state.is_open;
        self.store(kv, store, &state).await;
        CheckResult { open: state.is_open, should_skip }
    }

    pub async fn record_failure(&self, kv: &dyn KvStore, metrics: &Metrics, store: StoreTag) {
        if !self.enabled {
            return;
        }
        let now = Utc::now();
        let mut state = self.load(kv, store).await;

        if (now - state.window_start).num_seconds() > WINDOW_SECONDS {
            state.failures = 0;
            state.window_start = now;
        }

        state.failures += 1;
        if state.failures >= self.threshold && !state.is_open {
            state.is_open = true;
            state.opened_at = Some(now);
            metrics.increment("store_circuit_open_total", &[("store", store.as_str())]).await;
        }

        self.store(kv, store, &state).await;
    }

    /// Leaves the window in place. The cooldown timer is what closes the
    /// breaker, never an immediate success, to avoid flapping.
    pub async fn record_success(&self, _kv: &dyn KvStore, _store: StoreTag) {}
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

    #[tokio::test]
    async fn opens_after_threshold_failures_and_skips_writes() {
        let kv = MemKv(Mutex::new(HashMap::new()));
        let metrics = Metrics::new();
        let breaker = CircuitBreaker::new(true, 3);

        for _ in 0..2 {
            breaker.record_failure(&kv, &metrics, StoreTag::Obj).await;
            let r = breaker.check(&kv, StoreTag::Obj).await;
            assert!(!r.should_skip);
        }
        breaker.record_failure(&kv, &metrics, StoreTag::Obj).await;
        let r = breaker.check(&kv, StoreTag::Obj).await;
        assert!(r.should_skip);
        assert!(r.open);
    }

    #[tokio::test]
    async fn disabled_breaker_never_skips() {
        let kv = MemKv(Mutex::new(HashMap::new()));
        let metrics = Metrics::new();
        let breaker = CircuitBreaker::new(false, 1);
        breaker.record_failure(&kv, &metrics, StoreTag::Kv).await;
        let r = breaker.check(&kv, StoreTag::Kv).await;
        assert!(!r.should_skip);
    }
}
