//! Token-bucket rate limiter keyed by client identity, persisted in KV.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::ports::KvStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

pub enum Admission {
    Allow,
    Deny,
}

pub struct RateLimiter {
    enforced: bool,
    rps: f64,
    burst: u32,
}

impl RateLimiter {
    pub fn new(enforced: bool, rps: f64, burst: u32) -> Self {
        Self { enforced, rps, burst }
    }

    fn key_for(identity: &str) -> String {
        format!("rate_limit:{identity}")
    }

    /// Runs the refill/decrement algorithm unconditionally so observed
    /// token counts stay meaningful even when enforcement is disabled
    /// (the canary admission path can toggle enforcement per-request).
    pub async fn admit(&self, kv: &dyn KvStore, metrics: &Metrics, identity: &str) -> Admission {
        let now = Utc::now();
        let key = Self::key_for(identity);

        let mut bucket = match kv.get(&key).await {
            Ok(Some(bytes)) => serde_json::from_slice::<Bucket>(&bytes).unwrap_or(Bucket {
                tokens: self.burst as f64,
                last_refill: now,
            }),
            _ => Bucket {
                tokens: self.burst as f64,
                last_refill: now,
            },
        };

        let elapsed_secs = (now - bucket.last_refill).num_milliseconds() as f64 / 1000.0;
        // rps is expressed relative to a 60-second window. the divide-by-60
        // is load-bearing; dropping it breaks the configured defaults.
        bucket.tokens = (bucket.tokens + elapsed_secs * self.rps / 60.0).min(self.burst as f64);
        bucket.last_refill = now;

        let allow = bucket.tokens > 0.0;
        if allow {
            bucket.tokens -= 1.0;
        }

        if let Ok(bytes) = serde_json::to_vec(&bucket) {
            if let Err(e) = kv.put(&key, bytes, 0).await {
                tracing::warn!("rate limiter state persist failed for {identity}: {e}");
            }
        }

        if allow {
            Admission::Allow
        } else if self.enforced {
            Admission::Deny
        } else {
            metrics
                .increment("rate_limit_exceeded_total", &[("identifier", identity)])
                .await;
            Admission::Allow
        }
    }
}
