//! Shared process state, constructed once at boot and injected into the
//! router via `Extension` (mirrors `CoreService` wiring in the sibling
//! JWT-authenticated server this one is patterned on).

use std::sync::Arc;

use opslog_core::circuit_breaker::CircuitBreaker;
use opslog_core::config::Config;
use opslog_core::health::HealthReporter;
use opslog_core::log_reader::LogReader;
use opslog_core::metrics::Metrics;
use opslog_core::op_registry::OpRegistry;
use opslog_core::ports::KvStore;
use opslog_core::rate_limiter::RateLimiter;
use opslog_core::reconciler::Reconciler;
use opslog_core::write_coordinator::WriteCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Arc<dyn KvStore>,
    pub ops: Arc<OpRegistry>,
    pub metrics: Arc<Metrics>,
    pub breaker: Arc<CircuitBreaker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub writer: Arc<WriteCoordinator>,
    pub reader: Arc<LogReader>,
    pub reconciler: Arc<Reconciler>,
    pub health: Arc<HealthReporter>,
}
