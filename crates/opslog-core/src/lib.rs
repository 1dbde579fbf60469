pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod log_reader;
pub mod metrics;
pub mod op_registry;
pub mod ports;
pub mod rate_limiter;
pub mod reconciler;
pub mod types;
pub mod write_coordinator;

pub use circuit_breaker::CircuitBreaker;
pub use config::Config;
pub use error::{OpsLogError, Result};
pub use health::HealthReporter;
pub use log_reader::LogReader;
pub use metrics::Metrics;
pub use op_registry::OpRegistry;
pub use rate_limiter::RateLimiter;
pub use reconciler::Reconciler;
pub use write_coordinator::WriteCoordinator;
