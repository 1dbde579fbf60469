//! opslog-server — standalone HTTP server for the unified action logging core.
//!
//! Reads config from environment (see `opslog_core::config::Config`):
//!   DATABASE_URL — Postgres connection string (required)
//!   KV_PATH      — redb database file path (required)
//!   OBJ_ROOT     — object-store root directory (required)
//!   BIND_ADDR    — listen address (default: 0.0.0.0:8080)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use opslog_core::circuit_breaker::CircuitBreaker;
use opslog_core::config::Config;
use opslog_core::health::HealthReporter;
use opslog_core::log_reader::LogReader;
use opslog_core::metrics::Metrics;
use opslog_core::op_registry::OpRegistry;
use opslog_core::ports::{EmbeddingProvider, KvStore, ObjStore, RelStore, VecStore};
use opslog_core::rate_limiter::RateLimiter;
use opslog_core::reconciler::Reconciler;
use opslog_core::types::StoreTag;
use opslog_core::write_coordinator::WriteCoordinator;
use opslog_server::reconcile_loop::ReconcileLoop;
use opslog_server::router::build_router;
use opslog_server::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,opslog_server=debug".into()),
        )
        .init();

    let config = Arc::new(Config::from_env());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    sqlx::migrate!("../../migrations").run(&pool).await.expect("failed to run migrations");
    tracing::info!("connected to database and applied migrations");

    let kv: Arc<dyn KvStore> = Arc::new(opslog_stores::RedbKvStore::open(&config.kv_path).expect("failed to open kv store"));
    let rel: Arc<dyn RelStore> = Arc::new(opslog_stores::PgRelStore::new(pool.clone()));
    let vec_store: Arc<dyn VecStore> = Arc::new(opslog_stores::PgVecStore::new(pool.clone()));
    let obj: Arc<dyn ObjStore> = Arc::new(opslog_stores::FsObjStore::new(&config.obj_root));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(opslog_stores::HttpEmbeddingProvider::new(
        std::env::var("EMBEDDING_ENDPOINT").unwrap_or_else(|_| "http://localhost:9100/embed".into()),
    ));

    let ops = Arc::new(OpRegistry::new());
    let metrics = Arc::new(Metrics::new());
    let breaker = Arc::new(CircuitBreaker::new(config.enable_store_breaker, config.breaker_threshold));
    let rate_limiter = Arc::new(RateLimiter::new(config.enable_rate_limit, config.rate_limit_rps, config.rate_limit_burst));

    let writer = Arc::new(WriteCoordinator {
        rel: rel.clone(),
        kv: kv.clone(),
        obj: obj.clone(),
        vec: vec_store.clone(),
        embedder: embedder.clone(),
        ops: ops.clone(),
        breaker: breaker.clone(),
        metrics: metrics.clone(),
        kv_ttl_seconds: config.kv_ttl_seconds,
    });

    let reader = Arc::new(LogReader::new(rel.clone(), metrics.clone()));

    let reconciler = Arc::new(Reconciler {
        rel: rel.clone(),
        kv: kv.clone(),
        obj: obj.clone(),
        vec: vec_store.clone(),
        embedder: embedder.clone(),
        ops: ops.clone(),
        metrics: metrics.clone(),
        kv_ttl_seconds: config.kv_ttl_seconds,
    });

    let stores_bound = StoreTag::ALL.into_iter().map(|s| (s, true)).collect();
    let health = Arc::new(HealthReporter::new(kv.clone(), breaker.clone(), metrics.clone(), ops.clone(), stores_bound));

    let reconcile_interval = Duration::from_secs(config.reconcile_interval_hours * 60 * 60);
    let reconcile_loop = ReconcileLoop::new(reconciler.clone(), reconcile_interval);
    tokio::spawn(async move {
        reconcile_loop.run().await;
    });
    tracing::info!("reconcile loop spawned (interval={:?})", reconcile_interval);

    let state = AppState {
        config: config.clone(),
        kv,
        ops,
        metrics,
        breaker,
        rate_limiter,
        writer,
        reader,
        reconciler,
        health,
    };

    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {}: {e}", config.bind_addr));
    tracing::info!("opslog-server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
