//! HTTP-level integration tests for the action-logging server contract:
//! write/read/health/ready endpoints and the admission middleware chain,
//! built against in-memory store fakes so no live Postgres is required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use tower::ServiceExt;

use opslog_core::circuit_breaker::CircuitBreaker;
use opslog_core::config::Config;
use opslog_core::health::HealthReporter;
use opslog_core::log_reader::LogReader;
use opslog_core::metrics::Metrics;
use opslog_core::op_registry::OpRegistry;
use opslog_core::ports::{EmbeddingProvider, KvStore, ObjStore, RelStore, VecStore};
use opslog_core::rate_limiter::RateLimiter;
use opslog_core::reconciler::Reconciler;
use opslog_core::types::{LogItem, LogRecord, StoreTag};
use opslog_core::write_coordinator::WriteCoordinator;
use opslog_server::router::build_router;
use opslog_server::state::AppState;

struct MemKv(Mutex<HashMap<String, Vec<u8>>>);

#[async_trait]
impl KvStore for MemKv {
    async fn get(&self, key: &str) -> opslog_core::error::Result<Option<Vec<u8>>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }
    async fn put(&self, key: &str, value: Vec<u8>, _ttl_seconds: u64) -> opslog_core::error::Result<()> {
        self.0.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
    async fn delete(&self, key: &str) -> opslog_core::error::Result<()> {
        self.0.lock().unwrap().remove(key);
        Ok(())
    }
}

struct MemRel(Mutex<Vec<LogRecord>>);

#[async_trait]
impl RelStore for MemRel {
    async fn write(&self, record: &LogRecord) -> opslog_core::error::Result<()> {
        self.0.lock().unwrap().push(record.clone());
        Ok(())
    }
    async fn recent(&self, limit: i64) -> opslog_core::error::Result<Vec<LogItem>> {
        let guard = self.0.lock().unwrap();
        Ok(guard.iter().rev().take(limit as usize).cloned().map(LogItem::from).collect())
    }
    async fn by_session(&self, session_id: &str, limit: i64) -> opslog_core::error::Result<Vec<LogItem>> {
        let guard = self.0.lock().unwrap();
        Ok(guard
            .iter()
            .rev()
            .filter(|r| r.session_id == session_id)
            .take(limit as usize)
            .cloned()
            .map(LogItem::from)
            .collect())
    }
    async fn recent_in_window(
        &self,
        _since: chrono::DateTime<chrono::Utc>,
        _until: chrono::DateTime<chrono::Utc>,
    ) -> opslog_core::error::Result<Vec<LogItem>> {
        Ok(self.0.lock().unwrap().iter().cloned().map(LogItem::from).collect())
    }
}

struct NoopObj;
#[async_trait]
impl ObjStore for NoopObj {
    async fn put_object(&self, _key: &str, _bytes: Vec<u8>, _content_type: &str) -> opslog_core::error::Result<()> {
        Ok(())
    }
    async fn get_object(&self, _key: &str) -> opslog_core::error::Result<Option<Vec<u8>>> {
        Ok(None)
    }
    async fn exists(&self, _key: &str) -> opslog_core::error::Result<bool> {
        Ok(false)
    }
}

struct NoopVec;
#[async_trait]
impl VecStore for NoopVec {
    async fn upsert(&self, _id: &str, _embedding: Vec<f32>, _metadata: serde_json::Value) -> opslog_core::error::Result<()> {
        Ok(())
    }
    async fn exists(&self, _id: &str) -> opslog_core::error::Result<bool> {
        Ok(false)
    }
}

struct NoopEmbedder;
#[async_trait]
impl EmbeddingProvider for NoopEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.0, 0.0])
    }
}

fn test_config() -> Config {
    Config {
        enable_rate_limit: false,
        rate_limit_rps: 10.0,
        rate_limit_burst: 2,
        enable_req_size_cap: false,
        req_size_bytes: 2_000_000,
        enable_store_breaker: true,
        breaker_threshold: 5,
        enable_canary: false,
        canary_percent: 5,
        disable_new_mw: false,
        enable_security_headers: true,
        enable_hsts: false,
        cors_allow_origins: Vec::new(),
        kv_ttl_seconds: 0,
        gpt_compat_mode: true,
        bind_addr: "0.0.0.0:0".into(),
        database_url: "postgres://unused".into(),
        kv_path: "unused".into(),
        obj_root: "unused".into(),
        reconcile_interval_hours: 1,
    }
}

fn build_test_state(config: Config) -> AppState {
    let kv: Arc<dyn KvStore> = Arc::new(MemKv(Mutex::new(HashMap::new())));
    let rel: Arc<dyn RelStore> = Arc::new(MemRel(Mutex::new(Vec::new())));
    let obj: Arc<dyn ObjStore> = Arc::new(NoopObj);
    let vec_store: Arc<dyn VecStore> = Arc::new(NoopVec);
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(NoopEmbedder);

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

    AppState {
        config: Arc::new(config),
        kv,
        ops,
        metrics,
        breaker,
        rate_limiter,
        writer,
        reader,
        reconciler,
        health,
    }
}

#[tokio::test]
async fn write_then_read_recent_round_trips() {
    let app = build_router(build_test_state(test_config()));

    let write_req = Request::builder()
        .method("POST")
        .uri("/v1/actions")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "operationId": "trustCheckIn",
                "who": "user-1",
                "payload": {"note": "hi"}
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.clone().oneshot(write_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["success"], true);

    let read_req = Request::builder().uri("/v1/actions/recent").body(Body::empty()).unwrap();
    let response = app.oneshot(read_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn security_headers_present_on_response() {
    let app = build_router(build_test_state(test_config()));
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    assert_eq!(response.headers().get("x-content-type-options").unwrap(), "nosniff");
}

#[tokio::test]
async fn rate_limit_returns_429_once_burst_is_exhausted() {
    let mut config = test_config();
    config.enable_rate_limit = true;
    config.rate_limit_burst = 1;
    let app = build_router(build_test_state(config));

    let make_req = || Request::builder().uri("/v1/actions/recent").body(Body::empty()).unwrap();

    let first = app.clone().oneshot(make_req()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(make_req()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn readiness_reports_ready_with_no_errors() {
    let app = build_router(build_test_state(test_config()));
    let req = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["ready"], true);
}
