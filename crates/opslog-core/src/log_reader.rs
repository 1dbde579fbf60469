//! Read-path operations over the relational store. Errors never
//! reach the caller: a store failure degrades to an empty list, the
//! failure itself surfacing only through metrics.

use std::sync::Arc;

use crate::metrics::Metrics;
use crate::ports::RelStore;
use crate::types::LogItem;

pub struct LogReader {
    rel: Arc<dyn RelStore>,
    metrics: Arc<Metrics>,
}

impl LogReader {
    pub fn new(rel: Arc<dyn RelStore>, metrics: Arc<Metrics>) -> Self {
        Self { rel, metrics }
    }

    pub async fn recent(&self, limit: i64) -> Vec<LogItem> {
        match self.rel.recent(limit).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("recent() read failed: {e}");
                self.metrics.increment("read_error_total", &[("op", "recent")]).await;
                Vec::new()
            }
        }
    }

    pub async fn by_session(&self, session_id: &str, limit: i64) -> Vec<LogItem> {
        match self.rel.by_session(session_id, limit).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("by_session() read failed for {session_id}: {e}");
                self.metrics.increment("read_error_total", &[("op", "by_session")]).await;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpsLogError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    struct FlakyRel;

    #[async_trait]
    impl RelStore for FlakyRel {
        async fn write(&self, _record: &crate::types::LogRecord) -> crate::error::Result<()> {
            Ok(())
        }
        async fn recent(&self, _limit: i64) -> crate::error::Result<Vec<LogItem>> {
            Err(OpsLogError::StoreUnavailable { store: "rel", reason: "down".into() })
        }
        async fn by_session(&self, _session_id: &str, _limit: i64) -> crate::error::Result<Vec<LogItem>> {
            Err(OpsLogError::StoreUnavailable { store: "rel", reason: "down".into() })
        }
        async fn recent_in_window(&self, _since: DateTime<Utc>, _until: DateTime<Utc>) -> crate::error::Result<Vec<LogItem>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn store_error_degrades_to_empty_list() {
        let reader = LogReader::new(Arc::new(FlakyRel), Arc::new(Metrics::new()));
        assert!(reader.recent(10).await.is_empty());
        assert!(reader.by_session("s1", 10).await.is_empty());
    }
}
