//! Embedded key-value adapter backed by `redb`. Backs `log:<id>` copies
//! as well as every internal key prefix (circuit breaker, rate limiter,
//! idempotency, metrics snapshot) — they all share this one table.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use opslog_core::error::{OpsLogError, Result};
use opslog_core::ports::KvStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("opslog_kv");
const EXPIRY_TABLE: TableDefinition<&str, i64> = TableDefinition::new("opslog_kv_expiry");

pub struct RedbKvStore {
    db: Arc<Database>,
}

impl RedbKvStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(TABLE)?;
            write_txn.open_table(EXPIRY_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl KvStore for RedbKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Vec<u8>>> {
            let read_txn = db.begin_read()?;
            let expiry_table = read_txn.open_table(EXPIRY_TABLE)?;
            if let Some(expires_at) = expiry_table.get(key.as_str())? {
                if expires_at.value() > 0 && Utc::now().timestamp() >= expires_at.value() {
                    return Ok(None);
                }
            }
            let table = read_txn.open_table(TABLE)?;
            Ok(table.get(key.as_str())?.map(|v| v.value().to_vec()))
        })
        .await
        .map_err(|e| OpsLogError::Internal(e.into()))?
        .map_err(|e| OpsLogError::Internal(e))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.insert(key.as_str(), value.as_slice())?;

                let mut expiry_table = write_txn.open_table(EXPIRY_TABLE)?;
                let expires_at = if ttl_seconds == 0 { 0 } else { Utc::now().timestamp() + ttl_seconds as i64 };
                expiry_table.insert(key.as_str(), expires_at)?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| OpsLogError::Internal(e.into()))?
        .map_err(OpsLogError::Internal)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.remove(key.as_str())?;
                let mut expiry_table = write_txn.open_table(EXPIRY_TABLE)?;
                expiry_table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| OpsLogError::Internal(e.into()))?
        .map_err(OpsLogError::Internal)
    }
}
