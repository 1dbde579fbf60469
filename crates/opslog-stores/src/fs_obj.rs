//! Local filesystem object store: one file per key under a configured
//! root directory. Keys already carry the `logs/<kind>/<date>/<id>.json`
//! layout; this adapter only maps them onto a path and creates parent
//! directories on demand.

use std::path::PathBuf;

use async_trait::async_trait;

use opslog_core::error::{OpsLogError, Result};
use opslog_core::ports::ObjStore;

pub struct FsObjStore {
    root: PathBuf,
}

impl FsObjStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.contains("..") {
            return Err(OpsLogError::BadRequest(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjStore for FsObjStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OpsLogError::StoreUnavailable { store: "obj", reason: e.to_string() })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| OpsLogError::StoreUnavailable { store: "obj", reason: e.to_string() })
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OpsLogError::StoreUnavailable { store: "obj", reason: e.to_string() }),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}
