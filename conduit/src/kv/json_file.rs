use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{ConduitResult, ErrorKind};
use crate::kv::KvStore;
use crate::kv::base::{not_enabled, write_not_supported};
use crate::message::value_at;
use crate::{bail, conduit_error};

/// A read-only store backed by a JSON document.
///
/// Keys are dotted paths into the document, so `users.alice.role` reads the
/// `role` field of the `alice` object.
#[derive(Debug)]
pub struct JsonFileKvStore {
    file: PathBuf,
    document: RwLock<Option<Value>>,
}

impl JsonFileKvStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            document: RwLock::new(None),
        }
    }
}

#[async_trait]
impl KvStore for JsonFileKvStore {
    async fn setup(&self) -> ConduitResult<()> {
        let mut document = self.document.write().await;
        if document.is_some() {
            return Ok(());
        }

        let contents = tokio::fs::read(&self.file).await.map_err(|err| {
            conduit_error!(
                ErrorKind::KvStoreError,
                "Failed to read the kv store file",
                format!("{}: {err}", self.file.display())
            )
        })?;

        let loaded = match serde_json::from_slice::<Value>(&contents) {
            Ok(loaded) => loaded,
            Err(err) => bail!(
                ErrorKind::KvStoreError,
                "The kv store file is not valid JSON",
                format!("{}: {err}", self.file.display())
            ),
        };

        info!(file = %self.file.display(), "loaded json kv store");
        *document = Some(loaded);

        Ok(())
    }

    async fn is_enabled(&self) -> bool {
        self.document.read().await.is_some()
    }

    async fn get(&self, key: &str) -> ConduitResult<Option<Value>> {
        match self.document.read().await.as_ref() {
            Some(document) => Ok(value_at(document, key).cloned()),
            None => not_enabled(),
        }
    }

    async fn set(&self, _key: &str, _value: Value) -> ConduitResult<()> {
        write_not_supported()
    }

    async fn set_with_ttl(&self, _key: &str, _value: Value, _ttl: i64) -> ConduitResult<()> {
        write_not_supported()
    }

    async fn set_add_with_ttl(&self, _key: &str, _value: Value, _ttl: i64) -> ConduitResult<()> {
        write_not_supported()
    }

    async fn close(&self) -> ConduitResult<()> {
        *self.document.write().await = None;

        Ok(())
    }
}
