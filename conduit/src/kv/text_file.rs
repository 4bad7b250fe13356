use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::conduit_error;
use crate::error::{ConduitResult, ErrorKind};
use crate::kv::KvStore;
use crate::kv::base::{not_enabled, write_not_supported};

/// A read-only store backed by a newline-delimited list of keys.
///
/// A lookup returns `true` when the key is one of the lines of the file and
/// `false` otherwise.
#[derive(Debug)]
pub struct TextFileKvStore {
    file: PathBuf,
    lines: RwLock<Option<HashSet<String>>>,
}

impl TextFileKvStore {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            lines: RwLock::new(None),
        }
    }
}

#[async_trait]
impl KvStore for TextFileKvStore {
    async fn setup(&self) -> ConduitResult<()> {
        let mut lines = self.lines.write().await;
        if lines.is_some() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.file).await.map_err(|err| {
            conduit_error!(
                ErrorKind::KvStoreError,
                "Failed to read the kv store file",
                format!("{}: {err}", self.file.display())
            )
        })?;

        let loaded: HashSet<String> = contents.lines().map(str::to_owned).collect();
        info!(file = %self.file.display(), lines = loaded.len(), "loaded text kv store");
        *lines = Some(loaded);

        Ok(())
    }

    async fn is_enabled(&self) -> bool {
        self.lines.read().await.is_some()
    }

    async fn get(&self, key: &str) -> ConduitResult<Option<Value>> {
        match self.lines.read().await.as_ref() {
            Some(lines) => Ok(Some(Value::Bool(lines.contains(key)))),
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
        *self.lines.write().await = None;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_membership_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blocklist.txt");
        std::fs::write(&file, "10.0.0.1\n10.0.0.2\n").unwrap();

        let store = TextFileKvStore::new(&file);
        store.setup().await.unwrap();

        assert_eq!(store.get("10.0.0.2").await.unwrap(), Some(json!(true)));
        assert_eq!(store.get("10.0.0.3").await.unwrap(), Some(json!(false)));
        assert_eq!(
            store.set("x", json!(1)).await.unwrap_err().kind(),
            ErrorKind::KvStoreOperationNotSupported
        );

        store.close().await.unwrap();
        assert_eq!(
            store.get("10.0.0.2").await.unwrap_err().kind(),
            ErrorKind::KvStoreNotEnabled
        );
    }

    #[tokio::test]
    async fn test_missing_file_fails_setup() {
        let store = TextFileKvStore::new("/nonexistent/conduit/keys.txt");

        assert_eq!(
            store.setup().await.unwrap_err().kind(),
            ErrorKind::KvStoreError
        );
    }
}
