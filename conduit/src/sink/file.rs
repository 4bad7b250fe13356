use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::{OpenOptions, create_dir_all};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::conduit_error;
use crate::error::{ConduitError, ConduitResult, ErrorKind};
use crate::sink::Sink;

/// File stem used for batches buffered under the empty key.
const DEFAULT_FILE_STEM: &str = "default";

/// A sink appending newline-delimited payloads to one file per batch key.
///
/// Batch keys are sanitized into file names: every character other than ASCII
/// letters, digits, `-` and `_` becomes `_`.
#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
    file_extension: String,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>, file_extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_extension: file_extension.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the file the batches of `batch_key` are appended to.
    pub fn path_for(&self, batch_key: &str) -> PathBuf {
        let stem: String = if batch_key.is_empty() {
            DEFAULT_FILE_STEM.to_owned()
        } else {
            batch_key
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect()
        };

        if self.file_extension.is_empty() {
            self.directory.join(stem)
        } else {
            self.directory
                .join(format!("{stem}.{}", self.file_extension))
        }
    }
}

/// Maps an I/O failure on `path` to a destination error.
fn destination_error<'a>(
    description: &'static str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> ConduitError + 'a {
    move |err| {
        conduit_error!(
            ErrorKind::DestinationIoError,
            description,
            format!("{}: {err}", path.display())
        )
    }
}

impl Sink for FileSink {
    async fn send(&self, batch_key: &str, items: Vec<Bytes>) -> ConduitResult<()> {
        create_dir_all(&self.directory).await.map_err(destination_error(
            "Failed to create the output directory",
            &self.directory,
        ))?;

        let path = self.path_for(batch_key);
        let mut contents = Vec::with_capacity(items.iter().map(|item| item.len() + 1).sum());
        for item in &items {
            contents.extend_from_slice(item);
            contents.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(destination_error("Failed to open the output file", &path))?;

        file.write_all(&contents)
            .await
            .map_err(destination_error("Failed to write to the output file", &path))?;
        file.flush()
            .await
            .map_err(destination_error("Failed to flush the output file", &path))?;

        debug!(path = %path.display(), count = items.len(), "appended batch to file");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keys_are_sanitized() {
        let sink = FileSink::new("/tmp/out", "jsonl");

        assert_eq!(sink.path_for(""), PathBuf::from("/tmp/out/default.jsonl"));
        assert_eq!(
            sink.path_for("../etc/passwd"),
            PathBuf::from("/tmp/out/___etc_passwd.jsonl")
        );
        assert_eq!(
            sink.path_for("tenant-1_a"),
            PathBuf::from("/tmp/out/tenant-1_a.jsonl")
        );
    }

    #[tokio::test]
    async fn test_batches_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("nested"), "jsonl");

        sink.send("a", vec![Bytes::from("1"), Bytes::from("2")])
            .await
            .unwrap();
        sink.send("a", vec![Bytes::from("3")]).await.unwrap();
        sink.send("", vec![Bytes::from("x")]).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path_for("a")).await.unwrap();
        assert_eq!(contents, "1\n2\n3\n");

        let contents = tokio::fs::read_to_string(sink.path_for("")).await.unwrap();
        assert_eq!(contents, "x\n");
    }

    #[test]
    fn test_flush_failures_are_destination_errors() {
        let path = PathBuf::from("/tmp/out/a.jsonl");
        let err = std::io::Error::other("disk full");

        let err = destination_error("Failed to flush the output file", &path)(err);

        assert_eq!(err.kind(), ErrorKind::DestinationIoError);
        assert_eq!(err.detail(), Some("/tmp/out/a.jsonl: disk full"));
    }

    #[tokio::test]
    async fn test_unusable_directory_is_a_destination_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"").await.unwrap();
        let sink = FileSink::new(blocker.join("nested"), "jsonl");

        let err = sink.send("a", vec![Bytes::from("1")]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationIoError);
    }
}
