use bytes::Bytes;
use tokio::io::{AsyncWriteExt, stdout};

use crate::conduit_error;
use crate::error::{ConduitError, ConduitResult, ErrorKind};
use crate::sink::Sink;

/// A sink writing every payload to standard output followed by a newline.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

fn write_error(err: std::io::Error) -> ConduitError {
    conduit_error!(
        ErrorKind::DestinationIoError,
        "Failed to write to stdout",
        err
    )
}

impl Sink for StdoutSink {
    async fn send(&self, _batch_key: &str, items: Vec<Bytes>) -> ConduitResult<()> {
        let mut out = stdout();
        for item in items {
            out.write_all(&item).await.map_err(write_error)?;
            out.write_all(b"\n").await.map_err(write_error)?;
        }

        out.flush().await.map_err(write_error)
    }
}
