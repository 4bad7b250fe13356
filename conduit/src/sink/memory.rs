use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ConduitResult;
use crate::sink::Sink;

#[derive(Debug)]
struct Inner<T> {
    batches: Vec<(String, Vec<T>)>,
}

/// A sink keeping every batch in memory.
#[derive(Debug, Clone)]
pub struct MemorySink<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone> MemorySink<T> {
    pub fn new() -> Self {
        let inner = Inner {
            batches: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns every batch received so far with its batch key, in arrival order.
    pub async fn batches(&self) -> Vec<(String, Vec<T>)> {
        self.inner.lock().await.batches.clone()
    }

    /// Returns every item received so far, in arrival order.
    pub async fn items(&self) -> Vec<T> {
        let inner = self.inner.lock().await;
        inner
            .batches
            .iter()
            .flat_map(|(_, items)| items.iter().cloned())
            .collect()
    }
}

impl<T: Clone> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Sink<T> for MemorySink<T> {
    async fn send(&self, batch_key: &str, items: Vec<T>) -> ConduitResult<()> {
        let mut inner = self.inner.lock().await;
        debug!(batch_key, count = items.len(), "storing batch in memory");
        inner.batches.push((batch_key.to_owned(), items));

        Ok(())
    }
}
