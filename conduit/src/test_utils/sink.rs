use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use crate::conduit_error;
use crate::error::{ConduitResult, ErrorKind};
use crate::sink::Sink;

type SendCondition<T> = Box<dyn Fn(&[(String, Vec<T>)]) -> bool + Send + Sync>;

struct Inner<S, T> {
    wrapped_sink: S,
    sends: Vec<(String, Vec<T>)>,
    fail_next: usize,
    failing_keys: HashSet<String>,
    send_conditions: Vec<(SendCondition<T>, Arc<Notify>)>,
}

impl<S, T> Inner<S, T> {
    fn check_conditions(&mut self) {
        let sends = &self.sends;
        self.send_conditions.retain(|(condition, notify)| {
            let should_retain = !condition(sends);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }

    fn should_fail(&mut self, batch_key: &str) -> bool {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return true;
        }

        self.failing_keys.contains(batch_key)
    }
}

/// A test wrapper that records the successful sends of any sink and can be
/// told to fail sends.
pub struct TestSinkWrapper<S, T> {
    inner: Arc<RwLock<Inner<S, T>>>,
    max_item_size: usize,
}

impl<S, T> Clone for TestSinkWrapper<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            max_item_size: self.max_item_size,
        }
    }
}

impl<S, T> TestSinkWrapper<S, T>
where
    S: Sink<T>,
    T: Clone,
{
    /// Creates a new test wrapper around any sink.
    pub fn wrap(sink: S) -> Self {
        let max_item_size = sink.max_item_size();
        let inner = Inner {
            wrapped_sink: sink,
            sends: Vec::new(),
            fail_next: 0,
            failing_keys: HashSet::new(),
            send_conditions: Vec::new(),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            max_item_size,
        }
    }

    /// Returns every successful send with its batch key, in order.
    pub async fn sends(&self) -> Vec<(String, Vec<T>)> {
        self.inner.read().await.sends.clone()
    }

    /// Makes the next `count` sends fail with [`ErrorKind::DestinationError`].
    pub async fn fail_next_sends(&self, count: usize) {
        self.inner.write().await.fail_next = count;
    }

    /// Makes every send for `batch_key` fail until [`TestSinkWrapper::clear_failures`] is called.
    pub async fn fail_sends_for(&self, batch_key: &str) {
        self.inner
            .write()
            .await
            .failing_keys
            .insert(batch_key.to_owned());
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.write().await;
        inner.fail_next = 0;
        inner.failing_keys.clear();
    }

    /// Returns a [`Notify`] signaled once at least `count` sends succeeded.
    pub async fn wait_for_sends(&self, count: usize) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.write().await;
        inner
            .send_conditions
            .push((Box::new(move |sends| sends.len() >= count), notify.clone()));
        inner.check_conditions();

        notify
    }
}

impl<S, T> Sink<T> for TestSinkWrapper<S, T>
where
    S: Sink<T> + Clone + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn max_item_size(&self) -> usize {
        self.max_item_size
    }

    async fn send(&self, batch_key: &str, items: Vec<T>) -> ConduitResult<()> {
        let (sink, should_fail) = {
            let mut inner = self.inner.write().await;
            let should_fail = inner.should_fail(batch_key);
            (inner.wrapped_sink.clone(), should_fail)
        };

        let result = if should_fail {
            Err(conduit_error!(
                ErrorKind::DestinationError,
                "Injected send failure",
                batch_key
            ))
        } else {
            sink.send(batch_key, items.clone()).await
        };

        {
            let mut inner = self.inner.write().await;
            if result.is_ok() {
                inner.sends.push((batch_key.to_owned(), items));
            }

            inner.check_conditions();
        }

        result
    }
}
