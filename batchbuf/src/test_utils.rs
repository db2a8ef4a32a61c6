use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

use crate::container::{BatchSink, Container};
use crate::error::{Error, Result};

/// Polls `condition` until it holds, panics if it does not within a couple of seconds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

struct ProbeState<T> {
    items: Vec<T>,
    batches: Vec<Vec<T>>,
    resets: usize,
    fail_flushes: bool,
}

/// Container whose state can be inspected while the buffer owns it.
pub(crate) struct ProbeContainer<T> {
    state: Arc<Mutex<ProbeState<T>>>,
    capacity: usize,
    reject: Option<T>,
    flush_delay: Option<Duration>,
}

/// Read side of a [ProbeContainer].
#[derive(Clone)]
pub(crate) struct Probe<T> {
    state: Arc<Mutex<ProbeState<T>>>,
    capacity: usize,
}

impl<T> ProbeContainer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                items: Vec::new(),
                batches: Vec::new(),
                resets: 0,
                fail_flushes: false,
            })),
            capacity,
            reject: None,
            flush_delay: None,
        }
    }

    /// Every flush of a non-empty container fails.
    pub(crate) fn fail_flushes(self, fail: bool) -> Self {
        self.state.lock().fail_flushes = fail;
        self
    }

    /// `put` fails for this item.
    pub(crate) fn reject(mut self, item: T) -> Self {
        self.reject = Some(item);
        self
    }

    /// Batches are recorded only after this delay, simulating a slow sink.
    pub(crate) fn flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = Some(delay);
        self
    }

    pub(crate) fn probe(&self) -> Probe<T> {
        Probe {
            state: Arc::clone(&self.state),
            capacity: self.capacity,
        }
    }
}

impl<T: Clone> Probe<T> {
    /// Batches that were written successfully, in completion order.
    pub(crate) fn batches(&self) -> Vec<Vec<T>> {
        self.state.lock().batches.clone()
    }

    /// Items accumulated and not yet handed off.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub(crate) fn resets(&self) -> usize {
        self.state.lock().resets
    }

    pub(crate) fn set_fail_flushes(&self, fail: bool) {
        self.state.lock().fail_flushes = fail;
    }
}

impl<T> Container<T> for ProbeContainer<T>
where
    T: PartialEq + Debug + Send + 'static,
{
    fn put(&mut self, item: T) -> Result<()> {
        if self.reject.as_ref() == Some(&item) {
            return Err(Error::Put(format!("rejected {item:?}")));
        }
        self.state.lock().items.push(item);
        Ok(())
    }

    fn flush(&mut self) -> BoxFuture<'static, Result<()>> {
        let (batch, fail) = {
            let mut state = self.state.lock();
            (std::mem::take(&mut state.items), state.fail_flushes)
        };
        if batch.is_empty() {
            return futures::future::ok(()).boxed();
        }

        let state = Arc::clone(&self.state);
        let delay = self.flush_delay;
        async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            if fail {
                return Err(Error::Flush(format!("failed to flush {} items", batch.len())));
            }
            state.lock().batches.push(batch);
            Ok(())
        }
        .boxed()
    }

    fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.resets += 1;
    }
}

/// [BatchSink] which remembers every batch it was given.
#[derive(Clone)]
pub(crate) struct RecordingSink<T> {
    batches: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T: Clone> RecordingSink<T> {
    pub(crate) fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn batches(&self) -> Vec<Vec<T>> {
        self.batches.lock().clone()
    }

    /// All items written so far, flattened.
    pub(crate) fn items(&self) -> Vec<T> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl<T: Send + 'static> BatchSink<T> for RecordingSink<T> {
    async fn write_batch(&self, batch: Vec<T>) -> Result<()> {
        self.batches.lock().push(batch);
        Ok(())
    }
}
