use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use crate::container::{BatchSink, Container};
use crate::error::Result;

/// Collects items into a `Vec` and writes the whole vector to its [BatchSink] on flush. It is
/// considered full once `flush_size` items have been accumulated.
pub struct ArrayContainer<T, S> {
    items: Vec<T>,
    flush_size: usize,
    sink: Arc<S>,
}

impl<T, S> ArrayContainer<T, S> {
    pub fn new(flush_size: usize, sink: S) -> Self {
        Self {
            items: Vec::with_capacity(flush_size),
            flush_size,
            sink: Arc::new(sink),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn flush_size(&self) -> usize {
        self.flush_size
    }

    /// Items accumulated since the last flush or reset.
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T, S> Container<T> for ArrayContainer<T, S>
where
    T: Send + 'static,
    S: BatchSink<T> + Sync + 'static,
{
    fn put(&mut self, item: T) -> Result<()> {
        self.items.push(item);
        Ok(())
    }

    fn flush(&mut self) -> BoxFuture<'static, Result<()>> {
        if self.items.is_empty() {
            return futures::future::ok(()).boxed();
        }

        let batch = std::mem::replace(&mut self.items, Vec::with_capacity(self.flush_size));
        let sink = Arc::clone(&self.sink);
        async move {
            debug!(size = batch.len(), "Writing batch to sink");
            sink.write_batch(batch).await
        }
        .boxed()
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.flush_size
    }

    fn reset(&mut self) {
        self.items = Vec::with_capacity(self.flush_size);
    }
}
