use std::marker::PhantomData;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::container::Container;
use crate::error::{Error, Result};

/// Bulk writer which encodes every row as one line of JSON and writes a whole batch of lines
/// at once. Rows are encoded on `put`, so an unserializable row is rejected up front rather than
/// poisoning a batch.
///
/// Batches flushed concurrently (detached flush policy) are written one at a time through the
/// shared writer, but not necessarily in the order they were flushed.
pub struct JsonLinesContainer<T, W> {
    writer: Arc<Mutex<W>>,
    buf: BytesMut,
    rows: usize,
    bulk_size: usize,
    max_bytes: Option<usize>,
    _rows: PhantomData<fn(T)>,
}

impl<T, W> JsonLinesContainer<T, W> {
    /// Creates a container flushing every `bulk_size` rows into `writer`. The writer is shared so
    /// the caller can keep a handle to it.
    pub fn new(writer: Arc<Mutex<W>>, bulk_size: usize) -> Self {
        Self {
            writer,
            buf: BytesMut::new(),
            rows: 0,
            bulk_size,
            max_bytes: None,
            _rows: PhantomData,
        }
    }

    /// Additionally report full once the encoded batch reaches `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Number of rows waiting for the next flush.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Encoded size of the rows waiting for the next flush.
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }
}

impl<T, W> Container<T> for JsonLinesContainer<T, W>
where
    T: Serialize + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn put(&mut self, item: T) -> Result<()> {
        let line = serde_json::to_vec(&item)?;
        self.buf.reserve(line.len() + 1);
        self.buf.put_slice(&line);
        self.buf.put_u8(b'\n');
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> BoxFuture<'static, Result<()>> {
        if self.rows == 0 {
            return futures::future::ok(()).boxed();
        }

        let batch = self.buf.split().freeze();
        let rows = std::mem::take(&mut self.rows);
        let writer = Arc::clone(&self.writer);
        async move {
            let mut writer = writer.lock().await;
            writer
                .write_all(&batch)
                .await
                .map_err(|e| Error::Flush(format!("Failed to write {rows} rows: {e}")))?;
            writer
                .flush()
                .await
                .map_err(|e| Error::Flush(format!("Failed to flush writer: {e}")))?;
            debug!(rows, bytes = batch.len(), "Wrote json lines batch");
            Ok(())
        }
        .boxed()
    }

    fn is_full(&self) -> bool {
        self.rows >= self.bulk_size || self.max_bytes.is_some_and(|max| self.buf.len() >= max)
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.rows = 0;
    }
}
