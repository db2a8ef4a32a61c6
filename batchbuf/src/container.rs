use std::future::Future;

use futures::future::BoxFuture;

use crate::error::Result;

pub use array::ArrayContainer;
pub use json_lines::JsonLinesContainer;

/// In-memory batching into a `Vec`, handed to a [BatchSink] on flush.
mod array;

/// Newline-delimited JSON batching writer over any [tokio::io::AsyncWrite].
mod json_lines;

/// Container holds the items accumulated by a [Buffer](crate::Buffer) and knows how to flush
/// them. Only the buffer's event loop calls into it, one operation at a time.
pub trait Container<T>: Send + 'static {
    /// Accepts one item. Must not drop it silently, and a failure must leave previously
    /// accepted items untouched.
    fn put(&mut self, item: T) -> Result<()>;

    /// Hands the accumulated items off and returns the work that writes them out.
    ///
    /// The hand-off (moving the batch out and swapping in an empty accumulator) happens before
    /// this returns, so the container accepts new items immediately. The returned future owns
    /// the batch; the buffer either awaits it on the event loop or spawns it, depending on the
    /// flush policy, and the container may be written to while it is still running.
    fn flush(&mut self) -> BoxFuture<'static, Result<()>>;

    /// Whether the configured capacity threshold has been met or exceeded.
    fn is_full(&self) -> bool;

    /// Discards everything accumulated so far. Called after a failed `put` or `flush`.
    fn reset(&mut self);
}

/// Destination of the batches produced by [ArrayContainer].
#[trait_variant::make(BatchSink: Send)]
pub trait LocalBatchSink<T> {
    /// Writes one batch. The batch is never empty.
    async fn write_batch(&self, batch: Vec<T>) -> Result<()>;
}

/// [BatchSink] backed by an async closure, see [sink_fn].
#[derive(Clone)]
pub struct SinkFn<F> {
    f: F,
}

/// Wraps an async closure into a [BatchSink].
pub fn sink_fn<T, F, Fut>(f: F) -> SinkFn<F>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    SinkFn { f }
}

impl<T, F, Fut> BatchSink<T> for SinkFn<F>
where
    F: Fn(Vec<T>) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    fn write_batch(&self, batch: Vec<T>) -> impl Future<Output = Result<()>> + Send {
        (self.f)(batch)
    }
}
