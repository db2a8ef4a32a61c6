use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::buffer::event_loop::{EventLoop, FlushSignal};
use crate::config::Config;
use crate::container::Container;
use crate::error::{Error, Result};

/// The single task which owns the container and serializes all access to it.
mod event_loop;

/// Only one error is held for the application at a time, the event loop never waits for it to
/// be read.
const ERROR_CHANNEL_SIZE: usize = 1;

/// Flush requests are tiny and served quickly, an asynchronous [Buffer::flush] returns as soon
/// as its request is queued.
const FLUSH_CHANNEL_SIZE: usize = 1;

/// Handle to a batching buffer. Cloning the handle is cheap and every clone feeds the same event
/// loop; items are handed to the [Container] in the order they are accepted by [Buffer::put].
///
/// The buffer flushes whenever the container reports it is full, every
/// [flush_interval](Config::flush_interval) unless auto flush is disabled, or when asked to via
/// [Buffer::flush]. Errors from the container are never returned to the caller that triggered
/// them, they are delivered on the error channel returned by [Buffer::new].
pub struct Buffer<T> {
    id: Arc<str>,
    data_tx: mpsc::Sender<T>,
    flush_tx: mpsc::Sender<FlushSignal>,
    /// Cancelled once shutdown has been requested.
    cancel: CancellationToken,
    /// Makes sure exactly one `close` succeeds, even if several race.
    closing: Arc<AtomicBool>,
    /// Cancelled by the event loop once it has drained and released the container.
    terminated: CancellationToken,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            id: Arc::clone(&self.id),
            data_tx: self.data_tx.clone(),
            flush_tx: self.flush_tx.clone(),
            cancel: self.cancel.clone(),
            closing: Arc::clone(&self.closing),
            terminated: self.terminated.clone(),
        }
    }
}

impl<T> Buffer<T>
where
    T: Send + 'static,
{
    /// Creates a buffer around `container` and starts its event loop on the current tokio
    /// runtime. Returns the handle and the channel on which put and flush failures are reported;
    /// the channel is closed once the buffer has terminated.
    pub fn new<C>(container: C, config: Config) -> Result<(Self, mpsc::Receiver<Error>)>
    where
        C: Container<T>,
    {
        Self::start(container, config, CancellationToken::new())
    }

    /// Same as [Buffer::new], but the buffer also shuts down (and drains) when `parent` is
    /// cancelled.
    pub fn with_cancellation<C>(
        container: C,
        config: Config,
        parent: &CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Error>)>
    where
        C: Container<T>,
    {
        Self::start(container, config, parent.child_token())
    }

    fn start<C>(
        container: C,
        config: Config,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Error>)>
    where
        C: Container<T>,
    {
        let config = config.validate()?;

        let (data_tx, data_rx) = mpsc::channel(config.chan_buf_size);
        let (flush_tx, flush_rx) = mpsc::channel(FLUSH_CHANNEL_SIZE);
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_SIZE);
        let terminated = CancellationToken::new();

        let span = info_span!("buffer", id = %config.id);
        let id: Arc<str> = Arc::from(config.id.as_str());

        let event_loop = EventLoop::new(
            container,
            &config,
            data_rx,
            flush_rx,
            error_tx,
            cancel.clone(),
            terminated.clone(),
        );
        tokio::spawn(event_loop.run().instrument(span));

        Ok((
            Self {
                id,
                data_tx,
                flush_tx,
                cancel,
                closing: Arc::new(AtomicBool::new(false)),
                terminated,
            },
            error_rx,
        ))
    }

    /// Queues one item. Waits only while the inbound channel is full. Fails with
    /// [Error::Closed] once the buffer is shutting down; an item accepted with `Ok` is always
    /// handed to the container, even if shutdown starts right after.
    pub async fn put(&self, item: T) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.data_tx.send(item).await.map_err(|_| Error::Closed)
    }

    /// Requests a flush. Items whose `put` completed before this call are part of the flushed
    /// batch.
    ///
    /// With `async_flush` set, returns once the request is queued. Otherwise waits until the
    /// event loop has completed its flush call: with `sync_auto_flush` that means the batch has
    /// been written, with the (default) detached policy it means the batch has been handed off
    /// to a background task, which may still be writing it.
    pub async fn flush(&self, async_flush: bool) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if async_flush {
            return self
                .flush_tx
                .send(FlushSignal { done: None })
                .await
                .map_err(|_| Error::Closed);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.flush_tx
            .send(FlushSignal {
                done: Some(done_tx),
            })
            .await
            .map_err(|_| Error::Closed)?;

        done_rx.await.map_err(|_| Error::Closed)
    }

    /// Starts a graceful shutdown and returns without waiting for it. Queued items are still
    /// handed to the container and flushed once more; use [Buffer::terminated] or
    /// [Buffer::close_and_wait] to wait for that. Only the first call succeeds.
    pub fn close(&self) -> Result<()> {
        if self.is_closed() || self.closing.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.cancel.cancel();
        Ok(())
    }

    /// [Buffer::close] and wait until the buffer has terminated.
    ///
    /// Flushes spawned under the detached policy before the shutdown are not waited for.
    pub async fn close_and_wait(&self) -> Result<()> {
        self.close()?;
        self.terminated().await;
        Ok(())
    }

    /// Resolves once the event loop has drained, run its final flush and exited.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await
    }

    /// True once shutdown has been requested, either by [Buffer::close] or by the parent
    /// cancellation token.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
