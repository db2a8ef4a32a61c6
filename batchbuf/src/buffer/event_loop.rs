use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::level_filters::LevelFilter;
use tracing::{Instrument, Level, Span};

use crate::config::Config;
use crate::container::Container;
use crate::error::Error;

/// Emits an event at `$level` only when the buffer's `LevelFilter` allows it.
macro_rules! event_at {
    ($filter:expr, $level:ident, $($arg:tt)+) => {
        if $filter >= Level::$level {
            tracing::event!(Level::$level, $($arg)+);
        }
    };
}

/// A flush request sent by [Buffer::flush](crate::Buffer::flush). `done` is present when the
/// caller waits for the flush to be handed off.
pub(crate) struct FlushSignal {
    pub(crate) done: Option<oneshot::Sender<()>>,
}

impl FlushSignal {
    fn complete(self) {
        if let Some(done) = self.done {
            // the caller may have given up waiting
            let _ = done.send(());
        }
    }
}

/// How the event loop executes the future returned by [Container::flush].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushPolicy {
    /// Await it on the loop, nothing else is processed until the batch is written.
    Inline,
    /// Spawn it, the loop keeps consuming items while the batch is written.
    Detached,
}

/// Why a flush was started, only used for logging.
#[derive(Debug, Clone, Copy)]
enum FlushTrigger {
    Full,
    Timer,
    Manual,
    Shutdown,
}

/// EventLoop is the only owner of the container. It consumes items and flush requests from the
/// [Buffer](crate::Buffer) handles, runs the flush timer, and drains everything on shutdown.
pub(super) struct EventLoop<T, C> {
    container: C,
    data_rx: mpsc::Receiver<T>,
    flush_rx: mpsc::Receiver<FlushSignal>,
    error_tx: mpsc::Sender<Error>,
    /// Detached flushes report their failures back here, as only the loop may reset the
    /// container.
    failures_tx: mpsc::UnboundedSender<Error>,
    failures_rx: mpsc::UnboundedReceiver<Error>,
    cancel: CancellationToken,
    timer: Pin<Box<Sleep>>,
    auto_flush: bool,
    flush_interval: Duration,
    policy: FlushPolicy,
    log_level: LevelFilter,
    /// Declared last so it fires after the container and the channels have been dropped.
    _terminated: DropGuard,
}

impl<T, C> EventLoop<T, C>
where
    T: Send + 'static,
    C: Container<T>,
{
    pub(super) fn new(
        container: C,
        config: &Config,
        data_rx: mpsc::Receiver<T>,
        flush_rx: mpsc::Receiver<FlushSignal>,
        error_tx: mpsc::Sender<Error>,
        cancel: CancellationToken,
        terminated: CancellationToken,
    ) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let policy = if config.sync_auto_flush {
            FlushPolicy::Inline
        } else {
            FlushPolicy::Detached
        };

        Self {
            container,
            data_rx,
            flush_rx,
            error_tx,
            failures_tx,
            failures_rx,
            cancel,
            timer: Box::pin(tokio::time::sleep(config.flush_interval)),
            auto_flush: !config.disable_auto_flush,
            flush_interval: config.flush_interval,
            policy,
            log_level: config.log_level,
            _terminated: terminated.drop_guard(),
        }
    }

    /// Runs until the buffer is closed (or every handle is dropped), then drains.
    pub(super) async fn run(mut self) {
        event_at!(
            self.log_level,
            INFO,
            policy = ?self.policy,
            auto_flush = self.auto_flush,
            flush_interval = ?self.flush_interval,
            "Buffer started"
        );
        self.restart_timer();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    event_at!(self.log_level, INFO, "Received close signal, draining buffer");
                    break;
                }
                Some(err) = self.failures_rx.recv() => {
                    self.recover(err);
                }
                _ = &mut self.timer, if self.auto_flush => {
                    self.flush(FlushTrigger::Timer).await;
                    self.restart_timer();
                }
                signal = self.flush_rx.recv() => {
                    let Some(signal) = signal else {
                        event_at!(
                            self.log_level,
                            INFO,
                            "All buffer handles dropped, draining buffer"
                        );
                        break;
                    };
                    self.handle_flush_request(signal).await;
                }
                item = self.data_rx.recv() => {
                    let Some(item) = item else {
                        event_at!(
                            self.log_level,
                            INFO,
                            "All buffer handles dropped, draining buffer"
                        );
                        break;
                    };
                    self.put_and_check(item).await;
                }
            }
        }

        self.drain().await;
    }

    /// Moves the items which were already queued when the request arrived into the container
    /// before flushing, so a flush issued after a completed `put` includes that item.
    async fn handle_flush_request(&mut self, signal: FlushSignal) {
        let queued = self.data_rx.len();
        for _ in 0..queued {
            match self.data_rx.try_recv() {
                Ok(item) => self.put_and_check(item).await,
                Err(_) => break,
            }
        }

        self.flush(FlushTrigger::Manual).await;
        signal.complete();
    }

    async fn put_and_check(&mut self, item: T) {
        if let Err(e) = self.container.put(item) {
            self.recover(e);
            return;
        }

        if self.container.is_full() {
            self.flush(FlushTrigger::Full).await;
            self.restart_timer();
        }
    }

    /// Hands the container's batch off and runs the flush according to the policy.
    async fn flush(&mut self, trigger: FlushTrigger) {
        event_at!(self.log_level, DEBUG, ?trigger, policy = ?self.policy, "Flushing container");

        let pending = self.container.flush();
        match self.policy {
            FlushPolicy::Inline => {
                if let Err(e) = pending.await {
                    self.recover(e);
                }
            }
            FlushPolicy::Detached => {
                let failures_tx = self.failures_tx.clone();
                let log_level = self.log_level;
                tokio::spawn(
                    async move {
                        let Err(e) = pending.await else {
                            return;
                        };
                        if let Err(mpsc::error::SendError(e)) = failures_tx.send(e) {
                            // the loop has terminated, nobody is left to reset or report to
                            event_at!(
                                log_level,
                                WARN,
                                ?e,
                                "Detached flush failed after the buffer terminated"
                            );
                        }
                    }
                    .instrument(Span::current()),
                );
            }
        }
    }

    /// Recovery for any put or flush failure: discard the container's contents so it stays
    /// usable, then let the application know.
    fn recover(&mut self, err: Error) {
        event_at!(self.log_level, ERROR, ?err, "Container operation failed, resetting container");
        self.container.reset();
        self.report(err);
    }

    /// Never waits for the application to read the error channel.
    fn report(&self, err: Error) {
        match self.error_tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                event_at!(self.log_level, WARN, ?err, "Error channel is full, dropping error");
            }
            Err(TrySendError::Closed(err)) => {
                event_at!(
                    self.log_level,
                    DEBUG,
                    ?err,
                    "Error channel receiver dropped, dropping error"
                );
            }
        }
    }

    fn restart_timer(&mut self) {
        if self.auto_flush {
            self.timer
                .as_mut()
                .reset(Instant::now() + self.flush_interval);
        }
    }

    /// Shutdown path. Closing the receivers first stops new sends, so draining ends once the
    /// items accepted before the close have been consumed.
    async fn drain(mut self) {
        self.data_rx.close();
        self.flush_rx.close();

        let mut drained = 0usize;
        while let Some(item) = self.data_rx.recv().await {
            self.put_and_check(item).await;
            drained += 1;
        }

        // the last flush is always awaited, whatever the policy
        event_at!(
            self.log_level,
            DEBUG,
            trigger = ?FlushTrigger::Shutdown,
            drained,
            "Flushing container"
        );
        if let Err(e) = self.container.flush().await {
            self.recover(e);
        }

        // waiters that raced with the shutdown are covered by the final flush
        while let Some(signal) = self.flush_rx.recv().await {
            signal.complete();
        }

        while let Ok(err) = self.failures_rx.try_recv() {
            self.report(err);
        }

        event_at!(self.log_level, INFO, drained, "Buffer terminated");
    }
}
