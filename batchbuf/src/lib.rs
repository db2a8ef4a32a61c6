//! A generic in-process batching buffer. Callers [put](Buffer::put) items from any task, a single
//! event loop owns the accumulated state and hands batches to a pluggable [Container] whenever
//! the container reports it is full, the flush interval elapses, or a flush is requested
//! explicitly, whichever comes first.
//!
//! ```no_run
//! use batchbuf::{ArrayContainer, Buffer, Config, sink_fn};
//!
//! # async fn demo() -> batchbuf::Result<()> {
//! let container = ArrayContainer::new(
//!     100,
//!     sink_fn(|batch: Vec<u64>| async move {
//!         println!("flushing {} items", batch.len());
//!         Ok(())
//!     }),
//! );
//! let (buffer, mut errors) = Buffer::new(container, Config::default())?;
//! tokio::spawn(async move {
//!     while let Some(e) = errors.recv().await {
//!         eprintln!("buffer error: {e}");
//!     }
//! });
//!
//! buffer.put(42).await?;
//! buffer.flush(false).await?;
//! buffer.close_and_wait().await?;
//! # Ok(())
//! # }
//! ```

pub use crate::buffer::Buffer;
pub use crate::config::Config;
pub use crate::container::{
    ArrayContainer, BatchSink, Container, JsonLinesContainer, LocalBatchSink, SinkFn, sink_fn,
};
pub use crate::error::{Error, Result};

pub mod error;

/// Buffer configuration, defaulting and validation.
pub mod config;

/// The capability contract between the event loop and the storage/flush policy, along with the
/// containers shipped with the crate.
pub mod container;

/// The public handle and the event loop which owns the container.
mod buffer;

#[cfg(test)]
mod test_utils;
