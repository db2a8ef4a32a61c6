use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::sync::Arc;

use batchbuf::{ArrayContainer, Buffer, Config, Container, JsonLinesContainer, sink_fn};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

mod setup_tracing;

const PRODUCERS: u64 = 4;
const EVENTS_PER_PRODUCER: u64 = 250;
const BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Serialize)]
struct PageView {
    producer: u64,
    seq: u64,
    path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let env_vars: HashMap<String, String> = env::vars().collect();
    let config = Config::load(env_vars)?;
    info!(?config, "Starting with config");

    // Based on the argument, pick the container the events are batched into.
    if args.contains(&"--json".to_string()) {
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
        let container = JsonLinesContainer::new(stdout, BATCH_SIZE);
        produce(container, config).await
    } else {
        let container = ArrayContainer::new(
            BATCH_SIZE,
            sink_fn(|batch: Vec<PageView>| async move {
                info!(
                    size = batch.len(),
                    first = ?batch.first(),
                    last = ?batch.last(),
                    "Flushed batch"
                );
                Ok(())
            }),
        );
        produce(container, config).await
    }
}

/// Feeds page views from a few concurrent producers into a buffer around `container`, then
/// shuts the buffer down gracefully.
async fn produce<C>(container: C, config: Config) -> Result<(), Box<dyn Error>>
where
    C: Container<PageView>,
{
    let (buffer, mut errors) = Buffer::new(container, config)?;
    info!(id = buffer.id(), "Buffer created");

    let error_watcher = tokio::spawn(async move {
        let mut reported = 0usize;
        while let Some(e) = errors.recv().await {
            warn!(?e, "Buffer reported an error");
            reported += 1;
        }
        reported
    });

    let mut producers = Vec::with_capacity(PRODUCERS as usize);
    for producer in 0..PRODUCERS {
        let buffer = buffer.clone();
        producers.push(tokio::spawn(async move {
            for seq in 0..EVENTS_PER_PRODUCER {
                let view = PageView {
                    producer,
                    seq,
                    path: format!("/articles/{}", seq % 7),
                };
                buffer.put(view).await?;
            }
            Ok::<_, batchbuf::Error>(())
        }));
    }
    for producer in producers {
        producer.await??;
    }

    // hand off whatever is left before shutting down
    buffer.flush(false).await?;
    buffer.close_and_wait().await?;

    let reported = error_watcher.await?;
    info!(
        events = PRODUCERS * EVENTS_PER_PRODUCER,
        errors = reported,
        "Buffer drained"
    );
    Ok(())
}
