use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

use crate::error::{Error, Result};

const DEFAULT_CHAN_BUF_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15);

const ENV_BATCHBUF_ID: &str = "BATCHBUF_ID";
const ENV_BATCHBUF_CHAN_BUF_SIZE: &str = "BATCHBUF_CHAN_BUF_SIZE";
const ENV_BATCHBUF_DISABLE_AUTO_FLUSH: &str = "BATCHBUF_DISABLE_AUTO_FLUSH";
const ENV_BATCHBUF_FLUSH_INTERVAL_MS: &str = "BATCHBUF_FLUSH_INTERVAL_MS";
const ENV_BATCHBUF_SYNC_AUTO_FLUSH: &str = "BATCHBUF_SYNC_AUTO_FLUSH";
const ENV_BATCHBUF_LOG_LEVEL: &str = "BATCHBUF_LOG_LEVEL";

/// Configuration of a single [Buffer](crate::Buffer).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Identifies the buffer in logs. A random UUID is assigned when left empty.
    pub id: String,
    /// Capacity of the inbound channel. [Buffer::put](crate::Buffer::put) waits once this many
    /// items are queued and not yet consumed by the event loop.
    pub chan_buf_size: usize,
    /// Disables the timer trigger, the buffer then only flushes when the container is full,
    /// on request, or on close.
    pub disable_auto_flush: bool,
    /// Interval of the timer trigger.
    pub flush_interval: Duration,
    /// Run capacity, timer and manual flushes inline on the event loop instead of spawning them.
    pub sync_auto_flush: bool,
    /// Caps the verbosity of the events emitted by the event loop and its flush tasks.
    /// Containers log through the subscriber's own filter.
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            id: String::new(),
            chan_buf_size: DEFAULT_CHAN_BUF_SIZE,
            disable_auto_flush: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            sync_auto_flush: false,
            log_level: LevelFilter::INFO,
        }
    }
}

impl Config {
    /// Builds a config from environment variables, anything not set keeps its default.
    pub fn load(
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _val)| {
                [
                    ENV_BATCHBUF_ID,
                    ENV_BATCHBUF_CHAN_BUF_SIZE,
                    ENV_BATCHBUF_DISABLE_AUTO_FLUSH,
                    ENV_BATCHBUF_FLUSH_INTERVAL_MS,
                    ENV_BATCHBUF_SYNC_AUTO_FLUSH,
                    ENV_BATCHBUF_LOG_LEVEL,
                ]
                .contains(&key.as_str())
            })
            .collect();

        let get_var = |var: &str| env_vars.get(var).map(|val| val.trim());

        let mut config = Config::default();

        if let Some(id) = get_var(ENV_BATCHBUF_ID) {
            config.id = id.to_string();
        }
        if let Some(size) = get_var(ENV_BATCHBUF_CHAN_BUF_SIZE) {
            config.chan_buf_size = parse_env(ENV_BATCHBUF_CHAN_BUF_SIZE, size)?;
        }
        if let Some(flag) = get_var(ENV_BATCHBUF_DISABLE_AUTO_FLUSH) {
            config.disable_auto_flush = parse_env(ENV_BATCHBUF_DISABLE_AUTO_FLUSH, flag)?;
        }
        if let Some(millis) = get_var(ENV_BATCHBUF_FLUSH_INTERVAL_MS) {
            config.flush_interval =
                Duration::from_millis(parse_env(ENV_BATCHBUF_FLUSH_INTERVAL_MS, millis)?);
        }
        if let Some(flag) = get_var(ENV_BATCHBUF_SYNC_AUTO_FLUSH) {
            config.sync_auto_flush = parse_env(ENV_BATCHBUF_SYNC_AUTO_FLUSH, flag)?;
        }
        if let Some(level) = get_var(ENV_BATCHBUF_LOG_LEVEL) {
            config.log_level = parse_env(ENV_BATCHBUF_LOG_LEVEL, level)?;
        }

        Ok(config)
    }

    /// Fills in defaults that can only be computed at construction time and rejects values the
    /// event loop cannot run with.
    pub(crate) fn validate(mut self) -> Result<Self> {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }

        if self.chan_buf_size == 0 {
            return Err(Error::Config(
                "chan_buf_size should be greater than 0".to_string(),
            ));
        }

        if !self.disable_auto_flush && self.flush_interval.is_zero() {
            return Err(Error::Config(
                "flush_interval should be greater than 0 when auto flush is enabled".to_string(),
            ));
        }

        Ok(self)
    }
}

fn parse_env<V>(var: &str, value: &str) -> Result<V>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    value
        .parse::<V>()
        .map_err(|e| Error::Config(format!("Invalid value {value:?} for {var}: {e}")))
}
