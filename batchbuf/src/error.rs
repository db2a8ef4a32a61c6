use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer has begun (or finished) shutting down and no longer accepts work.
    #[error("Buffer is closed")]
    Closed,

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Put Error - {0}")]
    Put(String),

    #[error("Flush Error - {0}")]
    Flush(String),

    #[error("Sink Error - {0}")]
    Sink(String),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Put(value.to_string())
    }
}
