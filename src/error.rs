use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to the chat server.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection, timeout or body decoding failed
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("API error: {status} for {url}")]
    Status { status: StatusCode, url: String },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(err) => err.status(),
            Self::Status { status, .. } => Some(*status),
        }
    }
}

/// Failure reading or writing the persisted snapshot.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("message not found: {0}")]
    MessageNotFound(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid base url: {0:?}")]
    InvalidBaseUrl(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
