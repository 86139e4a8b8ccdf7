use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid API key: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("unknown event type: {0:?}")]
    UnknownEventType(String),

    #[error("unknown command status: {0:?}")]
    UnknownCommandStatus(String),

    #[error("duplicate command {id} tracked for PVR {pvr}")]
    DuplicateCommand { pvr: String, id: u64 },

    #[error("PVR mismatch for {title:?}: bound to {bound}, claimed by {claimed}")]
    PvrMismatch {
        title: String,
        bound: String,
        claimed: String,
    },

    #[error("{operation} not supported by PVR {pvr}")]
    Unsupported { pvr: String, operation: &'static str },

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("no status received for command {0}")]
    MissingCommandStatus(u64),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
