use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host answered with its own error envelope.
    #[error("API error for {path}: {message}")]
    Api { path: String, message: String },

    #[error("empty response body for {0}")]
    MissingBody(String),

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("preload cancelled")]
    Cancelled,

    #[error("preload task already started")]
    AlreadyStarted,
}
