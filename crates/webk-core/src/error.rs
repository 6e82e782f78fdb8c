//! Error types for Web-K.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
