use std::time::Duration;

// Everything that can go wrong between an inbound request and a served image
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    // Store miss, or an unknown cache key / filename
    #[error("{0}")]
    NotFound(String),

    // Disk write/read/delete failure
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("generation backend is not available at {url}: {message}")]
    BackendUnavailable { url: String, message: String },

    #[error("image generation took longer than {0:?}")]
    BackendTimeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("no images generated by the backend")]
    EmptyResult,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Generation task panicked or was cancelled at runtime shutdown
    #[error("generation task failed: {0}")]
    Task(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
