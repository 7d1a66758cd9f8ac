use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("no connection to Chrome extension")]
    NoConnection,

    #[error("send buffer full")]
    BufferFull,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection to Chrome extension lost")]
    LinkLost,

    #[error("chrome extension error: {0}")]
    Extension(String),

    #[error("{0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("empty response from Chrome extension")]
    EmptyResponse,

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl BridgeError {
    /// Transient failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::BufferFull)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
