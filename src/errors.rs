use std::path::PathBuf;

use thiserror::Error;

use answerd_protocol::ProtocolError;

/// Faults raised inside a generation engine while loading or decoding.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("tensor backend: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("tokenizer: {0}")]
    Tokenizer(String),

    #[error("model hub: {0}")]
    Hub(#[from] hf_hub::api::sync::ApiError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("adapter resource not found: {}", .0.display())]
    AdapterNotFound(PathBuf),

    #[error("{0}")]
    Other(String),
}

/// Request-level outcomes, one variant per failure class the HTTP surface reports.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No query provided")]
    InvalidRequest,

    #[error("adapter resource not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("generation failed: {0}")]
    GenerationFailure(#[source] EngineError),
}

impl ServiceError {
    /// Classifies a failed load attempt.
    pub fn from_load(err: EngineError) -> Self {
        match err {
            EngineError::AdapterNotFound(path) => Self::ResourceNotFound(path),
            other => Self::EngineUnavailable(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MissingQuery => Self::InvalidRequest,
        }
    }
}
