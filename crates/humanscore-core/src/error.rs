use humanscore_store::StoreError;
use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every provider that could have answered failed at the transport level.
    #[error("analysis unavailable (tried: {tried}): {message}")]
    Transport { tried: String, message: String },

    #[error("malformed model response: {0}")]
    MalformedResponse(#[from] ExtractError),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("session store failure: {0}")]
    Store(#[from] StoreError),

    #[error("step coalescer stopped before the event was flushed")]
    Dropped,
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Invalid input is the caller's fault; everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
