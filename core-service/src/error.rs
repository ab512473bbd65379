use core_catalog::views::{ErrorBody, ErrorResponse};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] core_catalog::CatalogError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl CoreError {
    /// Whether the caller may simply retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Catalog(err) if err.is_retryable())
    }

    /// Client-facing representation of the error.
    pub fn response(&self) -> ErrorResponse {
        match self {
            CoreError::Catalog(err) => ErrorResponse::from(err),
            other => ErrorResponse::Message(ErrorBody::new(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
