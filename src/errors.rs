use http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use crate::repositories::StoreError;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock. Available: {available}, Requested: {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("Concurrent modification of stock record {0}")]
    ConcurrentModification(Uuid),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn stock_not_found(id: Uuid) -> Self {
        ServiceError::NotFound(format!("Stock record {} not found", id))
    }

    pub fn consumption_not_found(id: Uuid) -> Self {
        ServiceError::NotFound(format!("Consumption record {} not found", id))
    }

    /// Short machine-readable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::ValidationError(_) => "validation_error",
            Self::StoreFailure(_) => "store_failure",
            Self::ConcurrentModification(_) => "concurrent_modification",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Store errors return a generic message to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::StoreFailure(_) => "Storage error".to_string(),
            _ => self.to_string(),
        }
    }
}
