use thiserror::Error;
use warp::http::StatusCode;

use crate::storage::StorageError;

/// Failure taxonomy shared by every service operation.
#[derive(Debug, Error)]
pub enum CareError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("clinical index {index} is out of range for {len} entries")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CareError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CareError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CareError::Validation(_)
            | CareError::IndexOutOfRange { .. }
            | CareError::Conflict(_) => StatusCode::BAD_REQUEST,
            CareError::NotFound(_) => StatusCode::NOT_FOUND,
            CareError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a caller. Store diagnostics stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            CareError::StoreUnavailable(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for CareError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { collection, id } => {
                CareError::NotFound(format!("no {} record with id {}", collection, id))
            }
            StorageError::DuplicateId { collection, id } => CareError::Conflict(format!(
                "a {} record with id {} already exists",
                collection, id
            )),
            StorageError::DuplicateKey { collection, key } => {
                CareError::Conflict(format!("a {} record with {} already exists", collection, key))
            }
            other => CareError::StoreUnavailable(other.to_string()),
        }
    }
}
