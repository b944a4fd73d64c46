use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArborError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied a malformed or out-of-range value.
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{what} not found: {id}")]
    NotFound { what: String, id: String },

    /// The stored record changed between read and write.
    #[error("Concurrent update detected for card {id}")]
    Conflict { id: String },

    /// Persisted scheduling data violates an engine invariant.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArborError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short error code string sent to HTTP clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ArborError::Config(_) => "CONFIG_ERROR",
            ArborError::InvalidInput { .. } => "INVALID_INPUT",
            ArborError::NotFound { .. } => "NOT_FOUND",
            ArborError::Conflict { .. } => "CONFLICT",
            ArborError::InternalInconsistency(_) => "INTERNAL_INCONSISTENCY",
            ArborError::Storage(_) => "STORAGE_ERROR",
            ArborError::Serialization(_) => "SERIALIZATION_ERROR",
            ArborError::Io(_) => "IO_ERROR",
            ArborError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures the caller caused and can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ArborError::InvalidInput { .. } | ArborError::NotFound { .. } | ArborError::Conflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ArborError>;
