use arbor_core::{ArborError, CardId};
use thiserror::Error;

/// Errors that can occur during flashcard store operations.
#[derive(Debug, Error)]
pub enum CardStoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested card does not exist.
    #[error("card not found: {id}")]
    NotFound { id: CardId },

    /// The card was written by someone else since `expected_version` was read.
    #[error("card {id} changed since version {expected_version}")]
    Conflict { id: CardId, expected_version: i64 },

    /// A review with this idempotency key has already been recorded.
    #[error("review already recorded for key {key}")]
    DuplicateReview { key: String },

    /// A stored row violates a scheduling invariant.
    #[error("inconsistent card row: {0}")]
    InternalInconsistency(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CardStoreError>;

impl From<CardStoreError> for ArborError {
    fn from(e: CardStoreError) -> Self {
        match e {
            CardStoreError::Database(e) => ArborError::Storage(e.to_string()),
            CardStoreError::NotFound { id } => ArborError::NotFound {
                what: "card".into(),
                id: id.to_string(),
            },
            CardStoreError::Conflict { id, .. } => ArborError::Conflict { id: id.to_string() },
            CardStoreError::DuplicateReview { key } => {
                ArborError::invalid("idempotencyKey", format!("{key} is already in use"))
            }
            CardStoreError::InternalInconsistency(msg) => ArborError::InternalInconsistency(msg),
            CardStoreError::InvalidInput(msg) => ArborError::invalid("body", msg),
        }
    }
}
