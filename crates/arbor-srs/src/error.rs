use arbor_core::ArborError;
use thiserror::Error;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum SrsError {
    /// A caller-supplied value is outside its accepted range.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// A card state violates a scheduling invariant. Never corrected silently.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

pub type Result<T> = std::result::Result<T, SrsError>;

impl From<SrsError> for ArborError {
    fn from(e: SrsError) -> Self {
        match e {
            SrsError::InvalidInput { field, reason } => ArborError::invalid(field, reason),
            SrsError::InternalInconsistency(msg) => ArborError::InternalInconsistency(msg),
        }
    }
}
