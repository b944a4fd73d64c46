use arbor_core::ArborError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

/// Handler error: any crate error, rendered as `{error, code, field?}`.
#[derive(Debug)]
pub struct ApiError(pub ArborError);

impl ApiError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self(ArborError::invalid(field, reason))
    }
}

impl<E> From<E> for ApiError
where
    E: Into<ArborError>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            ArborError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ArborError::NotFound { .. } => StatusCode::NOT_FOUND,
            ArborError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &err {
            ArborError::InvalidInput { field, .. } => json!({
                "error": err.to_string(),
                "code": err.code(),
                "field": field,
            }),
            _ if err.is_client_error() => json!({
                "error": err.to_string(),
                "code": err.code(),
            }),
            _ => {
                // details stay in the log, never in the response
                error!(error = %err, code = err.code(), "request failed");
                json!({"error": "internal error", "code": err.code()})
            }
        };
        if err.is_client_error() {
            warn!(error = %err, status = status.as_u16(), "request rejected");
        }

        (status, Json(body)).into_response()
    }
}
