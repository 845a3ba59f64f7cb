use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gendora::GenerateError;
use serde_json::json;

/// Request failures of the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The generator refused this call.
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// A path segment is not an unsigned 64-bit integer.
    #[error("invalid id {id:?}: expected an unsigned 64-bit integer")]
    InvalidId { id: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            // Transient for this instance.
            Self::Generate(GenerateError::SlotUnavailable)
            | Self::Generate(GenerateError::ClockMovedBackwards { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Generate(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidId { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
