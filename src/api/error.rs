use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ProvisionError;
use crate::maas::GatewayError;

/// A [`ProvisionError`] on its way to an HTTP client.
#[derive(Debug)]
pub struct ApiError(pub ProvisionError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        ApiError(err)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub details: serde_json::Value,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ProvisionError::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ProvisionError::IdentifierResolution { .. } => {
                (StatusCode::BAD_REQUEST, "UNRESOLVED_IDENTIFIERS")
            }
            ProvisionError::InsufficientResources { .. } => {
                (StatusCode::CONFLICT, "INSUFFICIENT_RESOURCES")
            }
            ProvisionError::JobNotFound(_) | ProvisionError::MachineNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ProvisionError::Gateway(_) => (StatusCode::BAD_GATEWAY, "MAAS_ERROR"),
            ProvisionError::Config(_)
            | ProvisionError::Render(_)
            | ProvisionError::Transition(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code,
            details: self.0.details(),
        };
        (status, Json(body)).into_response()
    }
}
