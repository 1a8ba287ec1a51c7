//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use cadence_core::ProviderApiError;
use cadence_provider::ProviderErrorCode;

#[derive(Debug)]
pub enum ApiError {
    Internal(cadence_core::Error),
    Unauthorized(String),
    NotFound(String),
    BadRequest(String),
    /// The provider refused or could not be reached.
    Provider(ProviderApiError),
}

impl From<cadence_core::Error> for ApiError {
    fn from(err: cadence_core::Error) -> Self {
        match err {
            cadence_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            cadence_core::Error::JobNotFound(id) => {
                ApiError::NotFound(format!("generation {} not found", id))
            }
            cadence_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            cadence_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            cadence_core::Error::Provider(e) => ApiError::Provider(e),
            other => ApiError::Internal(other),
        }
    }
}

impl From<ProviderApiError> for ApiError {
    fn from(err: ProviderApiError) -> Self {
        ApiError::Provider(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Internal(err) => {
                tracing::error!(subsystem = "api", error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": err.to_string() }),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Provider(err) => {
                let code = ProviderErrorCode::from_error(&err);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({
                        "error": err.message,
                        "provider_code": err.code,
                        "provider_error": code.as_str(),
                        "retryable": code.is_retryable(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
