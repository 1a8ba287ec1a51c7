//! Request middleware.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Require `Authorization: Bearer <ADMIN_TOKEN>` when a token is configured.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.admin_token.as_deref() {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        if provided != Some(expected) {
            warn!(
                subsystem = "api",
                component = "admin_auth",
                path = %request.uri().path(),
                "Rejected admin request without a valid token"
            );
            return Err(ApiError::Unauthorized(
                "a valid admin bearer token is required".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}
