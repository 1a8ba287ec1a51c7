//! Provider error code table.
//!
//! The provider reports failures through the `code` field of its response
//! envelope. Codes are mapped onto a small enum so callers can decide whether
//! a failed call is worth retrying.

use cadence_core::{ProviderApiError, TIMEOUT_ERROR_CODE, TRANSPORT_ERROR_CODE};

/// Provider-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorCode {
    /// Malformed or missing request parameters.
    BadRequest,
    /// Invalid or missing API key.
    Unauthorized,
    /// Unknown endpoint or task.
    NotFound,
    /// Wrong HTTP method for the endpoint.
    MethodNotAllowed,
    /// Prompt or upload too large.
    PayloadTooLarge,
    /// Account has no credits left.
    InsufficientCredits,
    /// Request rate exceeded.
    RateLimited,
    /// Provider is under maintenance.
    Maintenance,
    /// Provider-side failure.
    ServerError,
    /// Provider could not be reached.
    Transport,
    /// Provider did not answer in time.
    Timeout,
    /// Anything else.
    Unknown,
}

impl ProviderErrorCode {
    /// Map an envelope code, HTTP status or transport sentinel.
    pub fn from_code(code: i64) -> Self {
        match code {
            TRANSPORT_ERROR_CODE => Self::Transport,
            TIMEOUT_ERROR_CODE => Self::Timeout,
            400 => Self::BadRequest,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            413 => Self::PayloadTooLarge,
            429 => Self::InsufficientCredits,
            430 => Self::RateLimited,
            455 => Self::Maintenance,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn from_error(err: &ProviderApiError) -> Self {
        Self::from_code(err.code)
    }

    /// Check if a call failing with this code may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Maintenance
                | Self::ServerError
                | Self::Transport
                | Self::Timeout
        )
    }

    /// Short machine-readable label, used in API error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::PayloadTooLarge => "payload_too_large",
            Self::InsufficientCredits => "insufficient_credits",
            Self::RateLimited => "rate_limited",
            Self::Maintenance => "maintenance",
            Self::ServerError => "server_error",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}
