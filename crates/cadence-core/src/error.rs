//! Error types for cadence.

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Result type alias using cadence's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for provider adapter calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderApiError>;

/// Sentinel code for transport-level failures (DNS, connection reset, TLS).
pub const TRANSPORT_ERROR_CODE: i64 = -1;

/// Sentinel code for provider calls that exceeded their timeout.
pub const TIMEOUT_ERROR_CODE: i64 = -2;

/// Typed error returned by every provider adapter call.
///
/// `code` is either the provider envelope code, the HTTP status when no
/// envelope could be read, or one of the transport sentinels above.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Provider API error {code}: {message}")]
pub struct ProviderApiError {
    pub code: i64,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl ProviderApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    /// Wrap a network-level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_ERROR_CODE, message)
    }

    /// Wrap a call that did not complete within its deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TIMEOUT_ERROR_CODE, message)
    }

    /// True when the provider was never reached or never answered.
    pub fn is_transport(&self) -> bool {
        self.code == TRANSPORT_ERROR_CODE || self.code == TIMEOUT_ERROR_CODE
    }

    pub fn is_timeout(&self) -> bool {
        self.code == TIMEOUT_ERROR_CODE
    }
}

/// Core error type for cadence operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generation job not found
    #[error("Generation job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Provider answered with an error, or could not be reached
    #[error(transparent)]
    Provider(#[from] ProviderApiError),

    /// Durable storage read/write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Artifacts were resolved but the terminal write could not be persisted
    #[error("Persistence error for job {job_id}: {message}")]
    Persistence { job_id: uuid::Uuid, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error is a transient database failure worth retrying.
    pub fn is_retryable_database(&self) -> bool {
        match self {
            // Constraint violations fail the same way on every attempt.
            Error::Database(sqlx::Error::Database(db)) => {
                matches!(db.kind(), sqlx::error::ErrorKind::Other)
            }
            Error::Database(e) => !matches!(
                e,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::TypeNotFound { .. }
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Generation job not found: {}", id));
    }

    #[test]
    fn test_provider_error_display_is_transparent() {
        let err: Error = ProviderApiError::new(429, "Insufficient credits").into();
        assert_eq!(err.to_string(), "Provider API error 429: Insufficient credits");
    }

    #[test]
    fn test_persistence_error_names_job() {
        let id = Uuid::new_v4();
        let err = Error::Persistence {
            job_id: id,
            message: "connection reset".to_string(),
        };
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_transport_sentinels() {
        assert!(ProviderApiError::transport("dns").is_transport());
        assert!(ProviderApiError::timeout("slow").is_transport());
        assert!(ProviderApiError::timeout("slow").is_timeout());
        assert!(!ProviderApiError::transport("dns").is_timeout());
        assert!(!ProviderApiError::new(500, "boom").is_transport());
    }

    #[test]
    fn test_provider_error_details() {
        let err = ProviderApiError::new(400, "bad")
            .with_details(serde_json::json!({"field": "prompt"}));
        assert_eq!(err.details.unwrap()["field"], "prompt");
    }

    #[test]
    fn test_retryable_database_classification() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retryable_database());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_retryable_database());
        assert!(!Error::Internal("x".into()).is_retryable_database());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("database error {sqlstate}")]
    struct FakeDbError {
        sqlstate: &'static str,
    }

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "server said no"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            use sqlx::error::ErrorKind;
            match self.sqlstate {
                "23505" => ErrorKind::UniqueViolation,
                "23503" => ErrorKind::ForeignKeyViolation,
                "23502" => ErrorKind::NotNullViolation,
                "23514" => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn db_error(sqlstate: &'static str) -> Error {
        Error::Database(sqlx::Error::Database(Box::new(FakeDbError { sqlstate })))
    }

    #[test]
    fn test_constraint_violations_are_not_retried() {
        for sqlstate in ["23505", "23503", "23502", "23514"] {
            assert!(!db_error(sqlstate).is_retryable_database(), "{}", sqlstate);
        }
        // serialization_failure
        assert!(db_error("40001").is_retryable_database());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<ProviderApiError>();
    }
}
