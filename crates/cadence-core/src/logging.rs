//! Structured logging schema and field name constants for cadence.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation can query every subsystem by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention (lost terminal write) |
//! | WARN  | Recoverable issue, automatic fallback applied (CDN fallback, backoff) |
//! | INFO  | Lifecycle events, terminal transitions, sweep reports |
//! | DEBUG | Decision points, classification results, config choices |
//! | TRACE | Per-artifact iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "api", "db", "provider", "jobs", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pipeline", "reconcile", "callback", "gateway", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "submit", "task_status", "complete", "reconcile_all"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Generation job UUID.
pub const JOB_ID: &str = "job_id";

/// Opaque provider task id.
pub const TASK_ID: &str = "task_id";

/// Generation job kind.
pub const JOB_KIND: &str = "job_kind";

/// Owner UUID.
pub const OWNER_ID: &str = "owner_id";

/// Raw provider status string.
pub const PROVIDER_STATUS: &str = "provider_status";

/// How the job was resolved (callback, sweep, cli).
pub const RECOVERY_METHOD: &str = "recovery_method";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of artifacts reported or resolved.
pub const ARTIFACT_COUNT: &str = "artifact_count";

/// Number of artifacts that fell back to the provider CDN URL.
pub const FALLBACK_COUNT: &str = "fallback_count";

/// Number of jobs in a sweep or batch.
pub const BATCH_SIZE: &str = "batch_size";

/// Byte length of a stored artifact.
pub const SIZE_BYTES: &str = "size_bytes";

// ─── Error fields ──────────────────────────────────────────────────────────

/// Human-readable error message.
pub const ERROR_MSG: &str = "error";

/// Provider error code (including transport sentinels).
pub const ERROR_CODE: &str = "error_code";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_unique_snake_case() {
        let fields = [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            JOB_ID,
            TASK_ID,
            JOB_KIND,
            OWNER_ID,
            PROVIDER_STATUS,
            RECOVERY_METHOD,
            DURATION_MS,
            ARTIFACT_COUNT,
            FALLBACK_COUNT,
            BATCH_SIZE,
            SIZE_BYTES,
            ERROR_MSG,
            ERROR_CODE,
        ];
        let mut seen = std::collections::HashSet::new();
        for field in fields {
            assert!(seen.insert(field), "duplicate field {}", field);
            assert!(field.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
