//! Centralized default constants for cadence.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in every crate fall back to these when an environment
//! variable is unset.

// =============================================================================
// PROVIDER
// =============================================================================

/// Default provider API base URL.
pub const PROVIDER_BASE_URL: &str = "https://api.sunoapi.org/api/v1";

/// Per-request timeout for provider calls.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Envelope code the provider uses for success.
pub const PROVIDER_SUCCESS_CODE: i64 = 200;

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Jobs reconciled concurrently within one batch.
pub const RECONCILE_BATCH_SIZE: usize = 5;

/// Pause between batches, bounding sustained request rate to the provider.
pub const RECONCILE_BATCH_DELAY_MS: u64 = 200;

/// Deadline for one provider status query during a sweep.
pub const RECONCILE_STATUS_TIMEOUT_SECS: u64 = 60;

/// Consecutive transport errors for one job kind before backoff engages.
pub const RECONCILE_BACKOFF_THRESHOLD: u32 = 3;

/// First backoff window once the threshold is reached.
pub const RECONCILE_BACKOFF_BASE_MS: u64 = 1_000;

/// Ceiling for the exponential backoff window.
pub const RECONCILE_BACKOFF_MAX_MS: u64 = 60_000;

// =============================================================================
// SWEEPS
// =============================================================================

/// Delay between submission and the one-shot safety-net sweep.
pub const DEFERRED_SWEEP_DELAY_SECS: u64 = 120;

/// Interval of the periodic stale-job sweep.
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// A job must have been processing at least this long to be swept.
pub const SWEEP_STALE_AFTER_SECS: i64 = 120;

/// Maximum jobs picked up by one periodic sweep.
pub const SWEEP_LIMIT: i64 = 10;

/// Largest staleness window a caller may ask for (ten years).
pub const MAX_STALE_AFTER_SECS: i64 = 10 * 365 * 24 * 60 * 60;

// =============================================================================
// COMPLETION PIPELINE
// =============================================================================

/// Timeout for fetching one artifact from the provider CDN.
pub const ARTIFACT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Timeout for writing one artifact to durable storage.
pub const ARTIFACT_WRITE_TIMEOUT_SECS: u64 = 30;

/// Attempts for the final terminal write after artifacts are resolved.
pub const COMPLETION_WRITE_ATTEMPTS: u32 = 3;

/// Initial delay between terminal write attempts (doubles each attempt).
pub const COMPLETION_WRITE_RETRY_MS: u64 = 250;

/// Default storage root for durable artifact copies.
pub const STORAGE_PATH: &str = "/var/lib/cadence/artifacts";

/// Default public base URL under which stored artifacts are served.
pub const STORAGE_PUBLIC_BASE_URL: &str = "http://localhost:3000/artifacts";

// =============================================================================
// SUBMISSION
// =============================================================================

/// Title assigned when the request does not carry one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 200;

/// Path appended to `CALLBACK_BASE_URL` for provider callbacks.
pub const CALLBACK_PATH: &str = "/api/v1/provider/callback";

/// Rejection message used when the provider supplies none.
pub const REJECTED_DEFAULT_MESSAGE: &str =
    "Content rejected by provider (likely artist names or policy violation)";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP listen port.
pub const SERVER_PORT: u16 = 3000;

/// Default page size for list endpoints.
pub const PAGE_LIMIT: i64 = 50;
