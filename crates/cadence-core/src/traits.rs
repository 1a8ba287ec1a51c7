//! Core traits for repositories, the generation provider and artifact fetching.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ProviderResult, Result};
use crate::models::*;

/// Repository for generation job rows.
///
/// Every terminal write is guarded on the current status so that racing
/// resolution paths produce exactly one winner.
#[async_trait]
pub trait GenerationRepository: Send + Sync {
    /// Insert a freshly submitted job in `pending`.
    async fn insert(&self, req: NewGenerationJob) -> Result<GenerationJob>;

    /// Promote `pending` to `processing`. Returns false if the job was not pending.
    async fn mark_processing(&self, id: Uuid) -> Result<bool>;

    /// Fetch a job by id.
    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>>;

    /// Fetch the primary (non-variant) row for a provider task.
    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<GenerationJob>>;

    /// List variant rows of a primary job, ordered by artifact index.
    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<GenerationJob>>;

    /// List `processing` primary jobs matching the filter, oldest first.
    async fn list_processing(&self, filter: &ReconcileFilter) -> Result<Vec<GenerationJob>>;


    /// Atomically complete the primary row, insert variants (if absent) and the catalog entry.
    async fn complete(&self, write: &CompletionWrite) -> Result<WriteOutcome>;

    /// Guarded transition into `failed` or `rejected`. Returns false if superseded.
    async fn resolve_terminal(&self, update: &TerminalUpdate) -> Result<bool>;
}

/// Read side of the content catalog (writes happen inside `GenerationRepository::complete`).
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Whether a catalog entry exists for the content id.
    async fn contains(&self, content_id: Uuid) -> Result<bool>;

    /// List an owner's entries, newest first.
    async fn list_for_owner(&self, owner_id: Uuid, limit: i64) -> Result<Vec<CatalogEntry>>;
}

/// Debug log of raw provider callbacks.
#[async_trait]
pub trait CallbackLogRepository: Send + Sync {
    async fn record(&self, record: &CallbackRecord) -> Result<Uuid>;
}

/// The third-party generation provider.
///
/// Implementations never retry; callers own the retry policy.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Create a provider task and return its opaque id.
    async fn submit(&self, kind: JobKind, params: &JsonValue) -> ProviderResult<String>;

    /// Fetch the current status of a task.
    async fn task_status(&self, kind: JobKind, task_id: &str) -> ProviderResult<RawTaskStatus>;

    /// Remaining account credits.
    async fn credits(&self) -> ProviderResult<i64>;
}

/// Downloads artifact bytes from a provider CDN URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
