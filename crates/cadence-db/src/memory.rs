//! In-memory repositories and storage backend.
//!
//! Mirrors the Postgres semantics the engine relies on (status guards, the
//! variant de-dup key, single-entry catalog) so the reconciliation engine can be
//! exercised without a database.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_db::memory::{MemoryStorageBackend, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let storage = MemoryStorageBackend::new().with_failing_writes();
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use cadence_core::{
    merge_metadata, new_v7, CallbackLogRepository, CallbackRecord, CatalogEntry,
    CatalogRepository, CompletionWrite, Error, GenerationJob, GenerationRepository,
    GenerationStatus, NewGenerationJob, ReconcileFilter, Result, TerminalUpdate, WriteOutcome,
};

use crate::file_storage::StorageBackend;

#[derive(Default)]
struct State {
    jobs: Vec<GenerationJob>,
    catalog: Vec<CatalogEntry>,
    callbacks: Vec<CallbackRecord>,
    failing_completions: u32,
    completion_attempts: u32,
}

/// In-memory generation, catalog and callback-log store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    /// Make the next `n` calls to `complete` fail with a transient database error.
    pub fn fail_next_completions(&self, n: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_completions = n;
        }
    }

    /// Number of times `complete` has been called.
    pub fn completion_attempts(&self) -> u32 {
        self.state.lock().map(|s| s.completion_attempts).unwrap_or(0)
    }

    /// Snapshot of every row, primaries and variants.
    pub fn jobs(&self) -> Vec<GenerationJob> {
        self.state.lock().map(|s| s.jobs.clone()).unwrap_or_default()
    }

    pub fn catalog_entries(&self) -> Vec<CatalogEntry> {
        self.state
            .lock()
            .map(|s| s.catalog.clone())
            .unwrap_or_default()
    }

    pub fn callback_records(&self) -> Vec<CallbackRecord> {
        self.state
            .lock()
            .map(|s| s.callbacks.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationRepository for MemoryStore {
    async fn insert(&self, req: NewGenerationJob) -> Result<GenerationJob> {
        let mut state = self.lock()?;
        if state
            .jobs
            .iter()
            .any(|j| !j.is_additional_variant && j.provider_task_id == req.provider_task_id)
        {
            return Err(Error::InvalidInput(format!(
                "duplicate provider task id {}",
                req.provider_task_id
            )));
        }

        let job = GenerationJob {
            id: new_v7(),
            owner_id: req.owner_id,
            kind: req.kind,
            provider_task_id: req.provider_task_id,
            status: GenerationStatus::Pending,
            title: req.title,
            parameters: req.parameters,
            primary_artifact_url: None,
            storage_path: None,
            artifact_index: None,
            error_message: None,
            metadata: serde_json::json!({}),
            is_additional_variant: false,
            parent_generation_id: None,
            callback_received_at: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == GenerationStatus::Pending)
        {
            Some(job) => {
                job.status = GenerationStatus::Processing;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        Ok(self.lock()?.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<GenerationJob>> {
        Ok(self
            .lock()?
            .jobs
            .iter()
            .find(|j| !j.is_additional_variant && j.provider_task_id == task_id)
            .cloned())
    }

    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<GenerationJob>> {
        let mut variants: Vec<GenerationJob> = self
            .lock()?
            .jobs
            .iter()
            .filter(|j| j.is_additional_variant && j.parent_generation_id == Some(parent_id))
            .cloned()
            .collect();
        variants.sort_by_key(|j| j.artifact_index);
        Ok(variants)
    }

    async fn list_processing(&self, filter: &ReconcileFilter) -> Result<Vec<GenerationJob>> {
        let now = Utc::now();
        let mut jobs: Vec<GenerationJob> = self
            .lock()?
            .jobs
            .iter()
            .filter(|j| j.status == GenerationStatus::Processing && filter.matches(j, now))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        if let Some(limit) = filter.limit {
            jobs.truncate(limit.max(0) as usize);
        }
        Ok(jobs)
    }

    async fn complete(&self, write: &CompletionWrite) -> Result<WriteOutcome> {
        let mut state = self.lock()?;
        state.completion_attempts += 1;
        if state.failing_completions > 0 {
            state.failing_completions -= 1;
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }

        let Some(primary) = state
            .jobs
            .iter_mut()
            .find(|j| j.id == write.job_id && j.status == GenerationStatus::Processing)
        else {
            return Ok(WriteOutcome::Superseded);
        };

        primary.status = GenerationStatus::Completed;
        primary.primary_artifact_url = write.primary.artifact_url.clone();
        primary.storage_path = write.primary.storage_path.clone();
        primary.artifact_index = Some(write.primary.artifact_index);
        primary.error_message = None;
        merge_metadata(&mut primary.metadata, &write.metadata_patch);
        primary.completed_at = Some(write.completed_at);
        if primary.callback_received_at.is_none() {
            primary.callback_received_at = write.callback_received_at;
        }

        let mut variants_inserted = 0;
        for variant in &write.variants {
            let exists = state.jobs.iter().any(|j| {
                j.is_additional_variant
                    && j.provider_task_id == write.provider_task_id
                    && j.artifact_index == Some(variant.record.artifact_index)
            });
            if exists {
                continue;
            }
            state.jobs.push(GenerationJob {
                id: variant.id,
                owner_id: write.owner_id,
                kind: write.kind,
                provider_task_id: write.provider_task_id.clone(),
                status: GenerationStatus::Completed,
                title: variant.title.clone(),
                parameters: write.parameters.clone(),
                primary_artifact_url: variant.record.artifact_url.clone(),
                storage_path: variant.record.storage_path.clone(),
                artifact_index: Some(variant.record.artifact_index),
                error_message: None,
                metadata: variant.metadata.clone(),
                is_additional_variant: true,
                parent_generation_id: Some(write.job_id),
                callback_received_at: None,
                created_at: write.completed_at,
                completed_at: Some(write.completed_at),
            });
            variants_inserted += 1;
        }

        let catalog_created = !state.catalog.iter().any(|c| {
            c.content_type == write.catalog_entry.content_type
                && c.content_id == write.catalog_entry.content_id
        });
        if catalog_created {
            state.catalog.push(write.catalog_entry.clone());
        }

        Ok(WriteOutcome::Applied {
            variants_inserted,
            catalog_created,
        })
    }

    async fn resolve_terminal(&self, update: &TerminalUpdate) -> Result<bool> {
        if !matches!(
            update.status,
            GenerationStatus::Failed | GenerationStatus::Rejected
        ) {
            return Err(Error::InvalidInput(format!(
                "resolve_terminal only accepts failed or rejected, got {}",
                update.status
            )));
        }

        let mut state = self.lock()?;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == update.job_id && j.status == GenerationStatus::Processing)
        {
            Some(job) => {
                job.status = update.status;
                job.error_message = Some(update.error_message.clone());
                merge_metadata(&mut job.metadata, &update.metadata_patch);
                job.completed_at = Some(update.completed_at);
                if job.callback_received_at.is_none() {
                    job.callback_received_at = update.callback_received_at;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn contains(&self, content_id: Uuid) -> Result<bool> {
        Ok(self.lock()?.catalog.iter().any(|c| c.content_id == content_id))
    }

    async fn list_for_owner(&self, owner_id: Uuid, limit: i64) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .lock()?
            .catalog
            .iter()
            .rev()
            .filter(|c| c.owner_id == owner_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CallbackLogRepository for MemoryStore {
    async fn record(&self, record: &CallbackRecord) -> Result<Uuid> {
        self.lock()?.callbacks.push(record.clone());
        Ok(new_v7())
    }
}

/// In-memory storage backend with optional write-failure injection.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_writes: bool,
    fail_paths_containing: Option<String>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails.
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Writes to paths containing `fragment` fail.
    pub fn with_failing_paths(mut self, fragment: impl Into<String>) -> Self {
        self.fail_paths_containing = Some(fragment.into());
        self
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| Error::Internal("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let injected = self.fail_writes
            || self
                .fail_paths_containing
                .as_deref()
                .is_some_and(|f| path.contains(f));
        if injected {
            return Err(Error::Storage(format!("write rejected for {}", path)));
        }
        self.lock()?.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }
}
