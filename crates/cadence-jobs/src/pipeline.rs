//! Completion pipeline.
//!
//! Applies a classified [`Outcome`] to a job. Recovered artifacts are first
//! copied into owned storage (slow, retry-free, CDN fallback on failure);
//! the resulting records are then committed in one short guarded write that
//! is retried on transient database errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use cadence_core::defaults::{
    ARTIFACT_FETCH_TIMEOUT_SECS, ARTIFACT_WRITE_TIMEOUT_SECS, COMPLETION_WRITE_ATTEMPTS,
    COMPLETION_WRITE_RETRY_MS,
};
use cadence_core::{
    merge_metadata, new_v7, ArtifactFetcher, CatalogEntry, CompletionWrite, Error,
    GeneratedArtifact, GenerationJob, GenerationRepository, GenerationStatus, NewVariant,
    RecoveryMethod, Result, StoredArtifactRecord, TerminalUpdate, WriteOutcome,
};
use cadence_db::file_storage::{artifact_storage_path, compute_content_hash, ArtifactStore};

use crate::classifier::Outcome;

/// Timeouts and retry policy for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline for downloading one artifact, shared by all its candidate URLs.
    pub fetch_timeout: Duration,
    /// Deadline for writing one artifact to storage.
    pub write_timeout: Duration,
    /// Attempts for the final completion write.
    pub write_attempts: u32,
    /// Delay before the second write attempt; doubles per attempt.
    pub write_retry_base: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(ARTIFACT_FETCH_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(ARTIFACT_WRITE_TIMEOUT_SECS),
            write_attempts: COMPLETION_WRITE_ATTEMPTS,
            write_retry_base: Duration::from_millis(COMPLETION_WRITE_RETRY_MS),
        }
    }
}

impl PipelineConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ARTIFACT_FETCH_TIMEOUT_SECS` | `60` |
    /// | `ARTIFACT_WRITE_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch_timeout: env_secs("ARTIFACT_FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout),
            write_timeout: env_secs("ARTIFACT_WRITE_TIMEOUT_SECS")
                .unwrap_or(defaults.write_timeout),
            ..defaults
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_write_retry(mut self, attempts: u32, base: Duration) -> Self {
        self.write_attempts = attempts.max(1);
        self.write_retry_base = base;
        self
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// What applying an outcome did to the job.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The job is now `completed`.
    Completed {
        artifact_count: usize,
        variants_inserted: u64,
        storage_fallbacks: usize,
    },
    /// The job is now `failed`.
    Failed { reason: String },
    /// The job is now `rejected`.
    Rejected { message: String },
    /// Nothing written; the job stays `processing`.
    Unchanged { raw_status: String },
    /// Another resolution path got there first; nothing written.
    AlreadyResolved,
}

/// Shared by the callback receiver and the reconciliation engine.
pub struct CompletionPipeline {
    store: Arc<dyn GenerationRepository>,
    fetcher: Arc<dyn ArtifactFetcher>,
    artifacts: ArtifactStore,
    config: PipelineConfig,
}

impl CompletionPipeline {
    pub fn new(
        store: Arc<dyn GenerationRepository>,
        fetcher: Arc<dyn ArtifactFetcher>,
        artifacts: ArtifactStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            artifacts,
            config,
        }
    }

    /// Apply a classified outcome to `job`.
    ///
    /// `provider_status` is the raw status string the outcome was classified
    /// from; it is kept in the job's metadata on terminal transitions.
    pub async fn apply(
        &self,
        job: &GenerationJob,
        outcome: Outcome,
        method: RecoveryMethod,
        provider_status: &str,
    ) -> Result<Resolution> {
        match outcome {
            Outcome::Recovered { artifacts } => {
                self.complete(job, &artifacts, method, provider_status).await
            }
            Outcome::Failed { reason } => {
                self.resolve_terminal(
                    job,
                    GenerationStatus::Failed,
                    reason,
                    method,
                    provider_status,
                )
                .await
            }
            Outcome::Rejected { policy_message } => {
                self.resolve_terminal(
                    job,
                    GenerationStatus::Rejected,
                    policy_message,
                    method,
                    provider_status,
                )
                .await
            }
            Outcome::StillProcessing { raw_status } => Ok(Resolution::Unchanged { raw_status }),
            Outcome::Unrecognized { raw_value } => Ok(Resolution::Unchanged {
                raw_status: raw_value,
            }),
        }
    }

    /// Persist recovered artifacts and complete the job.
    pub async fn complete(
        &self,
        job: &GenerationJob,
        artifacts: &[GeneratedArtifact],
        method: RecoveryMethod,
        provider_status: &str,
    ) -> Result<Resolution> {
        if job.status.is_terminal() {
            return Ok(Resolution::AlreadyResolved);
        }

        let start = Instant::now();
        let resolved: Vec<StoredArtifactRecord> = join_all(
            artifacts
                .iter()
                .enumerate()
                .map(|(index, artifact)| self.resolve_artifact(job, index, artifact)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let mut records = resolved.into_iter();
        let Some(primary) = records.next() else {
            warn!(
                subsystem = "jobs",
                component = "pipeline",
                job_id = %job.id,
                task_id = %job.provider_task_id,
                offered = artifacts.len(),
                "No artifact could be resolved"
            );
            return self
                .resolve_terminal(
                    job,
                    GenerationStatus::Failed,
                    job.kind.empty_result_message().to_string(),
                    method,
                    provider_status,
                )
                .await;
        };

        let completed_at = Utc::now();
        let variants: Vec<NewVariant> = records
            .enumerate()
            .map(|(position, record)| {
                let mut metadata = record.to_metadata();
                merge_metadata(
                    &mut metadata,
                    &json!({
                        "is_additional_variant": true,
                        "parent_generation_id": job.id,
                        "recovery_method": method.as_str(),
                        "completed_at": completed_at,
                    }),
                );
                NewVariant {
                    id: new_v7(),
                    // Position 0 is the primary, so the first variant is "Variant 2".
                    title: format!("{} (Variant {})", job.title, position + 2),
                    record,
                    metadata,
                }
            })
            .collect();

        let artifact_count = variants.len() + 1;
        let storage_fallbacks = std::iter::once(&primary)
            .chain(variants.iter().map(|v| &v.record))
            .filter(|r| r.is_cdn_fallback())
            .count();

        let mut metadata_patch = primary.to_metadata();
        merge_metadata(
            &mut metadata_patch,
            &json!({
                "recovery_method": method.as_str(),
                "resolved_at": completed_at,
                "provider_status": provider_status,
                "artifact_count": artifact_count,
                "storage_fallbacks": storage_fallbacks,
            }),
        );

        let write = CompletionWrite {
            job_id: job.id,
            owner_id: job.owner_id,
            kind: job.kind,
            provider_task_id: job.provider_task_id.clone(),
            parameters: job.parameters.clone(),
            primary,
            metadata_patch,
            variants,
            catalog_entry: CatalogEntry {
                owner_id: job.owner_id,
                content_type: job.kind.content_type().to_string(),
                content_id: job.id,
            },
            completed_at,
            callback_received_at: callback_stamp(method, completed_at),
        };

        match self.write_completion(&write).await? {
            WriteOutcome::Applied {
                variants_inserted, ..
            } => {
                info!(
                    subsystem = "jobs",
                    component = "pipeline",
                    op = "complete",
                    job_id = %job.id,
                    task_id = %job.provider_task_id,
                    recovery_method = %method,
                    artifact_count,
                    fallback_count = storage_fallbacks,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Generation completed"
                );
                Ok(Resolution::Completed {
                    artifact_count,
                    variants_inserted,
                    storage_fallbacks,
                })
            }
            WriteOutcome::Superseded => {
                debug!(job_id = %job.id, "Completion superseded by another resolution path");
                Ok(Resolution::AlreadyResolved)
            }
        }
    }

    /// Copy one artifact into owned storage, falling back to its CDN URL.
    ///
    /// Inline text that cannot be stored is kept in the record itself. Returns
    /// `None` when the artifact has nothing that could be persisted.
    async fn resolve_artifact(
        &self,
        job: &GenerationJob,
        index: usize,
        artifact: &GeneratedArtifact,
    ) -> Option<StoredArtifactRecord> {
        let path = artifact_storage_path(job.owner_id, job.kind, &job.provider_task_id, index);
        let inline = artifact
            .inline_text
            .as_deref()
            .filter(|t| !t.trim().is_empty());

        let fetched = match inline {
            Some(text) => Ok(text.as_bytes().to_vec()),
            None => self.fetch_first(artifact).await,
        };

        let fallback = |content_hash: Option<String>, size_bytes: Option<i64>, reason: String| {
            let cdn = artifact.cdn_url().map(str::to_string);
            if cdn.is_none() && inline.is_none() {
                return None;
            }
            warn!(
                job_id = %job.id,
                index,
                error = %reason,
                inline = inline.is_some(),
                "Artifact not stored, keeping provider copy"
            );
            Some(StoredArtifactRecord {
                artifact_index: index as i32,
                artifact_url: cdn,
                storage_path: None,
                content_hash,
                size_bytes,
                fallback_reason: Some(reason),
                artifact: artifact.clone(),
            })
        };

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(reason) => return fallback(None, None, reason),
        };

        let hash = compute_content_hash(&bytes);
        let size = bytes.len() as i64;

        match timeout(self.config.write_timeout, self.artifacts.put(&path, &bytes)).await {
            Ok(Ok(stored)) => Some(StoredArtifactRecord {
                artifact_index: index as i32,
                artifact_url: Some(stored.url),
                storage_path: Some(stored.path),
                content_hash: Some(stored.content_hash),
                size_bytes: Some(stored.size_bytes),
                fallback_reason: None,
                artifact: artifact.clone(),
            }),
            Ok(Err(e)) => fallback(
                Some(hash),
                Some(size),
                format!("storage write failed: {}", e),
            ),
            Err(_) => fallback(
                Some(hash),
                Some(size),
                format!(
                    "storage write timed out after {}s",
                    self.config.write_timeout.as_secs()
                ),
            ),
        }
    }

    /// Try each candidate URL in order within one shared deadline; the error
    /// names the last failure.
    async fn fetch_first(
        &self,
        artifact: &GeneratedArtifact,
    ) -> std::result::Result<Vec<u8>, String> {
        let deadline = Instant::now() + self.config.fetch_timeout;
        let mut last_error = "artifact has no download URL".to_string();
        for url in artifact.urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            match timeout_at(deadline, self.fetcher.fetch(url)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) => last_error = format!("download failed: {}", e),
                Err(_) => {
                    return Err(format!(
                        "download timed out after {}s",
                        self.config.fetch_timeout.as_secs()
                    ))
                }
            }
        }
        Err(last_error)
    }

    /// Commit the completion, retrying transient database failures.
    async fn write_completion(&self, write: &CompletionWrite) -> Result<WriteOutcome> {
        let mut delay = self.config.write_retry_base;
        let mut attempt = 1;
        loop {
            match self.store.complete(write).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable_database() && attempt < self.config.write_attempts => {
                    warn!(
                        subsystem = "jobs",
                        component = "pipeline",
                        job_id = %write.job_id,
                        attempt,
                        error = %e,
                        "Completion write failed, retrying"
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "pipeline",
                        job_id = %write.job_id,
                        attempt,
                        error = %e,
                        "Completion write failed after artifacts were resolved"
                    );
                    return Err(Error::Persistence {
                        job_id: write.job_id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn resolve_terminal(
        &self,
        job: &GenerationJob,
        status: GenerationStatus,
        message: String,
        method: RecoveryMethod,
        provider_status: &str,
    ) -> Result<Resolution> {
        if job.status.is_terminal() {
            return Ok(Resolution::AlreadyResolved);
        }

        let now = Utc::now();
        let update = TerminalUpdate {
            job_id: job.id,
            status,
            error_message: message.clone(),
            metadata_patch: json!({
                "recovery_method": method.as_str(),
                "resolved_at": now,
                "provider_status": provider_status,
            }),
            completed_at: now,
            callback_received_at: callback_stamp(method, now),
        };

        if !self.store.resolve_terminal(&update).await? {
            return Ok(Resolution::AlreadyResolved);
        }

        info!(
            subsystem = "jobs",
            component = "pipeline",
            op = "resolve_terminal",
            job_id = %job.id,
            task_id = %job.provider_task_id,
            status = %status,
            recovery_method = %method,
            error = %message,
            "Generation resolved"
        );

        Ok(match status {
            GenerationStatus::Rejected => Resolution::Rejected { message },
            _ => Resolution::Failed { reason: message },
        })
    }
}

fn callback_stamp(method: RecoveryMethod, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (method == RecoveryMethod::Callback).then_some(at)
}
