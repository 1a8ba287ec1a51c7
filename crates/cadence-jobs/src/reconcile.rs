//! Batch reconciliation of `processing` jobs against the provider.
//!
//! Jobs are loaded with a [`ReconcileFilter`], split into batches and each
//! batch is resolved concurrently. A failure or panic in one job never aborts
//! the batch; it becomes an `error` entry in the [`BatchReport`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::defaults::{
    RECONCILE_BATCH_DELAY_MS, RECONCILE_BATCH_SIZE, RECONCILE_STATUS_TIMEOUT_SECS,
};
use cadence_core::{
    Error, GenerationJob, GenerationProvider, GenerationRepository, GenerationStatus, JobKind,
    RecoveryMethod, ReconcileFilter, Result,
};

use crate::backoff::{BackoffConfig, KindBackoff};
use crate::classifier::{classify, Outcome};
use crate::pipeline::{CompletionPipeline, Resolution};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Jobs resolved concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Deadline for one provider status query. The pipeline that follows is
    /// bounded by its own fetch and write deadlines.
    pub status_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: RECONCILE_BATCH_SIZE,
            batch_delay: Duration::from_millis(RECONCILE_BATCH_DELAY_MS),
            status_timeout: Duration::from_secs(RECONCILE_STATUS_TIMEOUT_SECS),
            backoff: BackoffConfig::default(),
        }
    }
}

impl ReconcileConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RECONCILE_BATCH_SIZE` | `5` |
    /// | `RECONCILE_BATCH_DELAY_MS` | `200` |
    /// | `RECONCILE_STATUS_TIMEOUT_SECS` | `60` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());
        Self {
            batch_size: parse("RECONCILE_BATCH_SIZE")
                .map(|v| (v as usize).max(1))
                .unwrap_or(defaults.batch_size),
            batch_delay: parse("RECONCILE_BATCH_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_delay),
            status_timeout: parse("RECONCILE_STATUS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_timeout),
            backoff: BackoffConfig::from_env(),
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Per-job result status in a [`BatchReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReconcileStatus {
    Recovered,
    Failed,
    StillProcessing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReconcileResult {
    pub job_id: Uuid,
    pub task_id: String,
    pub kind: JobKind,
    pub status: JobReconcileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub artifact_count: usize,
}

impl JobReconcileResult {
    fn new(job: &GenerationJob, status: JobReconcileStatus, message: Option<String>) -> Self {
        Self {
            job_id: job.id,
            task_id: job.provider_task_id.clone(),
            kind: job.kind,
            status,
            message,
            artifact_count: 0,
        }
    }
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub still_processing: usize,
    pub errors: usize,
    pub results: Vec<JobReconcileResult>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn push(&mut self, result: JobReconcileResult) {
        self.total_processed += 1;
        match result.status {
            JobReconcileStatus::Recovered => self.successful += 1,
            JobReconcileStatus::Failed => self.failed += 1,
            JobReconcileStatus::StillProcessing => self.still_processing += 1,
            JobReconcileStatus::Error => self.errors += 1,
        }
        self.results.push(result);
    }
}

/// Resolves `processing` jobs by polling the provider.
///
/// Cheap to clone; clones share the backoff state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn GenerationRepository>,
    pipeline: Arc<CompletionPipeline>,
    config: ReconcileConfig,
    backoff: Arc<KindBackoff>,
}

impl ReconciliationEngine {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn GenerationRepository>,
        pipeline: Arc<CompletionPipeline>,
        config: ReconcileConfig,
    ) -> Self {
        let backoff = Arc::new(KindBackoff::new(config.backoff.clone()));
        Self {
            provider,
            store,
            pipeline,
            config,
            backoff,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile every `processing` job matching `filter`.
    ///
    /// Returns `Err` only when the jobs could not be loaded; per-job failures
    /// are reported inside the [`BatchReport`].
    pub async fn reconcile_all(
        &self,
        filter: &ReconcileFilter,
        method: RecoveryMethod,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let jobs = self.store.list_processing(filter).await?;
        let mut report = BatchReport::default();

        info!(
            subsystem = "jobs",
            component = "reconcile",
            op = "reconcile_all",
            recovery_method = %method,
            job_count = jobs.len(),
            batch_size = self.config.batch_size,
            "Starting reconciliation"
        );

        for (batch_no, batch) in jobs.chunks(self.config.batch_size.max(1)).enumerate() {
            if batch_no > 0 {
                sleep(self.config.batch_delay).await;
            }
            debug!(batch = batch_no, size = batch.len(), "Reconciling batch");
            for result in self.reconcile_batch(batch, method).await {
                report.push(result);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            subsystem = "jobs",
            component = "reconcile",
            op = "reconcile_all",
            recovery_method = %method,
            total = report.total_processed,
            successful = report.successful,
            failed = report.failed,
            still_processing = report.still_processing,
            errors = report.errors,
            duration_ms = report.duration_ms,
            "Reconciliation finished"
        );

        Ok(report)
    }

    /// Reconcile a single job by id.
    ///
    /// Unknown ids are an error; a job that is no longer `processing`
    /// yields an empty report.
    pub async fn reconcile_one(&self, job_id: Uuid, method: RecoveryMethod) -> Result<BatchReport> {
        if self.store.get(job_id).await?.is_none() {
            return Err(Error::JobNotFound(job_id));
        }
        self.reconcile_all(&ReconcileFilter::for_job(job_id), method)
            .await
    }

    /// Settle-all over one batch; results come back in input order.
    async fn reconcile_batch(
        &self,
        batch: &[GenerationJob],
        method: RecoveryMethod,
    ) -> Vec<JobReconcileResult> {
        let mut tasks = JoinSet::new();
        for (index, job) in batch.iter().cloned().enumerate() {
            let engine = self.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(engine.reconcile_job(&job, method))
                    .catch_unwind()
                    .await;
                let result = outcome.unwrap_or_else(|_| {
                    JobReconcileResult::new(
                        &job,
                        JobReconcileStatus::Error,
                        Some("reconciliation panicked".to_string()),
                    )
                });
                (index, result)
            });
        }

        let mut slots: Vec<Option<JobReconcileResult>> = vec![None; batch.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Reconciliation task aborted"),
            }
        }

        slots
            .into_iter()
            .zip(batch)
            .map(|(slot, job)| {
                slot.unwrap_or_else(|| {
                    JobReconcileResult::new(
                        job,
                        JobReconcileStatus::Error,
                        Some("reconciliation task aborted".to_string()),
                    )
                })
            })
            .collect()
    }

    async fn reconcile_job(
        &self,
        job: &GenerationJob,
        method: RecoveryMethod,
    ) -> JobReconcileResult {
        if let Some(remaining) = self.backoff.remaining(job.kind) {
            return JobReconcileResult::new(
                job,
                JobReconcileStatus::StillProcessing,
                Some(format!(
                    "provider backoff active for {} ({} ms remaining)",
                    job.kind,
                    remaining.as_millis()
                )),
            );
        }

        self.resolve(job, method).await
    }

    async fn resolve(&self, job: &GenerationJob, method: RecoveryMethod) -> JobReconcileResult {
        let query = self.provider.task_status(job.kind, &job.provider_task_id);
        let answer = match timeout(self.config.status_timeout, query).await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(
                    job_id = %job.id,
                    task_id = %job.provider_task_id,
                    "Provider status query timed out"
                );
                return JobReconcileResult::new(
                    job,
                    JobReconcileStatus::StillProcessing,
                    Some(format!(
                        "provider status query timed out after {}s",
                        self.config.status_timeout.as_secs()
                    )),
                );
            }
        };

        let raw = match answer {
            Ok(raw) => {
                self.backoff.record_success(job.kind);
                raw
            }
            Err(e) => {
                if e.is_transport() {
                    self.backoff.record_transport_error(job.kind);
                }
                warn!(
                    subsystem = "jobs",
                    component = "reconcile",
                    job_id = %job.id,
                    task_id = %job.provider_task_id,
                    error_code = e.code,
                    error = %e,
                    "Provider status query failed"
                );
                let status = if e.is_timeout() {
                    JobReconcileStatus::StillProcessing
                } else {
                    JobReconcileStatus::Error
                };
                return JobReconcileResult::new(job, status, Some(e.to_string()));
            }
        };

        let outcome = classify(&raw);
        if let Outcome::Unrecognized { raw_value } = &outcome {
            warn!(
                subsystem = "jobs",
                component = "reconcile",
                job_id = %job.id,
                task_id = %job.provider_task_id,
                provider_status = %raw_value,
                "Unrecognized provider status"
            );
            return JobReconcileResult::new(
                job,
                JobReconcileStatus::Error,
                Some(format!("unrecognized provider status '{}'", raw_value)),
            );
        }

        match self.pipeline.apply(job, outcome, method, &raw.status).await {
            Ok(Resolution::Completed { artifact_count, .. }) => JobReconcileResult {
                artifact_count,
                ..JobReconcileResult::new(job, JobReconcileStatus::Recovered, None)
            },
            Ok(Resolution::Failed { reason }) => {
                JobReconcileResult::new(job, JobReconcileStatus::Failed, Some(reason))
            }
            Ok(Resolution::Rejected { message }) => {
                JobReconcileResult::new(job, JobReconcileStatus::Failed, Some(message))
            }
            Ok(Resolution::Unchanged { raw_status }) => JobReconcileResult::new(
                job,
                JobReconcileStatus::StillProcessing,
                Some(format!("provider status {}", raw_status)),
            ),
            Ok(Resolution::AlreadyResolved) => self.concurrently_resolved(job).await,
            Err(e) => JobReconcileResult::new(job, JobReconcileStatus::Error, Some(e.to_string())),
        }
    }

    /// Report a job another path resolved while this one was working on it.
    async fn concurrently_resolved(&self, job: &GenerationJob) -> JobReconcileResult {
        let message = Some("resolved concurrently by another path".to_string());
        match self.store.get(job.id).await {
            Ok(Some(current)) => match current.status {
                GenerationStatus::Completed => {
                    JobReconcileResult::new(job, JobReconcileStatus::Recovered, message)
                }
                GenerationStatus::Failed | GenerationStatus::Rejected => {
                    JobReconcileResult::new(job, JobReconcileStatus::Failed, message)
                }
                GenerationStatus::Pending | GenerationStatus::Processing => {
                    JobReconcileResult::new(job, JobReconcileStatus::StillProcessing, message)
                }
            },
            Ok(None) => JobReconcileResult::new(
                job,
                JobReconcileStatus::Error,
                Some(format!("job {} disappeared during reconciliation", job.id)),
            ),
            Err(e) => JobReconcileResult::new(job, JobReconcileStatus::Error, Some(e.to_string())),
        }
    }
}
