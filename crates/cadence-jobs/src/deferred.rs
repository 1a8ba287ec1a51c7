//! One-shot safety-net sweep scheduled after each submission.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

use cadence_core::{RecoveryMethod, ReconcileFilter};

use crate::reconcile::{BatchReport, ReconciliationEngine};

/// Reconciles a single job once after a fixed delay, in case its callback
/// never arrives.
#[derive(Clone)]
pub struct DeferredSweeper {
    engine: ReconciliationEngine,
    delay: Duration,
}

impl DeferredSweeper {
    pub fn new(engine: ReconciliationEngine, delay: Duration) -> Self {
        Self { engine, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Spawn the sweep for `job_id`. The handle resolves to the report, or
    /// `None` when the sweep could not load the job.
    pub fn schedule(&self, job_id: Uuid) -> JoinHandle<Option<BatchReport>> {
        let engine = self.engine.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            sleep(delay).await;
            match engine
                .reconcile_all(&ReconcileFilter::for_job(job_id), RecoveryMethod::DeferredSweep)
                .await
            {
                Ok(report) => {
                    info!(
                        subsystem = "jobs",
                        component = "deferred_sweep",
                        job_id = %job_id,
                        total = report.total_processed,
                        successful = report.successful,
                        failed = report.failed,
                        still_processing = report.still_processing,
                        errors = report.errors,
                        "Deferred sweep finished"
                    );
                    Some(report)
                }
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "deferred_sweep",
                        job_id = %job_id,
                        error = %e,
                        "Deferred sweep failed"
                    );
                    None
                }
            }
        })
    }
}
