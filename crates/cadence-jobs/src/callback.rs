//! Callback receiver: resolves jobs from provider completion notices.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use cadence_core::{
    CallbackLogRepository, CallbackRecord, Error, GenerationRepository, GenerationStatus,
    RecoveryMethod, Result,
};
use cadence_provider::ProviderCallback;

use crate::classifier::{classify, Outcome};
use crate::pipeline::{CompletionPipeline, Resolution};

/// What a callback did.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackDisposition {
    /// A stage notice (`text`, `first`); nothing to resolve yet.
    Intermediate,
    /// The job was already terminal; the callback was a no-op.
    AlreadyResolved { status: GenerationStatus },
    /// The provider reported a status outside the kind's vocabulary.
    Unrecognized { raw_value: String },
    /// The callback was classified and applied.
    Applied(Resolution),
}

pub struct CallbackReceiver {
    store: Arc<dyn GenerationRepository>,
    log: Arc<dyn CallbackLogRepository>,
    pipeline: Arc<CompletionPipeline>,
}

impl CallbackReceiver {
    pub fn new(
        store: Arc<dyn GenerationRepository>,
        log: Arc<dyn CallbackLogRepository>,
        pipeline: Arc<CompletionPipeline>,
    ) -> Self {
        Self {
            store,
            log,
            pipeline,
        }
    }

    /// Handle one raw callback body.
    ///
    /// The body is logged before anything else. Malformed bodies are
    /// `InvalidInput`, unknown task ids `NotFound`; every other failure
    /// propagates so the provider sees an error and may retry.
    pub async fn on_callback(&self, body: &JsonValue) -> Result<CallbackDisposition> {
        let received_at = Utc::now();
        let parsed = ProviderCallback::parse(body);

        let (task_id, callback_type) = match &parsed {
            Ok(cb) => (Some(cb.task_id.clone()), cb.callback_type.clone()),
            Err(_) => (None, None),
        };
        self.log
            .record(&CallbackRecord {
                task_id,
                callback_type,
                payload: body.clone(),
                received_at,
            })
            .await?;

        let callback = parsed.map_err(|e| Error::InvalidInput(e.to_string()))?;

        let mut job = self
            .store
            .find_by_task_id(&callback.task_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("generation for provider task {}", callback.task_id))
            })?;

        if callback.is_intermediate() {
            debug!(
                job_id = %job.id,
                task_id = %callback.task_id,
                callback_type = ?callback.callback_type,
                "Intermediate callback"
            );
            return Ok(CallbackDisposition::Intermediate);
        }

        if job.status.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Callback for resolved job ignored");
            return Ok(CallbackDisposition::AlreadyResolved { status: job.status });
        }

        // The provider can answer before the submission path has promoted the row.
        if job.status == GenerationStatus::Pending {
            self.store.mark_processing(job.id).await?;
            job = self
                .store
                .get(job.id)
                .await?
                .ok_or(Error::JobNotFound(job.id))?;
            if job.status.is_terminal() {
                return Ok(CallbackDisposition::AlreadyResolved { status: job.status });
            }
        }

        let raw = callback.to_raw_status(job.kind);
        let outcome = classify(&raw);

        if let Outcome::Unrecognized { raw_value } = &outcome {
            warn!(
                subsystem = "jobs",
                component = "callback",
                job_id = %job.id,
                task_id = %callback.task_id,
                provider_status = %raw_value,
                "Callback carried an unrecognized status"
            );
            return Ok(CallbackDisposition::Unrecognized {
                raw_value: raw_value.clone(),
            });
        }

        let resolution = self
            .pipeline
            .apply(&job, outcome, RecoveryMethod::Callback, &raw.status)
            .await?;

        info!(
            subsystem = "jobs",
            component = "callback",
            job_id = %job.id,
            task_id = %callback.task_id,
            provider_status = %raw.status,
            resolution = ?resolution,
            "Callback processed"
        );

        Ok(CallbackDisposition::Applied(resolution))
    }
}
