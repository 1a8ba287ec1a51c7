//! Submission gateway: validate, submit to the provider, record the job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use cadence_core::defaults::{CALLBACK_PATH, DEFAULT_TITLE, TITLE_MAX_CHARS};
use cadence_core::{
    Error, GenerationJob, GenerationProvider, GenerationRepository, JobKind, NewGenerationJob,
    Result,
};

use crate::deferred::DeferredSweeper;
use crate::reconcile::BatchReport;

/// Parameter name the provider reads the callback URL from.
const CALLBACK_PARAM: &str = "callBackUrl";

/// A caller's request to start a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitGenerationRequest {
    pub owner_id: Uuid,
    pub kind: JobKind,
    #[serde(default)]
    pub title: Option<String>,
    /// Provider parameters, passed through as-is (plus the callback URL).
    #[serde(default)]
    pub parameters: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Public base URL the provider can reach; callbacks are disabled when unset.
    pub callback_base_url: Option<String>,
}

impl GatewayConfig {
    /// Reads `CALLBACK_BASE_URL`.
    pub fn from_env() -> Self {
        Self {
            callback_base_url: std::env::var("CALLBACK_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn with_callback_base_url(mut self, url: impl Into<String>) -> Self {
        self.callback_base_url = Some(url.into());
        self
    }

    pub fn callback_url(&self) -> Option<String> {
        self.callback_base_url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), CALLBACK_PATH))
    }
}

/// Parameter keys the provider requires per kind. Each inner slice is one
/// acceptable set; a request must satisfy at least one.
fn required_params(kind: JobKind) -> &'static [&'static [&'static str]] {
    match kind {
        JobKind::Music => &[&["prompt"]],
        JobKind::MusicVideo => &[&["taskId", "audioId"]],
        JobKind::Lyrics => &[&["prompt"]],
        JobKind::VocalSeparation => &[&["taskId", "audioId"], &["uploadUrl"]],
    }
}

/// Validate a request, returning the normalized title and parameters.
pub fn validate(req: &SubmitGenerationRequest) -> Result<(String, JsonValue)> {
    if req.owner_id.is_nil() {
        return Err(Error::InvalidInput("owner_id is required".to_string()));
    }

    let title = match req.title.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_TITLE.to_string(),
        Some(t) if t.chars().count() > TITLE_MAX_CHARS => {
            return Err(Error::InvalidInput(format!(
                "title exceeds {} characters",
                TITLE_MAX_CHARS
            )))
        }
        Some(t) => t.to_string(),
    };

    let params = match &req.parameters {
        JsonValue::Object(map) => map,
        JsonValue::Null => {
            return Err(Error::InvalidInput("parameters are required".to_string()))
        }
        _ => return Err(Error::InvalidInput("parameters must be an object".to_string())),
    };

    let present = |key: &str| match params.get(key) {
        Some(JsonValue::String(s)) => !s.trim().is_empty(),
        Some(JsonValue::Null) | None => false,
        Some(_) => true,
    };
    let options = required_params(req.kind);
    if !options.iter().any(|set| set.iter().all(|k| present(*k))) {
        let expected: Vec<String> = options.iter().map(|set| set.join(" + ")).collect();
        return Err(Error::InvalidInput(format!(
            "{} generation requires {}",
            req.kind,
            expected.join(" or ")
        )));
    }

    Ok((title, req.parameters.clone()))
}

/// Front door for new generations.
pub struct SubmissionGateway {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn GenerationRepository>,
    sweeper: Option<DeferredSweeper>,
    config: GatewayConfig,
}

impl SubmissionGateway {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn GenerationRepository>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            provider,
            store,
            sweeper: None,
            config,
        }
    }

    /// Schedule a deferred sweep after every successful submission.
    pub fn with_deferred_sweeper(mut self, sweeper: DeferredSweeper) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Submit a generation and return the `processing` job.
    pub async fn submit(&self, req: SubmitGenerationRequest) -> Result<GenerationJob> {
        let (job, _sweep) = self.submit_tracked(req).await?;
        Ok(job)
    }

    /// Like [`submit`](Self::submit), also returning the deferred sweep handle.
    pub async fn submit_tracked(
        &self,
        req: SubmitGenerationRequest,
    ) -> Result<(GenerationJob, Option<JoinHandle<Option<BatchReport>>>)> {
        let (title, mut params) = validate(&req)?;

        if let (Some(url), Some(map)) = (self.config.callback_url(), params.as_object_mut()) {
            map.insert(CALLBACK_PARAM.to_string(), JsonValue::String(url));
        }

        let task_id = self.provider.submit(req.kind, &params).await.map_err(|e| {
            warn!(
                subsystem = "jobs",
                component = "gateway",
                owner_id = %req.owner_id,
                job_kind = %req.kind,
                error_code = e.code,
                error = %e.message,
                "Provider refused submission"
            );
            Error::Provider(e)
        })?;

        let job = self
            .store
            .insert(NewGenerationJob {
                owner_id: req.owner_id,
                kind: req.kind,
                provider_task_id: task_id.clone(),
                title,
                parameters: params,
            })
            .await?;

        self.store.mark_processing(job.id).await?;
        let job = self
            .store
            .get(job.id)
            .await?
            .ok_or(Error::JobNotFound(job.id))?;

        info!(
            subsystem = "jobs",
            component = "gateway",
            op = "submit",
            job_id = %job.id,
            task_id = %task_id,
            job_kind = %job.kind,
            owner_id = %job.owner_id,
            "Generation submitted"
        );

        let sweep = self.sweeper.as_ref().map(|s| s.schedule(job.id));
        Ok((job, sweep))
    }
}
