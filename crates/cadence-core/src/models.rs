//! Core data models for generation jobs, artifacts and catalog entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults::MAX_STALE_AFTER_SECS;

// =============================================================================
// STATUS & KIND
// =============================================================================

/// Lifecycle status of a generation job.
///
/// Transitions only move forward: `pending → processing → {completed, failed, rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GenerationStatus::Pending),
            "processing" => Some(GenerationStatus::Processing),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            "rejected" => Some(GenerationStatus::Rejected),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Completed | GenerationStatus::Failed | GenerationStatus::Rejected
        )
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family of provider job. Each kind has its own endpoints and status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Text-to-music generation.
    Music,
    /// Music video derived from a completed music task.
    MusicVideo,
    /// Lyrics generation (inline text artifacts).
    Lyrics,
    /// Vocal/instrumental stem separation of an existing track.
    VocalSeparation,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Music,
        JobKind::MusicVideo,
        JobKind::Lyrics,
        JobKind::VocalSeparation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Music => "music",
            JobKind::MusicVideo => "music_video",
            JobKind::Lyrics => "lyrics",
            JobKind::VocalSeparation => "vocal_separation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "music" => Some(JobKind::Music),
            "music_video" => Some(JobKind::MusicVideo),
            "lyrics" => Some(JobKind::Lyrics),
            "vocal_separation" => Some(JobKind::VocalSeparation),
            _ => None,
        }
    }

    /// Content type registered in the catalog for completed jobs.
    pub fn content_type(&self) -> &'static str {
        match self {
            JobKind::Music => "music_tracks",
            JobKind::MusicVideo => "music_videos",
            JobKind::Lyrics => "lyrics",
            JobKind::VocalSeparation => "audio_stems",
        }
    }

    /// Directory segment used for stored artifacts.
    pub fn storage_dir(&self) -> &'static str {
        match self {
            JobKind::Music => "music",
            JobKind::MusicVideo => "video",
            JobKind::Lyrics => "lyrics",
            JobKind::VocalSeparation => "stems",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            JobKind::Music | JobKind::VocalSeparation => "mp3",
            JobKind::MusicVideo => "mp4",
            JobKind::Lyrics => "txt",
        }
    }

    /// Failure message when a success produced nothing usable.
    pub fn empty_result_message(&self) -> &'static str {
        match self {
            JobKind::Music => "no audio files could be processed",
            JobKind::MusicVideo => "no video files could be processed",
            JobKind::Lyrics => "no lyrics could be processed",
            JobKind::VocalSeparation => "no audio stems could be processed",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which resolution path drove a job to its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMethod {
    Callback,
    AdminSweep,
    DeferredSweep,
    ScheduledSweep,
    Cli,
}

impl RecoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryMethod::Callback => "callback",
            RecoveryMethod::AdminSweep => "admin_sweep",
            RecoveryMethod::DeferredSweep => "deferred_sweep",
            RecoveryMethod::ScheduledSweep => "scheduled_sweep",
            RecoveryMethod::Cli => "cli",
        }
    }
}

impl std::fmt::Display for RecoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// GENERATION JOBS
// =============================================================================

/// One generation job row: a provider task's primary record, or a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub provider_task_id: String,
    pub status: GenerationStatus,
    pub title: String,
    pub parameters: JsonValue,
    pub primary_artifact_url: Option<String>,
    pub storage_path: Option<String>,
    /// Position of this row's artifact in the provider response.
    pub artifact_index: Option<i32>,
    pub error_message: Option<String>,
    pub metadata: JsonValue,
    pub is_additional_variant: bool,
    pub parent_generation_id: Option<Uuid>,
    pub callback_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert request for a freshly submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGenerationJob {
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub provider_task_id: String,
    pub title: String,
    pub parameters: JsonValue,
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// Provider-supplied description of one produced asset. Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub provider_artifact_id: Option<String>,
    /// Candidate download URLs in preference order.
    pub urls: Vec<String>,
    /// Content delivered inline instead of by URL (lyrics).
    pub inline_text: Option<String>,
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
    pub tags: Option<String>,
    pub model_name: Option<String>,
    pub prompt: Option<String>,
    pub provider_created_at: Option<String>,
}

impl GeneratedArtifact {
    /// First non-empty candidate URL, used as the CDN fallback.
    pub fn cdn_url(&self) -> Option<&str> {
        self.urls
            .iter()
            .map(|u| u.trim())
            .find(|u| !u.is_empty())
    }

    /// Whether the artifact carries anything the pipeline could persist.
    pub fn has_content(&self) -> bool {
        self.cdn_url().is_some()
            || self
                .inline_text
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }
}

/// Provider status for one task, normalized across job kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTaskStatus {
    pub task_id: String,
    pub kind: JobKind,
    /// Raw status string exactly as the provider reported it.
    pub status: String,
    pub artifacts: Vec<GeneratedArtifact>,
    pub error_message: Option<String>,
    pub error_code: Option<i64>,
}

impl RawTaskStatus {
    pub fn new(task_id: impl Into<String>, kind: JobKind, status: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            status: status.into(),
            artifacts: Vec::new(),
            error_message: None,
            error_code: None,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<GeneratedArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Durable form of one artifact.
///
/// `artifact_url` is the public URL of the durable copy, or the provider CDN
/// URL when the copy failed (`storage_path` is then `None`). Inline text with
/// neither is carried in the metadata instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifactRecord {
    pub artifact_index: i32,
    pub artifact_url: Option<String>,
    pub storage_path: Option<String>,
    pub content_hash: Option<String>,
    pub size_bytes: Option<i64>,
    /// Why the durable copy failed, when the CDN URL is used instead.
    pub fallback_reason: Option<String>,
    pub artifact: GeneratedArtifact,
}

impl StoredArtifactRecord {
    pub fn is_cdn_fallback(&self) -> bool {
        self.storage_path.is_none()
    }

    /// Artifact fields merged into a row's metadata.
    pub fn to_metadata(&self) -> JsonValue {
        serde_json::json!({
            "artifact_index": self.artifact_index,
            "provider_artifact_id": self.artifact.provider_artifact_id,
            "image_url": self.artifact.image_url,
            "duration_secs": self.artifact.duration_secs,
            "tags": self.artifact.tags,
            "model_name": self.artifact.model_name,
            "prompt": self.artifact.prompt,
            "provider_created_at": self.artifact.provider_created_at,
            "content_hash": self.content_hash,
            "size_bytes": self.size_bytes,
            "inline_text": self
                .storage_path
                .is_none()
                .then(|| self.artifact.inline_text.clone())
                .flatten(),
            "storage_fallback": self.fallback_reason.as_ref().map(|reason| serde_json::json!({
                "cdn_url": self.artifact_url,
                "reason": reason,
            })),
        })
    }
}

/// A variant row fanned out from a task's additional artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariant {
    pub id: Uuid,
    pub title: String,
    pub record: StoredArtifactRecord,
    pub metadata: JsonValue,
}

/// Everything written atomically when a job transitions into `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionWrite {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub provider_task_id: String,
    pub parameters: JsonValue,
    pub primary: StoredArtifactRecord,
    /// Merged into the primary row's existing metadata.
    pub metadata_patch: JsonValue,
    pub variants: Vec<NewVariant>,
    pub catalog_entry: CatalogEntry,
    pub completed_at: DateTime<Utc>,
    /// Set when a callback drove the transition; stamped only if still null.
    pub callback_received_at: Option<DateTime<Utc>>,
}

/// Result of a guarded completion write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// This call won the transition.
    Applied {
        variants_inserted: u64,
        catalog_created: bool,
    },
    /// The job was no longer `processing`; nothing was written.
    Superseded,
}

/// Guarded transition into `failed` or `rejected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalUpdate {
    pub job_id: Uuid,
    pub status: GenerationStatus,
    pub error_message: String,
    pub metadata_patch: JsonValue,
    pub completed_at: DateTime<Utc>,
    /// Set when a callback drove the transition; stamped only if still null.
    pub callback_received_at: Option<DateTime<Utc>>,
}

// =============================================================================
// CATALOG & CALLBACK LOG
// =============================================================================

/// Pointer registering a completed job in the content library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub owner_id: Uuid,
    pub content_type: String,
    pub content_id: Uuid,
}

/// Raw callback body kept for debugging provider behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub task_id: Option<String>,
    pub callback_type: Option<String>,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// FILTERS
// =============================================================================

/// Scope filter for loading `processing` jobs to reconcile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileFilter {
    pub owner_id: Option<Uuid>,
    pub kind: Option<JobKind>,
    pub job_id: Option<Uuid>,
    /// Only jobs created at least this many seconds ago.
    pub stale_after_secs: Option<i64>,
    /// Only jobs that never received a callback.
    #[serde(default)]
    pub without_callback: bool,
    pub limit: Option<i64>,
}

impl ReconcileFilter {
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    /// Reject windows and limits no backend can honor.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(secs) = self.stale_after_secs {
            if !(0..=MAX_STALE_AFTER_SECS).contains(&secs) {
                return Err(crate::Error::InvalidInput(format!(
                    "stale_after_secs must be between 0 and {}",
                    MAX_STALE_AFTER_SECS
                )));
            }
        }
        if self.limit.is_some_and(|l| l < 1) {
            return Err(crate::Error::InvalidInput("limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Whether a job satisfies every predicate except status.
    pub fn matches(&self, job: &GenerationJob, now: DateTime<Utc>) -> bool {
        if job.is_additional_variant {
            return false;
        }
        if self.owner_id.is_some_and(|o| o != job.owner_id) {
            return false;
        }
        if self.kind.is_some_and(|k| k != job.kind) {
            return false;
        }
        if self.job_id.is_some_and(|id| id != job.id) {
            return false;
        }
        if let Some(secs) = self.stale_after_secs {
            let cutoff = chrono::Duration::try_seconds(secs)
                .and_then(|window| now.checked_sub_signed(window));
            if cutoff.map_or(true, |cutoff| job.created_at > cutoff) {
                return false;
            }
        }
        if self.without_callback && job.callback_received_at.is_some() {
            return false;
        }
        true
    }
}

/// Merge `patch` into `base` one level deep (object keys overwrite).
pub fn merge_metadata(base: &mut JsonValue, patch: &JsonValue) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(b), Some(p)) => {
            for (k, v) in p {
                b.insert(k.clone(), v.clone());
            }
        }
        (None, Some(_)) => *base = patch.clone(),
        _ => {}
    }
}
