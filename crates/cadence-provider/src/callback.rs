//! Provider callback payloads.
//!
//! The provider posts completion notices to the callback URL given at
//! submission. Music and lyrics callbacks carry a `callbackType` stage
//! (`text`, `first`, `complete`, `error`); video and vocal-separation
//! callbacks carry only an envelope code. A payload is parsed without knowing
//! the job kind, then interpreted once the job has been looked up.

use serde_json::Value as JsonValue;
use thiserror::Error;

use cadence_core::defaults::PROVIDER_SUCCESS_CODE;
use cadence_core::{GeneratedArtifact, JobKind, RawTaskStatus};

use crate::types::{AudioItem, LyricsItem, StemUrls, VideoResponse};

/// Substrings marking an error callback as a content-policy rejection.
const POLICY_KEYWORDS: &[&str] = &[
    "sensitive",
    "policy",
    "violation",
    "forbidden",
    "rejected",
    "artist name",
];

/// Callback payload parsed far enough to route it.
#[derive(Debug, Clone)]
pub struct ProviderCallback {
    pub task_id: String,
    pub code: i64,
    pub message: Option<String>,
    pub callback_type: Option<String>,
    /// Explicit status string, for payloads that carry one directly.
    pub status: Option<String>,
    /// The inner `data` object (or the body itself when there is no envelope).
    pub data: JsonValue,
}

/// Why a callback body could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackParseError {
    #[error("callback body is not a JSON object")]
    NotAnObject,
    #[error("callback body has no task id")]
    MissingTaskId,
}

impl ProviderCallback {
    /// Parse a raw callback body.
    pub fn parse(body: &JsonValue) -> Result<Self, CallbackParseError> {
        let outer = body.as_object().ok_or(CallbackParseError::NotAnObject)?;

        let data = match outer.get("data") {
            Some(inner @ JsonValue::Object(_)) => inner.clone(),
            _ => body.clone(),
        };

        let task_id = [&data, body]
            .into_iter()
            .find_map(|v| str_field(v, &["task_id", "taskId"]))
            .filter(|t| !t.trim().is_empty())
            .ok_or(CallbackParseError::MissingTaskId)?;

        let code = outer
            .get("code")
            .and_then(JsonValue::as_i64)
            .unwrap_or(PROVIDER_SUCCESS_CODE);

        Ok(Self {
            task_id,
            code,
            message: str_field(body, &["msg", "message"]),
            callback_type: str_field(&data, &["callbackType", "callback_type"]),
            status: str_field(body, &["status"]).or_else(|| str_field(&data, &["status"])),
            data,
        })
    }

    /// True for stage notices that precede the final result.
    pub fn is_intermediate(&self) -> bool {
        matches!(self.callback_type.as_deref(), Some("text") | Some("first"))
    }

    /// Interpret the payload as a status report for a job of `kind`.
    pub fn to_raw_status(&self, kind: JobKind) -> RawTaskStatus {
        let status = self.status_string(kind);
        let mut raw = RawTaskStatus::new(self.task_id.clone(), kind, status)
            .with_artifacts(self.artifacts(kind));
        if self.code != PROVIDER_SUCCESS_CODE {
            raw.error_code = Some(self.code);
        }
        let failed =
            self.code != PROVIDER_SUCCESS_CODE || self.callback_type.as_deref() == Some("error");
        if failed {
            raw.error_message = self.message.clone().filter(|m| !m.trim().is_empty());
        }
        raw
    }

    fn status_string(&self, kind: JobKind) -> String {
        if let Some(status) = &self.status {
            return status.clone();
        }
        match self.callback_type.as_deref() {
            Some("text") => "TEXT_SUCCESS".to_string(),
            Some("first") => "FIRST_SUCCESS".to_string(),
            Some("complete") if self.code == PROVIDER_SUCCESS_CODE => "SUCCESS".to_string(),
            Some(_) => self.failure_status(kind),
            None if self.code == PROVIDER_SUCCESS_CODE => "SUCCESS".to_string(),
            None => self.failure_status(kind),
        }
    }

    fn failure_status(&self, kind: JobKind) -> String {
        let message = self.message.as_deref().unwrap_or_default().to_lowercase();
        let policy = POLICY_KEYWORDS.iter().any(|k| message.contains(k));
        let status = match kind {
            JobKind::Music if policy => "SENSITIVE_WORD_ERROR",
            JobKind::Lyrics if policy => "SENSITIVE_WORD_ERROR",
            JobKind::Music | JobKind::VocalSeparation => "GENERATE_AUDIO_FAILED",
            JobKind::Lyrics => "GENERATE_LYRICS_FAILED",
            JobKind::MusicVideo => "GENERATE_MP4_FAILED",
        };
        status.to_string()
    }

    fn artifacts(&self, kind: JobKind) -> Vec<GeneratedArtifact> {
        match kind {
            JobKind::Music => items::<AudioItem>(&self.data)
                .into_iter()
                .map(AudioItem::into_artifact)
                .collect(),
            JobKind::Lyrics => items::<LyricsItem>(&self.data)
                .into_iter()
                .map(LyricsItem::into_artifact)
                .collect(),
            JobKind::MusicVideo => serde_json::from_value::<VideoResponse>(self.data.clone())
                .map(VideoResponse::into_artifacts)
                .unwrap_or_default(),
            JobKind::VocalSeparation => self
                .data
                .get("vocal_removal_info")
                .or_else(|| self.data.get("vocalRemovalInfo"))
                .cloned()
                .and_then(|v| serde_json::from_value::<StemUrls>(v).ok())
                .map(StemUrls::into_artifacts)
                .unwrap_or_default(),
        }
    }
}

/// Deserialize the `data` (or `artifacts`) array, skipping malformed entries.
fn items<T: serde::de::DeserializeOwned>(data: &JsonValue) -> Vec<T> {
    data.get("data")
        .or_else(|| data.get("artifacts"))
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(JsonValue::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_music_complete_callback() {
        let body = json!({
            "code": 200,
            "msg": "All generated successfully.",
            "data": {
                "callbackType": "complete",
                "task_id": "t-1",
                "data": [
                    {
                        "id": "a",
                        "audio_url": "https://cdn/a.mp3",
                        "title": "One",
                        "duration": 120.0
                    },
                    { "id": "b", "audio_url": "https://cdn/b.mp3", "title": "Two" }
                ]
            }
        });

        let cb = ProviderCallback::parse(&body).unwrap();
        assert_eq!(cb.task_id, "t-1");
        assert!(!cb.is_intermediate());

        let raw = cb.to_raw_status(JobKind::Music);
        assert_eq!(raw.status, "SUCCESS");
        assert_eq!(raw.artifacts.len(), 2);
        assert_eq!(raw.artifacts[0].urls, vec!["https://cdn/a.mp3"]);
        assert!(raw.error_code.is_none());
    }

    #[test]
    fn test_intermediate_callback() {
        let body = json!({
            "code": 200,
            "data": { "callbackType": "first", "task_id": "t-1", "data": [] }
        });
        let cb = ProviderCallback::parse(&body).unwrap();
        assert!(cb.is_intermediate());
        assert_eq!(cb.to_raw_status(JobKind::Music).status, "FIRST_SUCCESS");
    }

    #[test]
    fn test_error_callback_with_policy_message_is_rejection() {
        let body = json!({
            "code": 400,
            "msg": "Your prompt contains an artist name",
            "data": { "callbackType": "error", "task_id": "t-2", "data": null }
        });
        let raw = ProviderCallback::parse(&body).unwrap().to_raw_status(JobKind::Music);
        assert_eq!(raw.status, "SENSITIVE_WORD_ERROR");
        assert_eq!(raw.error_code, Some(400));
        assert_eq!(raw.error_message.as_deref(), Some("Your prompt contains an artist name"));
    }

    #[test]
    fn test_error_callback_without_policy_message_is_failure() {
        let body = json!({
            "code": 501,
            "msg": "Audio generation failed",
            "data": { "callbackType": "error", "task_id": "t-3" }
        });
        let raw = ProviderCallback::parse(&body).unwrap().to_raw_status(JobKind::Music);
        assert_eq!(raw.status, "GENERATE_AUDIO_FAILED");
    }

    #[test]
    fn test_video_callback() {
        let body = json!({
            "code": 200,
            "msg": "success",
            "data": { "task_id": "v-1", "video_url": "https://cdn/v.mp4" }
        });
        let raw = ProviderCallback::parse(&body).unwrap().to_raw_status(JobKind::MusicVideo);
        assert_eq!(raw.status, "SUCCESS");
        assert_eq!(raw.artifacts.len(), 1);
        assert!(raw.error_message.is_none());
    }

    #[test]
    fn test_separation_callback() {
        let body = json!({
            "code": 200,
            "data": {
                "task_id": "s-1",
                "vocal_removal_info": {
                    "origin_url": "https://cdn/o.mp3",
                    "vocal_url": "https://cdn/v.mp3",
                    "instrumental_url": "https://cdn/i.mp3"
                }
            }
        });
        let raw = ProviderCallback::parse(&body).unwrap().to_raw_status(JobKind::VocalSeparation);
        assert_eq!(raw.artifacts.len(), 2);
    }

    #[test]
    fn test_flat_payload_with_explicit_status() {
        let body = json!({ "taskId": "t-9", "status": "PENDING" });
        let raw = ProviderCallback::parse(&body).unwrap().to_raw_status(JobKind::Lyrics);
        assert_eq!(raw.task_id, "t-9");
        assert_eq!(raw.status, "PENDING");
    }

    #[test]
    fn test_missing_task_id() {
        let err = ProviderCallback::parse(&json!({ "code": 200, "data": {} })).unwrap_err();
        assert_eq!(err, CallbackParseError::MissingTaskId);
        assert_eq!(
            ProviderCallback::parse(&json!([1, 2])).unwrap_err(),
            CallbackParseError::NotAnObject
        );
    }
}
