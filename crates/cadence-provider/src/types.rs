//! Provider API request and response types.
//!
//! Every endpoint answers with the same envelope (`code`, `msg`, `data`); the
//! `data` payload differs per job kind. Field names are camelCase on the
//! polling endpoints and snake_case in callbacks, so each wire field accepts
//! both spellings.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use cadence_core::{GeneratedArtifact, JobKind, RawTaskStatus};

// =============================================================================
// ENVELOPE
// =============================================================================

/// Response envelope shared by all endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

/// `data` of a submission response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    #[serde(default, alias = "task_id")]
    pub task_id: Option<String>,
}

/// `data` of the credits endpoint: a bare number or `{ "credits": n }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreditsData {
    Plain(i64),
    Wrapped { credits: i64 },
}

impl CreditsData {
    pub fn credits(&self) -> i64 {
        match self {
            Self::Plain(n) => *n,
            Self::Wrapped { credits } => *credits,
        }
    }
}

// =============================================================================
// ARTIFACT ITEMS
// =============================================================================

/// One generated audio track.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "audio_url")]
    pub audio_url: Option<String>,
    #[serde(default, alias = "source_audio_url")]
    pub source_audio_url: Option<String>,
    #[serde(default, alias = "stream_audio_url")]
    pub stream_audio_url: Option<String>,
    #[serde(default, alias = "image_url")]
    pub image_url: Option<String>,
    #[serde(default, alias = "source_image_url")]
    pub source_image_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, alias = "model_name")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, alias = "create_time")]
    pub create_time: Option<JsonValue>,
}

impl AudioItem {
    pub fn into_artifact(self) -> GeneratedArtifact {
        let urls = [self.audio_url, self.source_audio_url, self.stream_audio_url]
            .into_iter()
            .flatten()
            .filter(|u| !u.trim().is_empty())
            .collect();

        GeneratedArtifact {
            provider_artifact_id: self.id,
            urls,
            inline_text: None,
            image_url: self.image_url.or(self.source_image_url),
            title: self.title,
            duration_secs: self.duration,
            tags: self.tags,
            model_name: self.model_name,
            prompt: self.prompt,
            provider_created_at: self.create_time.and_then(timestamp_string),
        }
    }
}

/// One generated lyrics sheet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsItem {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "error_message")]
    pub error_message: Option<String>,
}

impl LyricsItem {
    pub fn into_artifact(self) -> GeneratedArtifact {
        GeneratedArtifact {
            inline_text: self.text,
            title: self.title,
            ..Default::default()
        }
    }
}

/// Rendered music video.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    #[serde(default, alias = "video_url")]
    pub video_url: Option<String>,
}

impl VideoResponse {
    pub fn into_artifacts(self) -> Vec<GeneratedArtifact> {
        self.video_url
            .filter(|u| !u.trim().is_empty())
            .map(|url| GeneratedArtifact {
                urls: vec![url],
                ..Default::default()
            })
            .into_iter()
            .collect()
    }
}

/// Stems produced by vocal separation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemUrls {
    #[serde(default, alias = "vocal_url")]
    pub vocal_url: Option<String>,
    #[serde(default, alias = "instrumental_url")]
    pub instrumental_url: Option<String>,
    #[serde(default, alias = "origin_url")]
    pub origin_url: Option<String>,
}

impl StemUrls {
    /// Vocals first, then instrumental. The origin track is the input, not an output.
    pub fn into_artifacts(self) -> Vec<GeneratedArtifact> {
        [("Vocals", self.vocal_url), ("Instrumental", self.instrumental_url)]
            .into_iter()
            .filter_map(|(label, url)| {
                url.filter(|u| !u.trim().is_empty()).map(|url| GeneratedArtifact {
                    urls: vec![url],
                    title: Some(label.to_string()),
                    ..Default::default()
                })
            })
            .collect()
    }
}

// =============================================================================
// RECORD-INFO (POLLING) PAYLOADS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicResponse {
    #[serde(default, alias = "suno_data", alias = "data")]
    pub suno_data: Option<Vec<AudioItem>>,
}

/// `data` of the music record-info endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRecordInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub response: Option<MusicResponse>,
    #[serde(default)]
    pub error_code: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LyricsResponse {
    #[serde(default)]
    pub data: Option<Vec<LyricsItem>>,
}

/// `data` of the lyrics record-info endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsRecordInfo {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub response: Option<LyricsResponse>,
    #[serde(default)]
    pub error_code: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `data` of the video record-info endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecordInfo {
    #[serde(default)]
    pub success_flag: Option<String>,
    #[serde(default)]
    pub response: Option<VideoResponse>,
    #[serde(default)]
    pub error_code: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `data` of the vocal-separation record-info endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationRecordInfo {
    #[serde(default)]
    pub success_flag: Option<String>,
    #[serde(default)]
    pub response: Option<StemUrls>,
    #[serde(default)]
    pub error_code: Option<JsonValue>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Normalize a record-info payload for `kind` into a [`RawTaskStatus`].
///
/// A missing status yields an empty status string, which the classifier
/// treats as unrecognized rather than guessing.
pub fn decode_record_info(
    kind: JobKind,
    task_id: &str,
    data: JsonValue,
) -> serde_json::Result<RawTaskStatus> {
    let (status, artifacts, error_code, error_message) = match kind {
        JobKind::Music => {
            let info: MusicRecordInfo = serde_json::from_value(data)?;
            let artifacts = info
                .response
                .and_then(|r| r.suno_data)
                .unwrap_or_default()
                .into_iter()
                .map(AudioItem::into_artifact)
                .collect();
            (info.status, artifacts, info.error_code, info.error_message)
        }
        JobKind::Lyrics => {
            let info: LyricsRecordInfo = serde_json::from_value(data)?;
            let artifacts = info
                .response
                .and_then(|r| r.data)
                .unwrap_or_default()
                .into_iter()
                .map(LyricsItem::into_artifact)
                .collect();
            (info.status, artifacts, info.error_code, info.error_message)
        }
        JobKind::MusicVideo => {
            let info: VideoRecordInfo = serde_json::from_value(data)?;
            let artifacts = info.response.map(VideoResponse::into_artifacts).unwrap_or_default();
            (info.success_flag, artifacts, info.error_code, info.error_message)
        }
        JobKind::VocalSeparation => {
            let info: SeparationRecordInfo = serde_json::from_value(data)?;
            let artifacts = info.response.map(StemUrls::into_artifacts).unwrap_or_default();
            (info.success_flag, artifacts, info.error_code, info.error_message)
        }
    };

    let mut raw = RawTaskStatus::new(task_id, kind, status.unwrap_or_default())
        .with_artifacts(artifacts);
    raw.error_message = error_message.filter(|m| !m.trim().is_empty());
    raw.error_code = error_code.as_ref().and_then(code_number);
    Ok(raw)
}

/// Provider timestamps arrive as epoch millis or strings.
fn timestamp_string(value: JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn code_number(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
