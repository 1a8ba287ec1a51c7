//! Provider status classification.
//!
//! Each job kind has a closed status vocabulary. Raw status strings are parsed
//! into the kind's enum and mapped onto a shared [`Phase`]; anything outside
//! the vocabulary becomes [`Outcome::Unrecognized`] and is never guessed at.

use cadence_core::defaults::REJECTED_DEFAULT_MESSAGE;
use cadence_core::{GeneratedArtifact, JobKind, RawTaskStatus};

/// Coarse lifecycle phase shared by every status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    InProgress,
    Success,
    Failed,
    PolicyRejected,
}

/// A closed provider status vocabulary.
pub trait ProviderStatus: Sized + Copy + std::fmt::Debug {
    fn parse(raw: &str) -> Option<Self>;
    fn phase(self) -> Phase;
}

/// Classification of one status report.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Recovered { artifacts: Vec<GeneratedArtifact> },
    Failed { reason: String },
    StillProcessing { raw_status: String },
    Rejected { policy_message: String },
    Unrecognized { raw_value: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Recovered { .. } => "recovered",
            Outcome::Failed { .. } => "failed",
            Outcome::StillProcessing { .. } => "still_processing",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Unrecognized { .. } => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicStatus {
    Pending,
    TextSuccess,
    FirstSuccess,
    Generating,
    Success,
    CreateTaskFailed,
    GenerateAudioFailed,
    CallbackException,
    Failed,
    SensitiveWordError,
}

impl ProviderStatus for MusicStatus {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "PENDING" => Self::Pending,
            "TEXT_SUCCESS" => Self::TextSuccess,
            "FIRST_SUCCESS" => Self::FirstSuccess,
            "GENERATING" => Self::Generating,
            "SUCCESS" => Self::Success,
            "CREATE_TASK_FAILED" => Self::CreateTaskFailed,
            "GENERATE_AUDIO_FAILED" => Self::GenerateAudioFailed,
            "CALLBACK_EXCEPTION" => Self::CallbackException,
            "FAILED" => Self::Failed,
            "SENSITIVE_WORD_ERROR" => Self::SensitiveWordError,
            _ => return None,
        })
    }

    fn phase(self) -> Phase {
        match self {
            Self::Pending | Self::TextSuccess | Self::FirstSuccess | Self::Generating => {
                Phase::InProgress
            }
            Self::Success => Phase::Success,
            Self::CreateTaskFailed
            | Self::GenerateAudioFailed
            | Self::CallbackException
            | Self::Failed => Phase::Failed,
            Self::SensitiveWordError => Phase::PolicyRejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStatus {
    Pending,
    Success,
    CreateTaskFailed,
    GenerateMp4Failed,
    CallbackException,
}

impl ProviderStatus for VideoStatus {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "CREATE_TASK_FAILED" => Self::CreateTaskFailed,
            "GENERATE_MP4_FAILED" => Self::GenerateMp4Failed,
            "CALLBACK_EXCEPTION" => Self::CallbackException,
            _ => return None,
        })
    }

    fn phase(self) -> Phase {
        match self {
            Self::Pending => Phase::InProgress,
            Self::Success => Phase::Success,
            Self::CreateTaskFailed | Self::GenerateMp4Failed | Self::CallbackException => {
                Phase::Failed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyricsStatus {
    Pending,
    Success,
    CreateTaskFailed,
    GenerateLyricsFailed,
    CallbackException,
    SensitiveWordError,
}

impl ProviderStatus for LyricsStatus {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "CREATE_TASK_FAILED" => Self::CreateTaskFailed,
            "GENERATE_LYRICS_FAILED" => Self::GenerateLyricsFailed,
            "CALLBACK_EXCEPTION" => Self::CallbackException,
            "SENSITIVE_WORD_ERROR" => Self::SensitiveWordError,
            _ => return None,
        })
    }

    fn phase(self) -> Phase {
        match self {
            Self::Pending => Phase::InProgress,
            Self::Success => Phase::Success,
            Self::CreateTaskFailed | Self::GenerateLyricsFailed | Self::CallbackException => {
                Phase::Failed
            }
            Self::SensitiveWordError => Phase::PolicyRejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparationStatus {
    Pending,
    Success,
    CreateTaskFailed,
    GenerateAudioFailed,
    CallbackException,
}

impl ProviderStatus for SeparationStatus {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "PENDING" => Self::Pending,
            "SUCCESS" => Self::Success,
            "CREATE_TASK_FAILED" => Self::CreateTaskFailed,
            "GENERATE_AUDIO_FAILED" => Self::GenerateAudioFailed,
            "CALLBACK_EXCEPTION" => Self::CallbackException,
            _ => return None,
        })
    }

    fn phase(self) -> Phase {
        match self {
            Self::Pending => Phase::InProgress,
            Self::Success => Phase::Success,
            Self::CreateTaskFailed | Self::GenerateAudioFailed | Self::CallbackException => {
                Phase::Failed
            }
        }
    }
}

/// Classify a status report using the vocabulary `S`.
pub fn classify_as<S: ProviderStatus>(raw: &RawTaskStatus) -> Outcome {
    let trimmed = raw.status.trim();
    let Some(status) = S::parse(trimmed) else {
        return Outcome::Unrecognized {
            raw_value: raw.status.clone(),
        };
    };

    let provider_message = raw
        .error_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    match status.phase() {
        Phase::InProgress => Outcome::StillProcessing {
            raw_status: trimmed.to_string(),
        },
        Phase::Success => {
            let artifacts: Vec<GeneratedArtifact> = raw
                .artifacts
                .iter()
                .filter(|a| a.has_content())
                .cloned()
                .collect();
            if artifacts.is_empty() {
                Outcome::Failed {
                    reason: raw.kind.empty_result_message().to_string(),
                }
            } else {
                Outcome::Recovered { artifacts }
            }
        }
        Phase::Failed => Outcome::Failed {
            reason: provider_message
                .map(str::to_string)
                .unwrap_or_else(|| format!("generation failed on provider ({})", trimmed)),
        },
        Phase::PolicyRejected => Outcome::Rejected {
            policy_message: provider_message
                .map(str::to_string)
                .unwrap_or_else(|| REJECTED_DEFAULT_MESSAGE.to_string()),
        },
    }
}

/// Classify a status report with the vocabulary of its job kind.
pub fn classify(raw: &RawTaskStatus) -> Outcome {
    match raw.kind {
        JobKind::Music => classify_as::<MusicStatus>(raw),
        JobKind::MusicVideo => classify_as::<VideoStatus>(raw),
        JobKind::Lyrics => classify_as::<LyricsStatus>(raw),
        JobKind::VocalSeparation => classify_as::<SeparationStatus>(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(url: &str) -> GeneratedArtifact {
        GeneratedArtifact {
            urls: vec![url.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_in_progress_statuses() {
        for status in ["PENDING", "TEXT_SUCCESS", "FIRST_SUCCESS", "GENERATING"] {
            let raw = RawTaskStatus::new("t", JobKind::Music, status);
            assert_eq!(
                classify(&raw),
                Outcome::StillProcessing {
                    raw_status: status.to_string()
                }
            );
        }
    }

    #[test]
    fn test_success_with_artifacts() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "SUCCESS")
            .with_artifacts(vec![audio("https://cdn/a.mp3"), GeneratedArtifact::default()]);
        match classify(&raw) {
            Outcome::Recovered { artifacts } => assert_eq!(artifacts.len(), 1),
            other => panic!("expected Recovered, got {:?}", other),
        }
    }

    #[test]
    fn test_success_without_artifacts_fails_with_kind_message() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "SUCCESS");
        assert_eq!(
            classify(&raw),
            Outcome::Failed {
                reason: "no audio files could be processed".to_string()
            }
        );

        let raw = RawTaskStatus::new("t", JobKind::Lyrics, "SUCCESS");
        assert_eq!(
            classify(&raw),
            Outcome::Failed {
                reason: JobKind::Lyrics.empty_result_message().to_string()
            }
        );
    }

    #[test]
    fn test_failure_uses_provider_message_or_diagnostic() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "GENERATE_AUDIO_FAILED")
            .with_error_message("model overloaded");
        assert_eq!(
            classify(&raw),
            Outcome::Failed {
                reason: "model overloaded".to_string()
            }
        );

        let raw = RawTaskStatus::new("t", JobKind::MusicVideo, "GENERATE_MP4_FAILED");
        assert_eq!(
            classify(&raw),
            Outcome::Failed {
                reason: "generation failed on provider (GENERATE_MP4_FAILED)".to_string()
            }
        );
    }

    #[test]
    fn test_policy_rejection_is_distinct_from_failure() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "SENSITIVE_WORD_ERROR")
            .with_error_message("Lyrics mention a protected artist");
        assert_eq!(
            classify(&raw),
            Outcome::Rejected {
                policy_message: "Lyrics mention a protected artist".to_string()
            }
        );

        let raw = RawTaskStatus::new("t", JobKind::Lyrics, "SENSITIVE_WORD_ERROR");
        assert_eq!(
            classify(&raw),
            Outcome::Rejected {
                policy_message: REJECTED_DEFAULT_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_vocabularies_are_closed_per_kind() {
        // Rejection exists only for music and lyrics.
        let raw = RawTaskStatus::new("t", JobKind::MusicVideo, "SENSITIVE_WORD_ERROR");
        assert_eq!(
            classify(&raw),
            Outcome::Unrecognized {
                raw_value: "SENSITIVE_WORD_ERROR".to_string()
            }
        );

        let raw = RawTaskStatus::new("t", JobKind::VocalSeparation, "TEXT_SUCCESS");
        assert!(matches!(classify(&raw), Outcome::Unrecognized { .. }));
    }

    #[test]
    fn test_unknown_and_empty_status_are_unrecognized() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "QUEUED_FOR_MIXING");
        assert_eq!(classify(&raw).label(), "unrecognized");
        let raw = RawTaskStatus::new("t", JobKind::Music, "");
        assert_eq!(classify(&raw).label(), "unrecognized");
    }

    #[test]
    fn test_classify_as_is_generic() {
        let raw = RawTaskStatus::new("t", JobKind::Music, "GENERATE_LYRICS_FAILED");
        assert!(matches!(classify_as::<LyricsStatus>(&raw), Outcome::Failed { .. }));
        assert!(matches!(classify_as::<MusicStatus>(&raw), Outcome::Unrecognized { .. }));
    }
}
