//! Reconciliation engine scenarios against the in-memory store.

mod common;

use std::time::Duration;

use cadence_db::MemoryStorageBackend;
use cadence_jobs::{
    BackoffConfig, CatalogRepository, Error, GeneratedArtifact, GenerationRepository,
    GenerationStatus, JobKind, JobReconcileStatus, PipelineConfig, ProviderApiError,
    RawTaskStatus, ReconcileConfig, ReconcileFilter, RecoveryMethod,
};
use cadence_provider::mock::{ScriptedFetcher, ScriptedProvider};
use common::{music_success, Harness, PUBLIC_BASE};

#[tokio::test]
async fn test_sweep_recovers_primary_and_variants() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-a", "Night Drive").await;
    let urls = ["https://cdn/a0.mp3", "https://cdn/a1.mp3", "https://cdn/a2.mp3"];
    for url in urls {
        h.serve(url, b"ID3-audio");
    }
    h.provider.push("task-a", Ok(music_success("task-a", &urls)));

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.total_processed, 1);
    assert_eq!(report.successful, 1);
    assert_eq!(report.results[0].status, JobReconcileStatus::Recovered);
    assert_eq!(report.results[0].artifact_count, 3);

    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Completed);
    assert_eq!(job.artifact_index, Some(0));
    assert!(job.storage_path.is_some());
    assert!(job
        .primary_artifact_url
        .as_deref()
        .unwrap()
        .starts_with(PUBLIC_BASE));
    assert_eq!(job.metadata["recovery_method"], "scheduled_sweep");
    assert_eq!(job.metadata["artifact_count"], 3);
    assert!(job.completed_at.is_some());

    let variants = h.store.list_variants(job.id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].title, "Night Drive (Variant 2)");
    assert_eq!(variants[1].title, "Night Drive (Variant 3)");
    assert_eq!(variants[0].artifact_index, Some(1));
    assert_eq!(variants[1].artifact_index, Some(2));
    assert!(variants
        .iter()
        .all(|v| v.status == GenerationStatus::Completed
            && v.parent_generation_id == Some(job.id)));

    assert_eq!(h.store.catalog_entries().len(), 1);
    assert!(h.store.contains(job.id).await.unwrap());
    assert_eq!(h.storage.object_count(), 3);
}

#[tokio::test]
async fn test_success_without_artifacts_fails_job() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-b", "Empty").await;
    h.provider
        .push("task-b", Ok(RawTaskStatus::new("task-b", JobKind::Music, "SUCCESS")));

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::AdminSweep)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Failed);
    assert_eq!(job.error_message.as_deref(), Some("no audio files could be processed"));
    assert_eq!(job.metadata["recovery_method"], "admin_sweep");
    assert!(h.store.catalog_entries().is_empty());
}

#[tokio::test]
async fn test_policy_rejection_keeps_provider_message() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-c", "Cover").await;
    h.provider.push(
        "task-c",
        Ok(RawTaskStatus::new("task-c", JobKind::Music, "SENSITIVE_WORD_ERROR")
            .with_error_message("Lyrics mention a protected artist")),
    );

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.successful, 0);
    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Rejected);
    assert_eq!(
        job.error_message.as_deref(),
        Some("Lyrics mention a protected artist")
    );
    assert_eq!(job.metadata["provider_status"], "SENSITIVE_WORD_ERROR");
    assert!(h.store.catalog_entries().is_empty());
}

#[tokio::test]
async fn test_batch_survives_one_unknown_task() {
    let h = Harness::new();
    for i in 0..7 {
        let task = format!("task-{}", i);
        h.processing_job(JobKind::Music, &task, "Batch").await;
        // task-3 is never scripted, so the provider answers 404.
        if i != 3 {
            let url = format!("https://cdn/{}.mp3", task);
            h.serve(&url, b"audio");
            h.provider.push(&task, Ok(music_success(&task, &[url.as_str()])));
        }
    }

    let engine = h.engine(
        ReconcileConfig::default()
            .with_batch_size(5)
            .with_batch_delay(Duration::from_millis(1)),
    );
    let report = engine
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::AdminSweep)
        .await
        .unwrap();

    assert_eq!(report.total_processed, 7);
    assert_eq!(report.successful, 6);
    assert_eq!(report.errors, 1);
    let failed: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.status == JobReconcileStatus::Error)
        .collect();
    assert_eq!(failed[0].task_id, "task-3");
    assert!(failed[0].message.as_deref().unwrap().contains("404"));

    let unknown = h.store.find_by_task_id("task-3").await.unwrap().unwrap();
    assert_eq!(unknown.status, GenerationStatus::Processing);
}

#[tokio::test]
async fn test_still_processing_sweeps_have_no_side_effects() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-p", "Slow").await;
    h.provider
        .push("task-p", Ok(RawTaskStatus::new("task-p", JobKind::Music, "GENERATING")));
    let engine = h.default_engine();

    for _ in 0..2 {
        let report = engine
            .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
            .await
            .unwrap();
        assert_eq!(report.still_processing, 1);
    }

    let after = h.reload(job.id).await;
    assert_eq!(after, job);
    assert_eq!(h.store.completion_attempts(), 0);
    assert_eq!(h.storage.object_count(), 0);
    assert_eq!(h.provider.status_calls("task-p"), 2);
}

#[tokio::test]
async fn test_storage_failure_falls_back_to_cdn_url() {
    let h = Harness::with_storage(MemoryStorageBackend::new().with_failing_writes());
    let job = h.processing_job(JobKind::Music, "task-f", "Fallback").await;
    h.serve("https://cdn/f.mp3", b"audio-bytes");
    h.provider
        .push("task-f", Ok(music_success("task-f", &["https://cdn/f.mp3"])));

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.successful, 1);
    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Completed);
    assert_eq!(job.primary_artifact_url.as_deref(), Some("https://cdn/f.mp3"));
    assert!(job.storage_path.is_none());
    assert_eq!(job.metadata["storage_fallback"]["cdn_url"], "https://cdn/f.mp3");
    assert!(job.metadata["content_hash"].is_string());
    assert_eq!(job.metadata["storage_fallbacks"], 1);
}

#[tokio::test]
async fn test_lyrics_storage_failure_keeps_inline_text() {
    let h = Harness::with_storage(MemoryStorageBackend::new().with_failing_writes());
    let job = h.processing_job(JobKind::Lyrics, "lyr-f", "Verse").await;
    h.provider.push(
        "lyr-f",
        Ok(RawTaskStatus::new("lyr-f", JobKind::Lyrics, "SUCCESS").with_artifacts(vec![
            GeneratedArtifact {
                inline_text: Some("verse one".to_string()),
                ..Default::default()
            },
        ])),
    );

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.successful, 1);
    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Completed);
    assert!(job.storage_path.is_none());
    assert!(job.primary_artifact_url.is_none());
    assert_eq!(job.metadata["inline_text"], "verse one");
    assert!(job.metadata["content_hash"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_downloads_share_one_fetch_deadline() {
    let urls = ["https://cdn/s0.mp3", "https://cdn/s1.mp3", "https://cdn/s2.mp3"];
    let fetcher = urls
        .iter()
        .fold(ScriptedFetcher::new(), |fetcher, url| fetcher.with_stall(url));
    let h = Harness::build_with_config(
        MemoryStorageBackend::new(),
        ScriptedProvider::new(),
        fetcher,
        PipelineConfig::default(),
    );
    let job = h.processing_job(JobKind::Music, "task-stall", "Stalled").await;
    h.provider.push(
        "task-stall",
        Ok(RawTaskStatus::new("task-stall", JobKind::Music, "SUCCESS").with_artifacts(vec![
            GeneratedArtifact {
                urls: urls.iter().map(|u| u.to_string()).collect(),
                ..Default::default()
            },
        ])),
    );

    let report = h
        .engine(ReconcileConfig::default())
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::AdminSweep)
        .await
        .unwrap();

    assert_eq!(report.successful, 1);
    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Completed);
    assert_eq!(job.primary_artifact_url.as_deref(), Some(urls[0]));
    assert!(job.storage_path.is_none());
    assert!(job.metadata["storage_fallback"]["reason"]
        .as_str()
        .unwrap()
        .contains("timed out"));
    assert_eq!(h.fetcher.calls(urls[0]), 1);
    assert_eq!(h.fetcher.calls(urls[1]), 0);
}

#[tokio::test]
async fn test_download_failure_falls_back_to_cdn_url() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-d", "Unreachable").await;
    h.provider
        .push("task-d", Ok(music_success("task-d", &["https://cdn/gone.mp3"])));

    h.default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    let job = h.reload(job.id).await;
    assert_eq!(job.status, GenerationStatus::Completed);
    assert_eq!(job.primary_artifact_url.as_deref(), Some("https://cdn/gone.mp3"));
    assert!(job.storage_path.is_none());
    assert!(job.metadata["content_hash"].is_null());
    assert_eq!(h.fetcher.calls("https://cdn/gone.mp3"), 1);
}

#[tokio::test]
async fn test_transient_completion_failures_are_retried() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-r", "Retry").await;
    h.serve("https://cdn/r.mp3", b"audio");
    h.provider
        .push("task-r", Ok(music_success("task-r", &["https://cdn/r.mp3"])));
    h.store.fail_next_completions(2);

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.successful, 1);
    assert_eq!(h.store.completion_attempts(), 3);
    assert_eq!(h.reload(job.id).await.status, GenerationStatus::Completed);
}

#[tokio::test]
async fn test_exhausted_completion_retries_report_persistence_error() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-x", "Lost").await;
    h.serve("https://cdn/x.mp3", b"audio");
    h.provider
        .push("task-x", Ok(music_success("task-x", &["https://cdn/x.mp3"])));
    h.store.fail_next_completions(10);

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    let message = report.results[0].message.as_deref().unwrap();
    assert!(message.contains("Persistence error"));
    assert!(message.contains(&job.id.to_string()));
    assert_eq!(h.store.completion_attempts(), 3);
    assert_eq!(h.reload(job.id).await.status, GenerationStatus::Processing);
}

#[tokio::test]
async fn test_transport_errors_engage_backoff_for_that_kind() {
    let h = Harness::new();
    for i in 0..4 {
        let task = format!("net-{}", i);
        h.processing_job(JobKind::Music, &task, "Net").await;
        h.provider
            .push(&task, Err(ProviderApiError::transport("connection refused")));
    }
    let lyrics = h.processing_job(JobKind::Lyrics, "lyr-1", "Words").await;
    h.provider.push(
        "lyr-1",
        Ok(RawTaskStatus::new("lyr-1", JobKind::Lyrics, "SUCCESS").with_artifacts(vec![
            GeneratedArtifact {
                inline_text: Some("[Verse]\nstreetlights hum".to_string()),
                title: Some("Words".to_string()),
                ..Default::default()
            },
        ])),
    );

    let engine = h.engine(
        ReconcileConfig::default()
            .with_batch_size(1)
            .with_batch_delay(Duration::from_millis(1))
            .with_backoff(BackoffConfig {
                threshold: 2,
                ..BackoffConfig::default()
            }),
    );
    let report = engine
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.total_processed, 5);
    assert_eq!(report.errors, 2);
    assert_eq!(report.still_processing, 2);
    assert_eq!(report.successful, 1);

    let skipped = report
        .results
        .iter()
        .find(|r| r.status == JobReconcileStatus::StillProcessing)
        .unwrap();
    assert!(skipped.message.as_deref().unwrap().contains("backoff"));
    assert_eq!(h.provider.status_calls(&skipped.task_id), 0);

    let lyrics = h.reload(lyrics.id).await;
    assert_eq!(lyrics.status, GenerationStatus::Completed);
    assert!(lyrics.storage_path.unwrap().ends_with(".txt"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out_as_still_processing() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::Music, "task-slow", "Slow").await;
    h.provider
        .push("task-slow", Ok(music_success("task-slow", &["https://cdn/s.mp3"])));
    let _ = h
        .provider
        .clone()
        .with_delay("task-slow", Duration::from_secs(600));

    let engine = h.engine(ReconcileConfig::default().with_status_timeout(Duration::from_secs(5)));
    let report = engine
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::AdminSweep)
        .await
        .unwrap();

    assert_eq!(report.still_processing, 1);
    assert!(report.results[0]
        .message
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(h.reload(job.id).await.status, GenerationStatus::Processing);
}

#[tokio::test]
async fn test_reconcile_one_unknown_and_terminal_jobs() {
    let h = Harness::new();
    let engine = h.default_engine();

    let missing = uuid::Uuid::new_v4();
    let err = engine
        .reconcile_one(missing, RecoveryMethod::Cli)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::JobNotFound(id) if id == missing));

    let job = h.processing_job(JobKind::Music, "task-one", "One").await;
    h.serve("https://cdn/one.mp3", b"audio");
    h.provider
        .push("task-one", Ok(music_success("task-one", &["https://cdn/one.mp3"])));

    let first = engine.reconcile_one(job.id, RecoveryMethod::Cli).await.unwrap();
    assert_eq!(first.successful, 1);
    assert_eq!(h.reload(job.id).await.metadata["recovery_method"], "cli");

    let second = engine.reconcile_one(job.id, RecoveryMethod::Cli).await.unwrap();
    assert_eq!(second.total_processed, 0);
    assert_eq!(h.provider.status_calls("task-one"), 1);
}

#[tokio::test]
async fn test_unrecognized_status_leaves_job_processing() {
    let h = Harness::new();
    let job = h.processing_job(JobKind::MusicVideo, "vid-1", "Clip").await;
    h.provider.push(
        "vid-1",
        Ok(RawTaskStatus::new("vid-1", JobKind::MusicVideo, "QUEUED_FOR_RENDER")),
    );

    let report = h
        .default_engine()
        .reconcile_all(&ReconcileFilter::default(), RecoveryMethod::ScheduledSweep)
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    assert!(report.results[0]
        .message
        .as_deref()
        .unwrap()
        .contains("QUEUED_FOR_RENDER"));
    assert_eq!(h.reload(job.id).await.status, GenerationStatus::Processing);
}
