//! Shared wiring for the scenario tests: in-memory store and storage,
//! scripted provider and fetcher.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use cadence_db::file_storage::ArtifactStore;
use cadence_db::{MemoryStorageBackend, MemoryStore};
use cadence_jobs::{
    CallbackReceiver, CompletionPipeline, GeneratedArtifact, GenerationJob, GenerationRepository,
    JobKind, NewGenerationJob, PipelineConfig, RawTaskStatus, ReconcileConfig,
    ReconciliationEngine,
};
use cadence_provider::mock::{ScriptedFetcher, ScriptedProvider};

pub const PUBLIC_BASE: &str = "https://files.test/artifacts";

pub struct Harness {
    pub store: MemoryStore,
    pub provider: ScriptedProvider,
    pub fetcher: ScriptedFetcher,
    pub storage: MemoryStorageBackend,
    pub pipeline: Arc<CompletionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(MemoryStorageBackend::new())
    }

    pub fn with_storage(storage: MemoryStorageBackend) -> Self {
        Self::build(storage, ScriptedProvider::new(), ScriptedFetcher::new())
    }

    pub fn build(
        storage: MemoryStorageBackend,
        provider: ScriptedProvider,
        fetcher: ScriptedFetcher,
    ) -> Self {
        Self::build_with_config(
            storage,
            provider,
            fetcher,
            PipelineConfig::default()
                .with_fetch_timeout(Duration::from_secs(5))
                .with_write_timeout(Duration::from_secs(5))
                .with_write_retry(3, Duration::from_millis(1)),
        )
    }

    pub fn build_with_config(
        storage: MemoryStorageBackend,
        provider: ScriptedProvider,
        fetcher: ScriptedFetcher,
        config: PipelineConfig,
    ) -> Self {
        let store = MemoryStore::new();
        let artifacts = ArtifactStore::new(Arc::new(storage.clone()), PUBLIC_BASE);
        let pipeline = Arc::new(CompletionPipeline::new(
            Arc::new(store.clone()),
            Arc::new(fetcher.clone()),
            artifacts,
            config,
        ));
        Self {
            store,
            provider,
            fetcher,
            storage,
            pipeline,
        }
    }

    pub fn engine(&self, config: ReconcileConfig) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::new(self.provider.clone()),
            Arc::new(self.store.clone()),
            self.pipeline.clone(),
            config,
        )
    }

    pub fn default_engine(&self) -> ReconciliationEngine {
        self.engine(ReconcileConfig::default().with_batch_delay(Duration::from_millis(1)))
    }

    pub fn receiver(&self) -> CallbackReceiver {
        CallbackReceiver::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.pipeline.clone(),
        )
    }

    /// Insert a job the way the gateway does, leaving it `pending`.
    pub async fn pending_job(&self, kind: JobKind, task_id: &str, title: &str) -> GenerationJob {
        self.store
            .insert(NewGenerationJob {
                owner_id: Uuid::new_v4(),
                kind,
                provider_task_id: task_id.to_string(),
                title: title.to_string(),
                parameters: json!({ "prompt": "late night piano" }),
            })
            .await
            .unwrap()
    }

    pub async fn processing_job(&self, kind: JobKind, task_id: &str, title: &str) -> GenerationJob {
        let job = self.pending_job(kind, task_id, title).await;
        assert!(self.store.mark_processing(job.id).await.unwrap());
        self.reload(job.id).await
    }

    pub async fn reload(&self, id: Uuid) -> GenerationJob {
        self.store.get(id).await.unwrap().unwrap()
    }

    /// Make the fetcher serve `bytes` for `url`.
    pub fn serve(&self, url: &str, bytes: &[u8]) {
        let _ = self.fetcher.clone().with_bytes(url, bytes.to_vec());
    }
}

pub fn audio(id: &str, url: &str) -> GeneratedArtifact {
    GeneratedArtifact {
        provider_artifact_id: Some(id.to_string()),
        urls: vec![url.to_string()],
        title: Some(format!("Track {}", id)),
        duration_secs: Some(95.5),
        ..Default::default()
    }
}

/// A music task that finished with one artifact per URL.
pub fn music_success(task_id: &str, urls: &[&str]) -> RawTaskStatus {
    let artifacts = urls
        .iter()
        .enumerate()
        .map(|(i, url)| audio(&format!("{}-{}", task_id, i), url))
        .collect();
    RawTaskStatus::new(task_id, JobKind::Music, "SUCCESS").with_artifacts(artifacts)
}
