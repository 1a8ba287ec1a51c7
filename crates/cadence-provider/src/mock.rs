//! Scripted provider and fetcher for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_provider::mock::{ScriptedFetcher, ScriptedProvider};
//!
//! let provider = ScriptedProvider::new()
//!     .with_status("task-1", RawTaskStatus::new("task-1", JobKind::Music, "PENDING"))
//!     .with_status("task-1", RawTaskStatus::new("task-1", JobKind::Music, "SUCCESS"));
//! let fetcher = ScriptedFetcher::new().with_bytes("https://cdn/a.mp3", b"audio".to_vec());
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use cadence_core::{
    ArtifactFetcher, Error, GenerationProvider, JobKind, ProviderApiError, ProviderResult,
    RawTaskStatus, Result,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct ProviderScript {
    statuses: HashMap<String, VecDeque<ProviderResult<RawTaskStatus>>>,
    delays: HashMap<String, Duration>,
    submit_error: Option<ProviderApiError>,
    next_task_ids: VecDeque<String>,
    credits: i64,
    submissions: Vec<(JobKind, JsonValue)>,
    status_calls: HashMap<String, usize>,
}

/// Provider whose answers are scripted per task id.
///
/// Each task holds a queue of answers; the last one repeats once the queue
/// is drained. Unknown tasks answer with a provider 404.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<ProviderScript>>,
    counter: Arc<AtomicU64>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a status answer for a task.
    pub fn with_status(self, task_id: &str, status: RawTaskStatus) -> Self {
        self.push(task_id, Ok(status));
        self
    }

    /// Delay every status answer for a task.
    pub fn with_delay(self, task_id: &str, delay: Duration) -> Self {
        lock(&self.script).delays.insert(task_id.to_string(), delay);
        self
    }

    /// Task id returned by the next submission.
    pub fn with_next_task_id(self, task_id: &str) -> Self {
        lock(&self.script).next_task_ids.push_back(task_id.to_string());
        self
    }

    pub fn with_submit_error(self, error: ProviderApiError) -> Self {
        lock(&self.script).submit_error = Some(error);
        self
    }

    pub fn with_credits(self, credits: i64) -> Self {
        lock(&self.script).credits = credits;
        self
    }

    /// Queue an answer on an already shared provider.
    pub fn push(&self, task_id: &str, answer: ProviderResult<RawTaskStatus>) {
        lock(&self.script)
            .statuses
            .entry(task_id.to_string())
            .or_default()
            .push_back(answer);
    }

    /// Payloads submitted so far, in order.
    pub fn submissions(&self) -> Vec<(JobKind, JsonValue)> {
        lock(&self.script).submissions.clone()
    }

    /// Number of status queries made for a task.
    pub fn status_calls(&self, task_id: &str) -> usize {
        lock(&self.script)
            .status_calls
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> usize {
        lock(&self.script).status_calls.values().sum()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn submit(&self, kind: JobKind, params: &JsonValue) -> ProviderResult<String> {
        let mut script = lock(&self.script);
        if let Some(err) = script.submit_error.clone() {
            return Err(err);
        }
        script.submissions.push((kind, params.clone()));
        let task_id = script.next_task_ids.pop_front().unwrap_or_else(|| {
            format!("mock-task-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        Ok(task_id)
    }

    async fn task_status(&self, _kind: JobKind, task_id: &str) -> ProviderResult<RawTaskStatus> {
        let (answer, delay) = {
            let mut script = lock(&self.script);
            *script.status_calls.entry(task_id.to_string()).or_default() += 1;
            let delay = script.delays.get(task_id).copied();
            let answer = match script.statuses.get_mut(task_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            (answer, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        answer.unwrap_or_else(|| {
            Err(ProviderApiError::new(
                404,
                format!("task {} not found", task_id),
            ))
        })
    }

    async fn credits(&self) -> ProviderResult<i64> {
        Ok(lock(&self.script).credits)
    }
}

#[derive(Default)]
struct FetchScript {
    responses: HashMap<String, std::result::Result<Vec<u8>, String>>,
    calls: HashMap<String, usize>,
    stalled: HashSet<String>,
}

/// Artifact fetcher serving scripted bytes per URL. Unknown URLs fail.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    script: Arc<Mutex<FetchScript>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(self, url: &str, bytes: Vec<u8>) -> Self {
        lock(&self.script).responses.insert(url.to_string(), Ok(bytes));
        self
    }

    pub fn with_failure(self, url: &str, message: &str) -> Self {
        lock(&self.script)
            .responses
            .insert(url.to_string(), Err(message.to_string()));
        self
    }

    /// Make `url` hang until the caller gives up.
    pub fn with_stall(self, url: &str) -> Self {
        lock(&self.script).stalled.insert(url.to_string());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        lock(&self.script).calls.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArtifactFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let stalled = {
            let mut script = lock(&self.script);
            *script.calls.entry(url.to_string()).or_default() += 1;
            script.stalled.contains(url)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        let script = lock(&self.script);
        match script.responses.get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(message)) => Err(Error::Request(message.clone())),
            None => Err(Error::Request(format!("HTTP 404 for {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_queue_repeats_last_answer() {
        let provider = ScriptedProvider::new()
            .with_status("t", RawTaskStatus::new("t", JobKind::Music, "PENDING"))
            .with_status("t", RawTaskStatus::new("t", JobKind::Music, "SUCCESS"));

        let statuses: Vec<String> = poll_statuses(&provider, 3).await;
        assert_eq!(statuses, vec!["PENDING", "SUCCESS", "SUCCESS"]);
        assert_eq!(provider.status_calls("t"), 3);
    }

    async fn poll_statuses(provider: &ScriptedProvider, n: usize) -> Vec<String> {
        let mut out = Vec::new();
        for _ in 0..n {
            out.push(provider.task_status(JobKind::Music, "t").await.unwrap().status);
        }
        out
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let err = ScriptedProvider::new()
            .task_status(JobKind::Music, "missing")
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
    }

    #[tokio::test]
    async fn test_submit_records_payload() {
        let provider = ScriptedProvider::new().with_next_task_id("abc");
        let id = provider
            .submit(JobKind::Lyrics, &serde_json::json!({ "prompt": "x" }))
            .await
            .unwrap();
        assert_eq!(id, "abc");
        assert_eq!(provider.submissions().len(), 1);
        let next = provider.submit(JobKind::Lyrics, &serde_json::json!({})).await.unwrap();
        assert!(next.starts_with("mock-task-"));
    }

    #[tokio::test]
    async fn test_fetcher_scripts() {
        let fetcher = ScriptedFetcher::new()
            .with_bytes("u1", b"ok".to_vec())
            .with_failure("u2", "boom");
        assert_eq!(fetcher.fetch("u1").await.unwrap(), b"ok");
        assert!(fetcher.fetch("u2").await.is_err());
        assert!(fetcher.fetch("u3").await.is_err());
        assert_eq!(fetcher.calls("u1"), 1);
    }
}
