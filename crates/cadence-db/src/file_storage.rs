//! Durable artifact storage.
//!
//! Artifacts are copied from the provider CDN into owned storage under a
//! deterministic path keyed by `(owner, task, artifact index)`, so re-running a
//! resolution overwrites the same object instead of creating a new one.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_db::file_storage::{artifact_storage_path, FilesystemBackend, StorageBackend};
//!
//! let backend = FilesystemBackend::new("/var/lib/cadence/artifacts");
//! let path = artifact_storage_path(owner_id, JobKind::Music, "task-123", 0);
//! backend.write(&path, &bytes).await?;
//! ```

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use cadence_core::defaults::{STORAGE_PATH, STORAGE_PUBLIC_BASE_URL};
use cadence_core::{Error, JobKind, Result};

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, object storage, or in-memory stores.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path, replacing any existing object.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend rooted at a base directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Storage(format!("invalid storage path: {}", path)));
        }
        Ok(self.base_path.join(relative))
    }

    /// Validate that the backend can write, read, and delete files.
    ///
    /// Performs a round-trip at startup to catch permission or mount issues early.
    pub async fn validate(&self) -> Result<()> {
        let probe = ".health-check/probe.bin";
        let data = b"storage-health-check";

        self.write(probe, data).await?;
        let read_back = self.read(probe).await?;
        if read_back != data {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        self.delete(probe).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await; // best effort
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path)?;
        debug!(
            storage_path = %path,
            full_path = %full_path.display(),
            size = data.len(),
            "file_storage: write"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(
                    parent = %parent.display(),
                    error = %e,
                    "file_storage: create_dir_all failed"
                );
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(
                temp_path = %temp_path.display(),
                error = %e,
                "file_storage: File::create failed"
            );
            e
        })?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(
                from = %temp_path.display(),
                to = %full_path.display(),
                error = %e,
                "file_storage: rename failed"
            );
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path)?;
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }
}

/// Compute BLAKE3 hash of data with "blake3:" prefix.
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

/// Reduce an opaque provider task id to a path-safe segment.
fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Deterministic storage path for one artifact.
///
/// Path format: `generations/{owner}/{kind-dir}/{task}_{index}.{ext}`
pub fn artifact_storage_path(owner_id: Uuid, kind: JobKind, task_id: &str, index: usize) -> String {
    format!(
        "generations/{}/{}/{}_{}.{}",
        owner_id.as_hyphenated(),
        kind.storage_dir(),
        sanitize_segment(task_id),
        index,
        kind.file_extension()
    )
}

/// Public URL for a stored object under the configured base URL.
pub fn public_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Result of copying one artifact into owned storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
    pub content_hash: String,
    pub size_bytes: i64,
}

/// Storage backend paired with the public base URL it is served under.
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn StorageBackend>,
    public_base_url: String,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn StorageBackend>, public_base_url: impl Into<String>) -> Self {
        Self {
            backend,
            public_base_url: public_base_url.into(),
        }
    }

    /// Filesystem store configured from the environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `STORAGE_PATH` | `/var/lib/cadence/artifacts` |
    /// | `STORAGE_PUBLIC_BASE_URL` | `http://localhost:3000/artifacts` |
    pub fn filesystem_from_env() -> Self {
        let root = std::env::var("STORAGE_PATH").unwrap_or_else(|_| STORAGE_PATH.to_string());
        let base = std::env::var("STORAGE_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| STORAGE_PUBLIC_BASE_URL.to_string());
        Self::new(Arc::new(FilesystemBackend::new(root)), base)
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn public_url(&self, path: &str) -> String {
        public_url(&self.public_base_url, path)
    }

    /// Write `data` at `path` and describe the stored object.
    pub async fn put(&self, path: &str, data: &[u8]) -> Result<StoredObject> {
        self.backend.write(path, data).await?;
        Ok(StoredObject {
            path: path.to_string(),
            url: self.public_url(path),
            content_hash: compute_content_hash(data),
            size_bytes: data.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_prefix() {
        let hash = compute_content_hash(b"hello");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
        assert_eq!(hash, compute_content_hash(b"hello"));
    }

    #[test]
    fn test_artifact_storage_path_is_deterministic() {
        let owner = Uuid::nil();
        let a = artifact_storage_path(owner, JobKind::Music, "abc123", 2);
        assert_eq!(
            a,
            "generations/00000000-0000-0000-0000-000000000000/music/abc123_2.mp3"
        );
        assert_eq!(a, artifact_storage_path(owner, JobKind::Music, "abc123", 2));
    }

    #[test]
    fn test_artifact_storage_path_sanitizes_task_id() {
        let path = artifact_storage_path(Uuid::nil(), JobKind::MusicVideo, "../../etc/passwd", 0);
        assert!(!path.contains(".."));
        assert!(path.ends_with(".mp4"));
    }

    #[test]
    fn test_public_url_joins_with_single_slash() {
        let joined = "https://cdn.example/a/x/y.mp3";
        assert_eq!(public_url("https://cdn.example/a/", "x/y.mp3"), joined);
        assert_eq!(public_url("https://cdn.example/a", "x/y.mp3"), joined);
    }

    #[tokio::test]
    async fn test_filesystem_roundtrip() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());

        backend.write("generations/a/b.mp3", b"bytes").await.unwrap();
        assert!(backend.exists("generations/a/b.mp3").await.unwrap());
        assert_eq!(backend.read("generations/a/b.mp3").await.unwrap(), b"bytes");

        backend.write("generations/a/b.mp3", b"newer").await.unwrap();
        assert_eq!(backend.read("generations/a/b.mp3").await.unwrap(), b"newer");

        backend.delete("generations/a/b.mp3").await.unwrap();
        assert!(!backend.exists("generations/a/b.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn test_filesystem_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.write("../escape.bin", b"x").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_filesystem_validate() {
        let dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        backend.validate().await.unwrap();
    }

    #[tokio::test]
    async fn test_artifact_store_put_describes_object() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(
            Arc::new(FilesystemBackend::new(dir.path())),
            "https://media.example/artifacts/",
        );

        let stored = store.put("generations/o/music/t_0.mp3", b"audio").await.unwrap();
        assert_eq!(stored.url, "https://media.example/artifacts/generations/o/music/t_0.mp3");
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.content_hash, compute_content_hash(b"audio"));
        assert!(store.backend().exists(&stored.path).await.unwrap());
    }
}
