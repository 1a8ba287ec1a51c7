//! # cadence-db
//!
//! PostgreSQL persistence and artifact storage for cadence.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for generation jobs, the content catalog and
//!   the provider callback log
//! - Durable artifact storage backends
//! - An in-memory store with the same guard semantics (feature `memory`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_db::Database;
//!
//! let db = Database::connect("postgres://localhost/cadence").await?;
//! db.migrate().await?;
//! let stuck = db.generations.list_processing(&Default::default()).await?;
//! ```
pub mod callbacks;
pub mod catalog;
pub mod file_storage;
pub mod generations;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod pool;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use cadence_core::*;

pub use callbacks::PgCallbackLogRepository;
pub use catalog::PgCatalogRepository;
pub use file_storage::{
    artifact_storage_path, compute_content_hash, public_url, ArtifactStore, FilesystemBackend,
    StorageBackend, StoredObject,
};
pub use generations::PgGenerationRepository;
#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryStorageBackend, MemoryStore};
pub use pool::{create_pool_with_config, PoolConfig};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Generation job rows (primaries and variants).
    pub generations: PgGenerationRepository,
    /// Content catalog (library items).
    pub catalog: PgCatalogRepository,
    /// Raw provider callback log.
    pub callbacks: PgCallbackLogRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            generations: PgGenerationRepository::new(pool.clone()),
            catalog: PgCatalogRepository::new(pool.clone()),
            callbacks: PgCallbackLogRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Connect with an explicit pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
