//! Content catalog (library) repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cadence_core::{CatalogEntry, CatalogRepository, Error, Result};

/// PostgreSQL implementation of CatalogRepository.
///
/// Entries are inserted inside `PgGenerationRepository::complete`; this type is
/// the read side.
pub struct PgCatalogRepository {
    pool: Pool<Postgres>,
}

impl PgCatalogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn contains(&self, content_id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM library_items WHERE content_id = $1)")
                .bind(content_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(exists)
    }

    async fn list_for_owner(&self, owner_id: Uuid, limit: i64) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query(
            "SELECT owner_id, content_type, content_id FROM library_items
             WHERE owner_id = $1
             ORDER BY date_added DESC
             LIMIT $2",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| CatalogEntry {
                owner_id: row.get("owner_id"),
                content_type: row.get("content_type"),
                content_id: row.get("content_id"),
            })
            .collect())
    }
}
