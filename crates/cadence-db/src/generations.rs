//! Generation job repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use cadence_core::{
    new_v7, CompletionWrite, Error, GenerationJob, GenerationRepository, GenerationStatus,
    JobKind, NewGenerationJob, ReconcileFilter, Result, TerminalUpdate, WriteOutcome,
};

const JOB_COLUMNS: &str = "id, owner_id, kind::text AS kind, provider_task_id, status::text AS status, \
     title, parameters, primary_artifact_url, storage_path, artifact_index, error_message, metadata, \
     is_additional_variant, parent_generation_id, callback_received_at, created_at, completed_at";

/// PostgreSQL implementation of GenerationRepository.
pub struct PgGenerationRepository {
    pool: Pool<Postgres>,
}

impl PgGenerationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a row into a GenerationJob.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<GenerationJob> {
        let kind: String = row.get("kind");
        let status: String = row.get("status");
        Ok(GenerationJob {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            kind: JobKind::parse(&kind)
                .ok_or_else(|| Error::Internal(format!("unknown generation kind '{}'", kind)))?,
            provider_task_id: row.get("provider_task_id"),
            status: GenerationStatus::parse(&status)
                .ok_or_else(|| Error::Internal(format!("unknown generation status '{}'", status)))?,
            title: row.get("title"),
            parameters: row.get("parameters"),
            primary_artifact_url: row.get("primary_artifact_url"),
            storage_path: row.get("storage_path"),
            artifact_index: row.get("artifact_index"),
            error_message: row.get("error_message"),
            metadata: row.get("metadata"),
            is_additional_variant: row.get("is_additional_variant"),
            parent_generation_id: row.get("parent_generation_id"),
            callback_received_at: row.get("callback_received_at"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl GenerationRepository for PgGenerationRepository {
    async fn insert(&self, req: NewGenerationJob) -> Result<GenerationJob> {
        let query = format!(
            "INSERT INTO generation_jobs (id, owner_id, kind, provider_task_id, status, title, parameters, metadata, created_at)
             VALUES ($1, $2, $3::generation_kind, $4, 'pending'::generation_status, $5, $6, '{{}}'::jsonb, $7)
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(new_v7())
            .bind(req.owner_id)
            .bind(req.kind.as_str())
            .bind(&req.provider_task_id)
            .bind(&req.title)
            .bind(&req.parameters)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Self::parse_job_row(row)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE generation_jobs SET status = 'processing'::generation_status
             WHERE id = $1 AND status = 'pending'::generation_status",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<GenerationJob>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs
             WHERE provider_task_id = $1 AND NOT is_additional_variant"
        );
        let row = sqlx::query(&query)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn list_variants(&self, parent_id: Uuid) -> Result<Vec<GenerationJob>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs
             WHERE parent_generation_id = $1 AND is_additional_variant
             ORDER BY artifact_index ASC"
        );
        let rows = sqlx::query(&query)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn list_processing(&self, filter: &ReconcileFilter) -> Result<Vec<GenerationJob>> {
        // NULL binds disable the corresponding predicate; LIMIT NULL means no limit.
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM generation_jobs
             WHERE status = 'processing'::generation_status
               AND NOT is_additional_variant
               AND ($1::uuid IS NULL OR owner_id = $1)
               AND ($2::text IS NULL OR kind::text = $2)
               AND ($3::uuid IS NULL OR id = $3)
               AND ($4::bigint IS NULL OR created_at <= NOW() - ($4::bigint * INTERVAL '1 second'))
               AND (NOT $5 OR callback_received_at IS NULL)
             ORDER BY created_at ASC
             LIMIT $6"
        );

        let rows = sqlx::query(&query)
            .bind(filter.owner_id)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.job_id)
            .bind(filter.stale_after_secs)
            .bind(filter.without_callback)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "generations",
            op = "list_processing",
            result_count = rows.len(),
            "Loaded processing jobs"
        );

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn complete(&self, write: &CompletionWrite) -> Result<WriteOutcome> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Optimistic guard: only the first resolution path to get here wins.
        let updated = sqlx::query(
            "UPDATE generation_jobs
             SET status = 'completed'::generation_status,
                 primary_artifact_url = $2,
                 storage_path = $3,
                 artifact_index = $4,
                 metadata = metadata || $5::jsonb,
                 error_message = NULL,
                 completed_at = $6,
                 callback_received_at = COALESCE(callback_received_at, $7)
             WHERE id = $1 AND status = 'processing'::generation_status",
        )
        .bind(write.job_id)
        .bind(&write.primary.artifact_url)
        .bind(&write.primary.storage_path)
        .bind(write.primary.artifact_index)
        .bind(&write.metadata_patch)
        .bind(write.completed_at)
        .bind(write.callback_received_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(WriteOutcome::Superseded);
        }

        let mut variants_inserted = 0;
        if !write.variants.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO generation_jobs (id, owner_id, kind, provider_task_id, status, title, \
                 parameters, primary_artifact_url, storage_path, artifact_index, metadata, \
                 is_additional_variant, parent_generation_id, created_at, completed_at) ",
            );
            builder.push_values(&write.variants, |mut b, variant| {
                b.push_bind(variant.id)
                    .push_bind(write.owner_id)
                    .push_bind(write.kind.as_str())
                    .push_unseparated("::generation_kind")
                    .push_bind(&write.provider_task_id)
                    .push("'completed'::generation_status")
                    .push_bind(&variant.title)
                    .push_bind(&write.parameters)
                    .push_bind(&variant.record.artifact_url)
                    .push_bind(&variant.record.storage_path)
                    .push_bind(variant.record.artifact_index)
                    .push_bind(&variant.metadata)
                    .push("TRUE")
                    .push_bind(write.job_id)
                    .push_bind(write.completed_at)
                    .push_bind(write.completed_at);
            });
            builder.push(
                " ON CONFLICT (provider_task_id, artifact_index) WHERE is_additional_variant DO NOTHING",
            );

            variants_inserted = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?
                .rows_affected();
        }

        let catalog = sqlx::query(
            "INSERT INTO library_items (id, owner_id, content_type, content_id, date_added)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (content_type, content_id) DO NOTHING",
        )
        .bind(new_v7())
        .bind(write.catalog_entry.owner_id)
        .bind(&write.catalog_entry.content_type)
        .bind(write.catalog_entry.content_id)
        .bind(write.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(WriteOutcome::Applied {
            variants_inserted,
            catalog_created: catalog.rows_affected() > 0,
        })
    }

    async fn resolve_terminal(&self, update: &TerminalUpdate) -> Result<bool> {
        if !matches!(
            update.status,
            GenerationStatus::Failed | GenerationStatus::Rejected
        ) {
            return Err(Error::InvalidInput(format!(
                "resolve_terminal only accepts failed or rejected, got {}",
                update.status
            )));
        }

        let result = sqlx::query(
            "UPDATE generation_jobs
             SET status = $2::generation_status,
                 error_message = $3,
                 metadata = metadata || $4::jsonb,
                 completed_at = $5,
                 callback_received_at = COALESCE(callback_received_at, $6)
             WHERE id = $1 AND status = 'processing'::generation_status",
        )
        .bind(update.job_id)
        .bind(update.status.as_str())
        .bind(&update.error_message)
        .bind(&update.metadata_patch)
        .bind(update.completed_at)
        .bind(update.callback_received_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
