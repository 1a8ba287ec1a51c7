//! Raw provider callback log.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use cadence_core::{new_v7, CallbackLogRepository, CallbackRecord, Error, Result};

/// PostgreSQL implementation of CallbackLogRepository.
pub struct PgCallbackLogRepository {
    pool: Pool<Postgres>,
}

impl PgCallbackLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallbackLogRepository for PgCallbackLogRepository {
    async fn record(&self, record: &CallbackRecord) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO provider_callbacks (id, task_id, callback_type, payload, received_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&record.task_id)
        .bind(&record.callback_type)
        .bind(&record.payload)
        .bind(record.received_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }
}
