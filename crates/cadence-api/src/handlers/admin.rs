//! Administrative recovery and provider account endpoints.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

use cadence_core::{RecoveryMethod, ReconcileFilter};
use cadence_jobs::BatchReport;

use crate::error::ApiError;
use crate::AppState;

/// Run one batch recovery. An empty body reconciles every `processing` job.
pub async fn reconcile_all(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    let filter: ReconcileFilter = if body.iter().all(u8::is_ascii_whitespace) {
        ReconcileFilter::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid reconcile filter: {}", e)))?
    };
    filter.validate()?;

    info!(
        subsystem = "api",
        component = "admin",
        op = "reconcile_all",
        filter = ?filter,
        "Admin sweep requested"
    );
    let report = state
        .engine
        .reconcile_all(&filter, RecoveryMethod::AdminSweep)
        .await?;
    Ok(Json(report))
}

pub async fn reconcile_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = state
        .engine
        .reconcile_one(id, RecoveryMethod::AdminSweep)
        .await?;
    Ok(Json(report))
}

pub async fn credits(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
    let credits = state.provider.credits().await?;
    Ok(Json(json!({ "credits": credits })))
}
