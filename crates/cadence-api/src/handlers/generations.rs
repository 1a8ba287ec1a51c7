//! Submission and lookup of generation jobs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::defaults::PAGE_LIMIT;
use cadence_core::{CatalogEntry, GenerationJob};
use cadence_jobs::SubmitGenerationRequest;

use crate::error::ApiError;
use crate::AppState;

const MAX_PAGE_LIMIT: i64 = 500;

/// A job row together with the variant rows fanned out from it.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    #[serde(flatten)]
    pub generation: GenerationJob,
    pub variants: Vec<GenerationJob>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    pub limit: Option<i64>,
}

/// Submit a generation to the provider; answers 201 with the `processing` job.
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitGenerationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.gateway.submit(req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let generation = state
        .generations
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("generation {} not found", id)))?;
    let variants = if generation.is_additional_variant {
        Vec::new()
    } else {
        state.generations.list_variants(id).await?
    };
    Ok(Json(GenerationResponse {
        generation,
        variants,
    }))
}

/// Catalog entries for an owner, newest first.
pub async fn list_library(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
    Query(query): Query<LibraryQuery>,
) -> Result<Json<Vec<CatalogEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    Ok(Json(state.catalog.list_for_owner(owner_id, limit).await?))
}
