//! Provider callback endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value as JsonValue};

use cadence_jobs::{CallbackDisposition, Resolution};

use crate::error::ApiError;
use crate::AppState;

fn disposition_label(disposition: &CallbackDisposition) -> &'static str {
    match disposition {
        CallbackDisposition::Intermediate => "intermediate",
        CallbackDisposition::AlreadyResolved { .. } => "already_resolved",
        CallbackDisposition::Unrecognized { .. } => "unrecognized",
        CallbackDisposition::Applied(resolution) => match resolution {
            Resolution::Completed { .. } => "completed",
            Resolution::Failed { .. } => "failed",
            Resolution::Rejected { .. } => "rejected",
            Resolution::Unchanged { .. } => "unchanged",
            Resolution::AlreadyResolved => "already_resolved",
        },
    }
}

/// Receive one provider completion notice.
///
/// Bodies that are not JSON are still handed to the receiver as a string so
/// they reach the callback log before being refused with 400.
pub async fn receive(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JsonValue>, ApiError> {
    let payload: JsonValue = serde_json::from_slice(&body)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&body).into_owned()));

    let disposition = state.callbacks.on_callback(&payload).await?;

    Ok(Json(json!({
        "status": "received",
        "disposition": disposition_label(&disposition),
    })))
}
