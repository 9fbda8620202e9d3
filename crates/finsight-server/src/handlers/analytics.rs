//! Snapshot, ingestion and configuration handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::{AppError, AppState, MAX_UPLOAD_SIZE};
use finsight_core::{AnalyticsConfig, AnalyticsSnapshot, FacadeState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: FacadeState,
}

/// Liveness probe
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        state: state.gate.state(),
    })
}

/// Current snapshot; never waits on an in-flight ingestion
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<Arc<AnalyticsSnapshot>> {
    Json(state.gate.snapshot())
}

/// Ingest raw CSV text from the request body
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<Arc<AnalyticsSnapshot>>, AppError> {
    debug!(bytes = body.len(), "Ingest request");
    let snapshot = state.gate.ingest(body).await?;
    Ok(Json(snapshot))
}

/// Ingest a CSV file from a multipart form
///
/// Expects multipart form with:
/// - file: CSV file (required, max 10MB)
pub async fn ingest_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Arc<AnalyticsSnapshot>>, AppError> {
    let mut file_data: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(e.status(), "bad_request", &format!("Failed to read form field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::new(e.status(), "bad_request", "Failed to read file data"))?;

        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(AppError::payload_too_large());
        }

        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| AppError::bad_request("File is not valid UTF-8 text"))?;
        file_data = Some(text);
    }

    let raw = file_data.ok_or_else(|| AppError::bad_request("Missing file field"))?;
    debug!(bytes = raw.len(), "Upload ingest request");

    let snapshot = state.gate.ingest(raw).await?;
    Ok(Json(snapshot))
}

/// Active analytics configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<AnalyticsConfig> {
    Json(state.gate.config().clone())
}
