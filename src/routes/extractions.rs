// SPDX-License-Identifier: MIT

//! Geometry extraction endpoint.

use crate::error::AppError;
use crate::models::EsriGeometry;
use crate::services::extraction::{ExtractionCriteria, ExtractionResults};
use crate::AppState;
use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/extractions", post(extract_intersections))
}

#[derive(Debug, Deserialize)]
pub struct ExtractionRequest {
    pub geometry: Option<EsriGeometry>,
    pub criteria: ExtractionCriteria,
}

/// Intersect the posted geometry with the requested reference layers.
async fn extract_intersections(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractionRequest>,
) -> Result<Json<ExtractionResults>, AppError> {
    let geometry = request
        .geometry
        .ok_or_else(|| AppError::BadRequest("Missing input geometry".to_string()))?;

    if request.criteria.is_empty() {
        return Err(AppError::BadRequest(
            "At least one layer must be requested".to_string(),
        ));
    }
    for (layer, criteria) in &request.criteria {
        criteria
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid criteria for {layer}: {e}")))?;
    }

    let results = state.extractions.extract(&geometry, &request.criteria).await?;
    Ok(Json(results))
}
