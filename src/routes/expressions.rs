// SPDX-License-Identifier: MIT

//! Definition expression endpoint.

use crate::models::SelectionState;
use crate::services::expression::{self, DefinitionExpressions};
use crate::AppState;
use axum::{routing::post, Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/expressions", post(compile_expressions))
}

/// Compile a filter selection into per-table definition expressions.
async fn compile_expressions(Json(selection): Json<SelectionState>) -> Json<DefinitionExpressions> {
    let expressions = expression::compile(&selection);

    tracing::debug!(
        centroids = %expressions.centroids,
        "Definition expressions compiled"
    );

    Json(expressions)
}
