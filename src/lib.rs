// SPDX-License-Identifier: MIT

//! WRI Map API: backend for the Watershed Restoration Initiative map.
//!
//! Compiles map filter selections into per-table SQL definition expressions
//! and extracts reference-layer intersections for drawn project geometries.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use services::ExtractionService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub extractions: ExtractionService,
}
