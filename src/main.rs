// SPDX-License-Identifier: MIT

//! WRI Map API Server
//!
//! Serves definition expression compilation and reference-layer geometry
//! extraction for the Watershed Restoration Initiative map.

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wri_map_api::{
    config::Config,
    services::{ArcGisClient, ExtractionService, LayerRegistry},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting WRI Map API");

    // Feature service client with the configured request timeout
    let client = ArcGisClient::new(Duration::from_secs(config.service_timeout_secs))
        .expect("Failed to build HTTP client");
    let extractions = ExtractionService::new(client, LayerRegistry::default());

    // Build shared state
    let state = Arc::new(AppState { config: config.clone(), extractions });

    // Build router
    let app = wri_map_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wri_map_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
