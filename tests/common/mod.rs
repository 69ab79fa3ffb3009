// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;
use wri_map_api::config::Config;
use wri_map_api::routes::create_router;
use wri_map_api::services::{ArcGisClient, ExtractionService, LayerRegistry};
use wri_map_api::AppState;

/// Create a test app with the default layer registry.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let extractions = test_extraction_service(LayerRegistry::default());

    let state = Arc::new(AppState { config, extractions });
    (create_router(state.clone()), state)
}

/// Build an extraction service with a short request timeout.
#[allow(dead_code)]
pub fn test_extraction_service(registry: LayerRegistry) -> ExtractionService {
    let client = ArcGisClient::new(Duration::from_secs(5)).expect("Failed to build HTTP client");
    ExtractionService::new(client, registry)
}

/// Serve a mock feature service on an ephemeral port, returning its base URL.
#[allow(dead_code)]
pub async fn spawn_mock_service(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock service");
    let addr = listener.local_addr().expect("Mock service has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock service failed");
    });

    format!("http://{addr}")
}
