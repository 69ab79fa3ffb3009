// SPDX-License-Identifier: MIT

//! ArcGIS feature service client and the reference layer registry.
//!
//! Queries are spatial-intersection queries against hosted feature layers.
//! Services cap page sizes server-side and signal truncation with
//! `exceededTransferLimit`, so the client pages with `resultOffset` until a
//! complete result set is assembled.

use crate::error::AppError;
use crate::models::geometry::{EsriGeometry, WKID_UTM_ZONE_12N};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transient GET failures are retried this many times before giving up.
const MAX_GET_RETRIES: u32 = 2;

/// How a layer's intersections are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode {
    /// Polygon overlap, reported in acres.
    Area,
    /// Clipped polyline length, reported in miles.
    Length,
}

/// Reference layers available for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerName {
    County,
    Landowner,
    Sgma,
    Stream,
}

impl LayerName {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "county" => Some(LayerName::County),
            "landowner" => Some(LayerName::Landowner),
            "sgma" => Some(LayerName::Sgma),
            "stream" => Some(LayerName::Stream),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayerName::County => "county",
            LayerName::Landowner => "landowner",
            LayerName::Sgma => "sgma",
            LayerName::Stream => "stream",
        }
    }
}

/// Configuration for one reference layer.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Feature layer query endpoint (the `/query` suffix is appended).
    pub url: String,
    /// Attribute fields requested from the service and carried into records.
    pub attributes: &'static [&'static str],
    pub measure: MeasureMode,
}

/// The set of reference layers, keyed by [`LayerName`]. Injectable so tests
/// can point layers at a local mock service.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    county: LayerConfig,
    landowner: LayerConfig,
    sgma: LayerConfig,
    stream: LayerConfig,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self {
            county: LayerConfig {
                url: "https://services1.arcgis.com/99lidPhWCzftIe9K/ArcGIS/rest/services/UtahCountyBoundaries/FeatureServer/0".to_string(),
                attributes: &["NAME"],
                measure: MeasureMode::Area,
            },
            landowner: LayerConfig {
                url: "https://gis.trustlands.utah.gov/mapping/rest/services/Land_Ownership/FeatureServer/0".to_string(),
                attributes: &["owner", "admin"],
                measure: MeasureMode::Area,
            },
            sgma: LayerConfig {
                url: "https://dwrmapserv.utah.gov/dwrarcgis/rest/services/Sage_grouse/SGMA_outlines/FeatureServer/0".to_string(),
                attributes: &["Area_name"],
                measure: MeasureMode::Area,
            },
            stream: LayerConfig {
                url: "https://services1.arcgis.com/99lidPhWCzftIe9K/ArcGIS/rest/services/UtahStreamsNHD/FeatureServer/0".to_string(),
                attributes: &["FCode_Text"],
                measure: MeasureMode::Length,
            },
        }
    }
}

impl LayerRegistry {
    pub fn get(&self, layer: LayerName) -> &LayerConfig {
        match layer {
            LayerName::County => &self.county,
            LayerName::Landowner => &self.landowner,
            LayerName::Sgma => &self.sgma,
            LayerName::Stream => &self.stream,
        }
    }

    /// Replace a layer's endpoint. Used by tests to target a mock service.
    pub fn set_url(&mut self, layer: LayerName, url: String) {
        let config = match layer {
            LayerName::County => &mut self.county,
            LayerName::Landowner => &mut self.landowner,
            LayerName::Sgma => &mut self.sgma,
            LayerName::Stream => &mut self.stream,
        };
        config.url = url;
    }
}

/// One feature returned from a query.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFeature {
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub geometry: Option<EsriGeometry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    features: Vec<RemoteFeature>,
    #[serde(default)]
    exceeded_transfer_limit: bool,
    error: Option<ServiceError>,
}

/// ArcGIS reports errors in a 200 response body rather than via HTTP status.
#[derive(Debug, Deserialize)]
struct ServiceError {
    code: Option<i64>,
    message: Option<String>,
}

/// HTTP client for ArcGIS feature service queries.
#[derive(Debug, Clone)]
pub struct ArcGisClient {
    http: reqwest::Client,
}

impl ArcGisClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Query all features of a layer intersecting `geometry`, following
    /// `exceededTransferLimit` pagination until the result set is complete.
    /// Results are returned in UTM Zone 12N.
    pub async fn query_intersecting(
        &self,
        layer_url: &str,
        geometry: &EsriGeometry,
        out_fields: &[&str],
    ) -> Result<Vec<RemoteFeature>, AppError> {
        let geometry_type = geometry.esri_geometry_type().ok_or_else(|| {
            AppError::BadRequest("Input geometry has no recognizable coordinates".to_string())
        })?;
        let geometry_json = serde_json::to_string(geometry)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode geometry: {e}")))?;

        let query_url = format!("{layer_url}/query");
        let mut features: Vec<RemoteFeature> = Vec::new();

        loop {
            let params = [
                ("f", "json".to_string()),
                ("geometry", geometry_json.clone()),
                ("geometryType", geometry_type.to_string()),
                ("spatialRel", "esriSpatialRelIntersects".to_string()),
                ("outFields", out_fields.join(",")),
                ("returnGeometry", "true".to_string()),
                ("outSR", WKID_UTM_ZONE_12N.to_string()),
                ("resultOffset", features.len().to_string()),
            ];

            let page = self.get_page(&query_url, &params).await?;

            if let Some(error) = page.error {
                return Err(AppError::FeatureService(format!(
                    "Feature service error {}: {}",
                    error.code.unwrap_or_default(),
                    error.message.unwrap_or_else(|| "unknown".to_string()),
                )));
            }

            let received = page.features.len();
            features.extend(page.features);

            // A truncated page with zero features would never terminate.
            if !page.exceeded_transfer_limit || received == 0 {
                break;
            }

            tracing::debug!(
                url = %query_url,
                offset = features.len(),
                "Transfer limit exceeded, fetching next page"
            );
        }

        Ok(features)
    }

    async fn get_page(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<QueryResponse, AppError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = self.http.get(url).query(params).send().await;
            let retryable = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };

            if retryable && attempt <= MAX_GET_RETRIES {
                tracing::warn!(url = %url, attempt, "Feature service request failed, retrying");
                continue;
            }

            let response = result
                .map_err(|e| AppError::FeatureService(format!("Request failed: {e}")))?;

            if !response.status().is_success() {
                return Err(AppError::FeatureService(format!(
                    "Feature service returned HTTP {}",
                    response.status()
                )));
            }

            return response
                .json::<QueryResponse>()
                .await
                .map_err(|e| AppError::FeatureService(format!("Invalid response body: {e}")));
        }
    }
}
