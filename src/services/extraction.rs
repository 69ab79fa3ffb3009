// SPDX-License-Identifier: MIT

//! Geometry extraction: intersect an input shape with reference layers and
//! roll the overlaps up by attribute combination.
//!
//! For each requested layer the pipeline queries the remote feature service,
//! intersects every returned feature with the input shape client-side, groups
//! the pieces by the requested attribute values, unions each group into one
//! geometry, and measures it according to the layer's measure mode.

use crate::error::AppError;
use crate::models::geometry::{EsriGeometry, GeoShape, WKID_WEB_MERCATOR};
use crate::services::arcgis::{ArcGisClient, LayerConfig, LayerName, LayerRegistry, MeasureMode, RemoteFeature};
use crate::services::projection;
use geo::{
    Area, BooleanOps, BoundingRect, Euclidean, Intersects, Length, LineString, MultiLineString,
    Rect,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

pub const SQUARE_METERS_TO_ACRES: f64 = 0.000247105;
pub const METERS_TO_MILES: f64 = 0.000621371;

/// Criteria for one layer in an extraction request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LayerCriteria {
    /// Attribute fields to group intersections by.
    #[validate(length(min = 1, max = 10, message = "attributes must list 1 to 10 fields"))]
    pub attributes: Vec<String>,
}

/// Requested layers and their grouping attributes, keyed by layer name.
pub type ExtractionCriteria = BTreeMap<String, LayerCriteria>;

/// One rolled-up intersection: the grouped attribute values plus its size.
#[derive(Debug, Clone, Serialize)]
pub struct IntersectionRecord {
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Acres or miles depending on the layer's measure mode.
    pub size: f64,
    #[serde(rename = "displaySize")]
    pub display_size: String,
}

/// Layers with at least one intersection, keyed by layer name. Layers with
/// no overlap are omitted entirely.
pub type ExtractionResults = BTreeMap<LayerName, Vec<IntersectionRecord>>;

/// Extraction service over a set of reference layers.
#[derive(Debug, Clone)]
pub struct ExtractionService {
    client: ArcGisClient,
    registry: LayerRegistry,
}

impl ExtractionService {
    pub fn new(client: ArcGisClient, registry: LayerRegistry) -> Self {
        Self { client, registry }
    }

    /// Run the extraction for every requested layer. Unknown layer names are
    /// logged and skipped; a failure on a known layer fails the whole
    /// request rather than returning partial results.
    pub async fn extract(
        &self,
        geometry: &EsriGeometry,
        criteria: &ExtractionCriteria,
    ) -> Result<ExtractionResults, AppError> {
        let shape = geometry.to_shape().ok_or_else(|| {
            AppError::BadRequest("Input geometry has no recognizable coordinates".to_string())
        })?;
        let wkid = geometry.wkid_or(WKID_WEB_MERCATOR);
        let clip = ClipShape::new(projection::project_to_utm(&shape, wkid)?);

        let mut results = ExtractionResults::new();

        for (name, layer_criteria) in criteria {
            let Some(layer) = LayerName::from_name(name) else {
                tracing::warn!(layer = %name, "Ignoring unknown layer");
                continue;
            };
            let config = self.registry.get(layer);

            match self.process_layer(layer, config, geometry, &clip, layer_criteria).await {
                Ok(records) if !records.is_empty() => {
                    results.insert(layer, records);
                }
                Ok(_) => {
                    tracing::debug!(layer = %name, "No intersections");
                }
                Err(e) => {
                    tracing::error!(layer = %name, error = %e, "Layer extraction failed");
                    return Err(e);
                }
            }
        }

        Ok(results)
    }

    async fn process_layer(
        &self,
        layer: LayerName,
        config: &LayerConfig,
        geometry: &EsriGeometry,
        clip: &ClipShape,
        criteria: &LayerCriteria,
    ) -> Result<Vec<IntersectionRecord>, AppError> {
        let features = self
            .client
            .query_intersecting(&config.url, geometry, config.attributes)
            .await?;

        tracing::debug!(layer = %layer.as_str(), count = features.len(), "Features fetched");

        let groups = group_intersections(clip, &features, &criteria.attributes);

        let mut records = Vec::with_capacity(groups.len());
        for group in groups {
            let Some(merged) = union_shapes(group.pieces) else {
                continue;
            };

            match measure(&merged, config.measure) {
                Some((size, display_size)) => records.push(IntersectionRecord {
                    attributes: group.attributes,
                    size,
                    display_size,
                }),
                None => tracing::warn!(
                    layer = %layer.as_str(),
                    "Skipping group whose geometry does not match the layer's measure mode"
                ),
            }
        }

        Ok(records)
    }
}

struct Group {
    attributes: BTreeMap<String, serde_json::Value>,
    pieces: Vec<GeoShape>,
}

/// Intersect each feature with the input shape and bucket the resulting
/// pieces by their grouped attribute values. Groups keep first-seen order.
fn group_intersections(
    clip: &ClipShape,
    features: &[RemoteFeature],
    attributes: &[String],
) -> Vec<Group> {
    let mut groups: Vec<(String, Group)> = Vec::new();

    for feature in features {
        let Some(shape) = feature.geometry.as_ref().and_then(EsriGeometry::to_shape) else {
            tracing::debug!("Skipping feature without usable geometry");
            continue;
        };

        let Some(piece) = clip.intersection(&shape) else {
            continue;
        };

        let grouped = grouped_attributes(&feature.attributes, attributes);
        let key = canonical_key(&grouped);

        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.pieces.push(piece),
            None => groups.push((
                key,
                Group { attributes: grouped, pieces: vec![piece] },
            )),
        }
    }

    groups.into_iter().map(|(_, group)| group).collect()
}

/// Project a feature's attributes onto the requested fields, lower-casing
/// the field names. Null or missing values are omitted.
fn grouped_attributes(
    attributes: &serde_json::Map<String, serde_json::Value>,
    fields: &[String],
) -> BTreeMap<String, serde_json::Value> {
    let mut grouped = BTreeMap::new();
    for field in fields {
        match attributes.get(field) {
            Some(value) if !value.is_null() => {
                grouped.insert(field.to_lowercase(), value.clone());
            }
            _ => {}
        }
    }
    grouped
}

/// Order-stable group key: BTreeMap iteration is sorted by field name, so
/// the serialized form is canonical regardless of request field order.
fn canonical_key(attributes: &BTreeMap<String, serde_json::Value>) -> String {
    serde_json::to_string(attributes).unwrap_or_default()
}

/// Union a group's pieces into one geometry. All pieces of a group share a
/// kind because they were clipped from the same pair of inputs.
fn union_shapes(pieces: Vec<GeoShape>) -> Option<GeoShape> {
    let mut iter = pieces.into_iter();
    let first = iter.next()?;

    match first {
        GeoShape::Polygon(mut merged) => {
            for piece in iter {
                if let GeoShape::Polygon(mp) = piece {
                    merged = merged.union(&mp);
                }
            }
            Some(GeoShape::Polygon(merged))
        }
        GeoShape::Line(first) => {
            let mut merged = MultiLineString::new(Vec::new());
            push_unique_lines(&mut merged, first);
            for piece in iter {
                if let GeoShape::Line(ml) = piece {
                    push_unique_lines(&mut merged, ml);
                }
            }
            Some(GeoShape::Line(merged))
        }
        GeoShape::Point(p) => Some(GeoShape::Point(p)),
    }
}

/// Append line parts, dropping any coincident with a part already merged
/// (same coordinates in either direction). Duplicate same-attribute stream
/// segments would otherwise be measured twice.
fn push_unique_lines(merged: &mut MultiLineString<f64>, lines: MultiLineString<f64>) {
    for line in lines.0 {
        if !merged.0.iter().any(|existing| coincident_lines(existing, &line)) {
            merged.0.push(line);
        }
    }
}

fn coincident_lines(a: &LineString<f64>, b: &LineString<f64>) -> bool {
    if a.0.len() != b.0.len() {
        return false;
    }
    a.0 == b.0 || a.0.iter().rev().eq(b.0.iter())
}

/// Measure a merged geometry in the layer's unit. Returns `None` when the
/// geometry kind does not fit the measure mode.
fn measure(shape: &GeoShape, mode: MeasureMode) -> Option<(f64, String)> {
    match (mode, shape) {
        (MeasureMode::Area, GeoShape::Polygon(mp)) => {
            let square_meters = mp.unsigned_area();
            Some((square_meters * SQUARE_METERS_TO_ACRES, format_acres(square_meters)))
        }
        (MeasureMode::Length, GeoShape::Line(ml)) => {
            let meters = Euclidean.length(ml);
            Some((meters * METERS_TO_MILES, format_miles(meters)))
        }
        _ => None,
    }
}

/// The input shape plus its bounding rectangle for a cheap rejection test
/// before the boolean operations.
pub struct ClipShape {
    shape: GeoShape,
    bounds: Option<Rect<f64>>,
}

impl ClipShape {
    pub fn new(shape: GeoShape) -> Self {
        let bounds = match &shape {
            GeoShape::Polygon(mp) => mp.bounding_rect(),
            GeoShape::Line(ml) => ml.bounding_rect(),
            GeoShape::Point(p) => Some(p.bounding_rect()),
        };
        Self { shape, bounds }
    }

    /// Intersection of the input shape with a layer feature, or `None` when
    /// they do not overlap. Lines against polygons clip to the polygon;
    /// points survive unchanged when contained.
    pub fn intersection(&self, other: &GeoShape) -> Option<GeoShape> {
        let other_bounds = match other {
            GeoShape::Polygon(mp) => mp.bounding_rect(),
            GeoShape::Line(ml) => ml.bounding_rect(),
            GeoShape::Point(p) => Some(p.bounding_rect()),
        };
        if let (Some(a), Some(b)) = (&self.bounds, &other_bounds) {
            if !a.intersects(b) {
                return None;
            }
        }

        match (&self.shape, other) {
            (GeoShape::Polygon(a), GeoShape::Polygon(b)) => {
                let overlap = a.intersection(b);
                (!overlap.0.is_empty()).then(|| GeoShape::Polygon(overlap))
            }
            (GeoShape::Polygon(a), GeoShape::Line(b)) => {
                let clipped = a.clip(b, false);
                (!clipped.0.is_empty()).then(|| GeoShape::Line(clipped))
            }
            (GeoShape::Line(a), GeoShape::Polygon(b)) => {
                let clipped = b.clip(a, false);
                (!clipped.0.is_empty()).then(|| GeoShape::Line(clipped))
            }
            (GeoShape::Polygon(a), GeoShape::Point(p)) => {
                a.intersects(p).then(|| GeoShape::Point(*p))
            }
            (GeoShape::Point(p), GeoShape::Polygon(b)) => {
                b.intersects(p).then(|| GeoShape::Point(*p))
            }
            _ => None,
        }
    }
}

/// Format an area given in square meters as acres, e.g. `"5,825.92 ac"`.
pub fn format_acres(square_meters: f64) -> String {
    let acres = square_meters * SQUARE_METERS_TO_ACRES;
    if acres < 0.01 {
        return "< 0.01 ac".to_string();
    }
    format!("{} ac", with_thousands_separators(acres))
}

/// Format a length given in meters as miles, e.g. `"12.41 mi"`.
pub fn format_miles(meters: f64) -> String {
    let miles = meters * METERS_TO_MILES;
    if miles < 0.01 {
        return "< 0.01 mi".to_string();
    }
    format!("{} mi", with_thousands_separators(miles))
}

/// Two decimal places with `en-US` style thousands separators.
fn with_thousands_separators(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (integer, fraction) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), "00"),
    };

    let digits = integer.as_bytes();
    let mut out = String::with_capacity(fixed.len() + digits.len() / 3);
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*digit as char);
    }

    out.push('.');
    out.push_str(fraction);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, LineString, MultiLineString, MultiPolygon, Point};
    use serde_json::json;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn test_format_acres_baseline() {
        assert_eq!(format_acres(23_576_683.0), "5,825.92 ac");
        assert_eq!(format_acres(10.0), "< 0.01 ac");
        assert_eq!(format_acres(4_046.8564224), "1.00 ac");
    }

    #[test]
    fn test_format_miles_baseline() {
        assert_eq!(format_miles(19_975.96), "12.41 mi");
        assert_eq!(format_miles(1.0), "< 0.01 mi");
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(with_thousands_separators(1_234_567.891), "1,234,567.89");
        assert_eq!(with_thousands_separators(999.995), "1,000.00");
        assert_eq!(with_thousands_separators(12.0), "12.00");
    }

    #[test]
    fn test_polygon_intersection_clips_to_overlap() {
        let clip = ClipShape::new(GeoShape::Polygon(square(0.0, 0.0, 100.0, 100.0)));
        let feature = GeoShape::Polygon(square(50.0, 0.0, 200.0, 100.0));

        match clip.intersection(&feature) {
            Some(GeoShape::Polygon(mp)) => {
                assert!((mp.unsigned_area() - 5_000.0).abs() < 1e-6);
            }
            other => panic!("expected polygon overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_disjoint_bounds_short_circuit() {
        let clip = ClipShape::new(GeoShape::Polygon(square(0.0, 0.0, 10.0, 10.0)));
        let feature = GeoShape::Polygon(square(1_000.0, 1_000.0, 1_010.0, 1_010.0));
        assert!(clip.intersection(&feature).is_none());
    }

    #[test]
    fn test_line_clipped_by_polygon() {
        let clip = ClipShape::new(GeoShape::Polygon(square(0.0, 0.0, 100.0, 100.0)));
        let stream = GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
            (-50.0, 50.0),
            (150.0, 50.0),
        ])]));

        match clip.intersection(&stream) {
            Some(GeoShape::Line(ml)) => {
                assert!((Euclidean.length(&ml) - 100.0).abs() < 1e-6);
            }
            other => panic!("expected clipped line, got {other:?}"),
        }
    }

    #[test]
    fn test_contained_point_survives() {
        let clip = ClipShape::new(GeoShape::Polygon(square(0.0, 0.0, 100.0, 100.0)));
        let inside = GeoShape::Point(Point::new(10.0, 10.0));
        let outside = GeoShape::Point(Point::new(-10.0, 10.0));

        assert!(matches!(clip.intersection(&inside), Some(GeoShape::Point(_))));
        assert!(clip.intersection(&outside).is_none());
    }

    #[test]
    fn test_grouped_attributes_lowercase_and_omit_nulls() {
        let mut attrs = serde_json::Map::new();
        attrs.insert("NAME".to_string(), json!("Beaver"));
        attrs.insert("Owner".to_string(), serde_json::Value::Null);

        let grouped = grouped_attributes(
            &attrs,
            &["NAME".to_string(), "Owner".to_string(), "Missing".to_string()],
        );

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.get("name"), Some(&json!("Beaver")));
    }

    #[test]
    fn test_canonical_key_ignores_field_order() {
        let mut attrs = serde_json::Map::new();
        attrs.insert("owner".to_string(), json!("BLM"));
        attrs.insert("admin".to_string(), json!("Federal"));

        let a = grouped_attributes(&attrs, &["owner".to_string(), "admin".to_string()]);
        let b = grouped_attributes(&attrs, &["admin".to_string(), "owner".to_string()]);
        assert_eq!(canonical_key(&a), canonical_key(&b));
    }

    #[test]
    fn test_union_merges_disjoint_polygons() {
        let merged = union_shapes(vec![
            GeoShape::Polygon(square(0.0, 0.0, 10.0, 10.0)),
            GeoShape::Polygon(square(20.0, 0.0, 30.0, 10.0)),
        ]);

        match merged {
            Some(GeoShape::Polygon(mp)) => {
                assert!((mp.unsigned_area() - 200.0).abs() < 1e-6);
            }
            other => panic!("expected merged polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_overlapping_union_does_not_double_count() {
        let merged = union_shapes(vec![
            GeoShape::Polygon(square(0.0, 0.0, 10.0, 10.0)),
            GeoShape::Polygon(square(5.0, 0.0, 15.0, 10.0)),
        ]);

        match merged {
            Some(GeoShape::Polygon(mp)) => {
                assert!((mp.unsigned_area() - 150.0).abs() < 1e-6);
            }
            other => panic!("expected merged polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_union_drops_coincident_line_pieces() {
        // The same stream segment returned twice for one attribute group
        // must be measured once, not summed.
        let segment = || {
            GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
                (0.0, 0.0),
                (1000.0, 0.0),
            ])]))
        };
        let reversed = GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
            (1000.0, 0.0),
            (0.0, 0.0),
        ])]));

        let merged = union_shapes(vec![segment(), segment(), reversed]);

        match merged {
            Some(GeoShape::Line(ml)) => {
                assert_eq!(ml.0.len(), 1);
                assert!((Euclidean.length(&ml) - 1000.0).abs() < 1e-9);
            }
            other => panic!("expected merged line, got {other:?}"),
        }

        let merged = union_shapes(vec![segment(), segment()]);
        match measure(&merged.expect("merged line"), MeasureMode::Length) {
            Some((size, _)) => assert!((size - 1000.0 * 0.000621371).abs() < 1e-9),
            None => panic!("expected length measurement"),
        }
    }

    #[test]
    fn test_union_keeps_distinct_line_pieces() {
        let merged = union_shapes(vec![
            GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
                (0.0, 0.0),
                (1000.0, 0.0),
            ])])),
            GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
                (0.0, 500.0),
                (1000.0, 500.0),
            ])])),
        ]);

        match merged {
            Some(GeoShape::Line(ml)) => {
                assert_eq!(ml.0.len(), 2);
                assert!((Euclidean.length(&ml) - 2000.0).abs() < 1e-9);
            }
            other => panic!("expected merged line, got {other:?}"),
        }
    }

    #[test]
    fn test_measure_mode_mismatch_is_skipped() {
        let point = GeoShape::Point(Point::new(0.0, 0.0));
        assert!(measure(&point, MeasureMode::Area).is_none());

        let line = GeoShape::Line(MultiLineString::new(vec![LineString::from(vec![
            (0.0, 0.0),
            (100.0, 0.0),
        ])]));
        assert!(measure(&line, MeasureMode::Area).is_none());
        assert!(measure(&line, MeasureMode::Length).is_some());
    }
}
