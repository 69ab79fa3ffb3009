// SPDX-License-Identifier: MIT

//! Esri JSON geometry model and conversion to `geo` types.
//!
//! The wire format follows the ArcGIS REST conventions: polygons carry
//! `rings`, polylines carry `paths`, points carry `x`/`y`, and any of them
//! may carry a `spatialReference.wkid`. Ring orientation follows the Esri
//! convention (exterior rings clockwise, holes counter-clockwise).

use geo::{Contains, Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Web Mercator (the input default).
pub const WKID_WEB_MERCATOR: u32 = 3857;
/// UTM Zone 12N / NAD83, the planar measurement frame for the service region.
pub const WKID_UTM_ZONE_12N: u32 = 26912;
/// WGS84 geographic coordinates.
pub const WKID_WGS84: u32 = 4326;

/// Spatial reference by well-known id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialReference {
    pub wkid: u32,
}

/// An Esri JSON geometry. Exactly one of `rings`, `paths`, or `x`/`y` is
/// expected to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsriGeometry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rings: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<Vec<Vec<f64>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
}

/// Geometry converted into `geo` types for planar operations.
#[derive(Debug, Clone)]
pub enum GeoShape {
    Polygon(MultiPolygon<f64>),
    Line(MultiLineString<f64>),
    Point(Point<f64>),
}

impl EsriGeometry {
    /// The Esri REST `geometryType` query value, derived from which
    /// coordinate fields are present.
    pub fn esri_geometry_type(&self) -> Option<&'static str> {
        if self.rings.is_some() {
            return Some("esriGeometryPolygon");
        }
        if self.paths.is_some() {
            return Some("esriGeometryPolyline");
        }
        if self.x.is_some() && self.y.is_some() {
            return Some("esriGeometryPoint");
        }
        None
    }

    /// The declared spatial reference, or `default_wkid` if unset.
    pub fn wkid_or(&self, default_wkid: u32) -> u32 {
        self.spatial_reference.map(|sr| sr.wkid).unwrap_or(default_wkid)
    }

    /// Convert to `geo` types. Returns `None` for geometries with no
    /// recognizable coordinate fields or with degenerate rings/paths.
    pub fn to_shape(&self) -> Option<GeoShape> {
        if let Some(rings) = &self.rings {
            return rings_to_multi_polygon(rings).map(GeoShape::Polygon);
        }

        if let Some(paths) = &self.paths {
            let lines: Vec<LineString<f64>> = paths
                .iter()
                .map(|path| LineString::from(coords_of(path)))
                .filter(|line| line.0.len() >= 2)
                .collect();

            if lines.is_empty() {
                return None;
            }
            return Some(GeoShape::Line(MultiLineString::new(lines)));
        }

        if let (Some(x), Some(y)) = (self.x, self.y) {
            return Some(GeoShape::Point(Point::new(x, y)));
        }

        None
    }
}

fn coords_of(ring: &[Vec<f64>]) -> Vec<Coord<f64>> {
    // Coordinates may carry z/m values; only x and y are used.
    ring.iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect()
}

/// Shoelace sum of a ring; positive for clockwise rings in a y-up coordinate
/// system, which Esri uses for exterior rings.
fn ring_signed_area(coords: &[Coord<f64>]) -> f64 {
    let mut sum = 0.0;
    for pair in coords.windows(2) {
        sum += (pair[1].x - pair[0].x) * (pair[1].y + pair[0].y);
    }
    sum / 2.0
}

/// Assemble Esri rings into a MultiPolygon, assigning each hole to the first
/// exterior ring that contains it.
fn rings_to_multi_polygon(rings: &[Vec<Vec<f64>>]) -> Option<MultiPolygon<f64>> {
    let mut exteriors: Vec<LineString<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        let coords = coords_of(ring);
        if coords.len() < 4 {
            continue;
        }

        if ring_signed_area(&coords) > 0.0 {
            exteriors.push(LineString::from(coords));
        } else {
            holes.push(LineString::from(coords));
        }
    }

    // Data that ignores the orientation convention: treat every ring as an
    // exterior rather than dropping the geometry.
    if exteriors.is_empty() {
        exteriors = std::mem::take(&mut holes);
    }

    if exteriors.is_empty() {
        return None;
    }

    let mut polygons: Vec<Polygon<f64>> = exteriors
        .into_iter()
        .map(|ext| Polygon::new(ext, vec![]))
        .collect();

    for hole in holes {
        let anchor = hole.0.first().copied();
        let owner = polygons.iter_mut().find(|p| {
            anchor.is_some_and(|c| p.exterior_coords_contain(&c))
        });

        match owner {
            Some(polygon) => polygon.interiors_push(hole),
            // Orphan hole: keep the polygon, drop the hole.
            None => tracing::debug!("Dropping hole ring with no containing exterior"),
        }
    }

    Some(MultiPolygon::new(polygons))
}

trait ExteriorContains {
    fn exterior_coords_contain(&self, coord: &Coord<f64>) -> bool;
}

impl ExteriorContains for Polygon<f64> {
    fn exterior_coords_contain(&self, coord: &Coord<f64>) -> bool {
        let shell = Polygon::new(self.exterior().clone(), vec![]);
        shell.contains(&Point::new(coord.x, coord.y))
    }
}
