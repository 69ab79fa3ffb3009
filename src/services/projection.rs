// SPDX-License-Identifier: MIT

//! Coordinate projection into the planar measurement frame.
//!
//! All area and length math happens in UTM Zone 12N (EPSG:26912), which is
//! planar over the service region. Inputs arrive in Web Mercator (3857,
//! the default), WGS84 (4326), or already-projected UTM (26912).

use crate::error::AppError;
use crate::models::geometry::{GeoShape, WKID_UTM_ZONE_12N, WKID_WEB_MERCATOR, WKID_WGS84};
use geo::{Coord, MapCoords};
use proj4rs::Proj;
use std::sync::OnceLock;

/// WGS84 geographic coordinates (proj4rs works in radians for longlat).
const WGS84_DEF: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// EPSG:26912 expressed as explicit transverse Mercator parameters
/// (zone 12N: central meridian 111°W, GRS80/NAD83).
const UTM_ZONE_12N_DEF: &str =
    "+proj=tmerc +lat_0=0 +lon_0=-111 +k=0.9996 +x_0=500000 +y_0=0 \
     +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs";

/// Web Mercator sphere radius in meters.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Process-wide projection definitions, parsed exactly once. `OnceLock`
/// guarantees single-flight initialization for concurrent first callers;
/// a parse failure is cached and re-surfaced on every call.
fn projections() -> Result<&'static (Proj, Proj), AppError> {
    static PROJECTIONS: OnceLock<Result<(Proj, Proj), String>> = OnceLock::new();

    PROJECTIONS
        .get_or_init(|| {
            let wgs84 = Proj::from_proj_string(WGS84_DEF)
                .map_err(|e| format!("Failed to parse WGS84 definition: {e:?}"))?;
            let utm = Proj::from_proj_string(UTM_ZONE_12N_DEF)
                .map_err(|e| format!("Failed to parse UTM Zone 12N definition: {e:?}"))?;
            Ok((wgs84, utm))
        })
        .as_ref()
        .map_err(|e| AppError::Projection(e.clone()))
}

/// Re-project a shape from `from_wkid` into UTM Zone 12N.
pub fn project_to_utm(shape: &GeoShape, from_wkid: u32) -> Result<GeoShape, AppError> {
    match from_wkid {
        WKID_UTM_ZONE_12N => Ok(shape.clone()),
        WKID_WEB_MERCATOR => project_coords(shape, |c| {
            let (lon, lat) = web_mercator_to_lonlat(c.x, c.y);
            lonlat_to_utm(lon, lat)
        }),
        WKID_WGS84 => project_coords(shape, |c| {
            lonlat_to_utm(c.x.to_radians(), c.y.to_radians())
        }),
        other => Err(AppError::BadRequest(format!(
            "Unsupported input spatial reference: wkid {other}"
        ))),
    }
}

fn project_coords<F>(shape: &GeoShape, transform: F) -> Result<GeoShape, AppError>
where
    F: Fn(Coord<f64>) -> Result<Coord<f64>, AppError> + Copy,
{
    match shape {
        GeoShape::Polygon(mp) => mp.try_map_coords(transform).map(GeoShape::Polygon),
        GeoShape::Line(ml) => ml.try_map_coords(transform).map(GeoShape::Line),
        GeoShape::Point(p) => p.try_map_coords(transform).map(GeoShape::Point),
    }
}

/// Inverse spherical Web Mercator: meters to lon/lat radians.
fn web_mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = x / WEB_MERCATOR_RADIUS;
    let lat = (y / WEB_MERCATOR_RADIUS).sinh().atan();
    (lon, lat)
}

/// Forward transform lon/lat radians to UTM Zone 12N meters.
fn lonlat_to_utm(lon_rad: f64, lat_rad: f64) -> Result<Coord<f64>, AppError> {
    let (wgs84, utm) = projections()?;

    let mut point = (lon_rad, lat_rad, 0.0);
    proj4rs::transform::transform(wgs84, utm, &mut point)
        .map_err(|e| AppError::Projection(format!("Transform failed: {e:?}")))?;

    Ok(Coord { x: point.0, y: point.1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    #[test]
    fn test_utm_input_passes_through() {
        let shape = GeoShape::Point(Point::new(424_000.0, 4_512_000.0));
        let projected = project_to_utm(&shape, WKID_UTM_ZONE_12N).unwrap();

        match projected {
            GeoShape::Point(p) => {
                assert_eq!(p.x(), 424_000.0);
                assert_eq!(p.y(), 4_512_000.0);
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn test_web_mercator_inverse() {
        // Near Salt Lake City: lon -111.9, lat 40.76.
        let x = -111.9_f64.to_radians() * WEB_MERCATOR_RADIUS;
        let lat_rad = 40.76_f64.to_radians();
        let y = WEB_MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat_rad / 2.0).tan().ln();

        let (lon, lat) = web_mercator_to_lonlat(x, y);
        assert!((lon.to_degrees() + 111.9).abs() < 1e-9);
        assert!((lat.to_degrees() - 40.76).abs() < 1e-9);
    }

    #[test]
    fn test_wgs84_to_utm_zone_12n() {
        // Salt Lake City sits west of the zone's central meridian, so the
        // easting lands below the 500 km false easting.
        let shape = GeoShape::Point(Point::new(-111.9, 40.76));
        let projected = project_to_utm(&shape, WKID_WGS84).unwrap();

        match projected {
            GeoShape::Point(p) => {
                assert!(p.x() > 400_000.0 && p.x() < 450_000.0, "easting {}", p.x());
                assert!(
                    p.y() > 4_480_000.0 && p.y() < 4_540_000.0,
                    "northing {}",
                    p.y()
                );
            }
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn test_web_mercator_agrees_with_wgs84_path() {
        let lon = -111.9_f64;
        let lat = 40.76_f64;

        let from_wgs84 = project_to_utm(&GeoShape::Point(Point::new(lon, lat)), WKID_WGS84).unwrap();

        let x = lon.to_radians() * WEB_MERCATOR_RADIUS;
        let y = WEB_MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
            .tan()
            .ln();
        let from_mercator =
            project_to_utm(&GeoShape::Point(Point::new(x, y)), WKID_WEB_MERCATOR).unwrap();

        match (from_wgs84, from_mercator) {
            (GeoShape::Point(a), GeoShape::Point(b)) => {
                assert!((a.x() - b.x()).abs() < 0.01);
                assert!((a.y() - b.y()).abs() < 0.01);
            }
            other => panic!("expected points, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_wkid_is_rejected() {
        let shape = GeoShape::Point(Point::new(0.0, 0.0));
        let result = project_to_utm(&shape, 2056);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
