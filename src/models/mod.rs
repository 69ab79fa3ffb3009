// SPDX-License-Identifier: MIT

//! Data models.

pub mod filters;
pub mod geometry;

pub use filters::{JoinMode, Selection, SelectionState};
pub use geometry::{EsriGeometry, GeoShape, SpatialReference};
