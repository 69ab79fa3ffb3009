// SPDX-License-Identifier: MIT

//! Business logic services.

pub mod arcgis;
pub mod expression;
pub mod extraction;
pub mod projection;

pub use arcgis::{ArcGisClient, LayerName, LayerRegistry};
pub use expression::DefinitionExpressions;
pub use extraction::ExtractionService;
