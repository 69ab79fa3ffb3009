// SPDX-License-Identifier: MIT

//! Filter catalogs and selection state for the map layer filters.
//!
//! The project status and feature type vocabularies are closed: every value
//! that can appear in a selection is listed here, and every feature type
//! belongs to exactly one geometry kind.

use serde::{Deserialize, Deserializer, Serialize};

/// Geometry kind of a feature type, matching the three geometry tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Poly,
}

impl GeometryKind {
    /// All kinds in the order the compiler emits table fragments.
    pub const ALL: [GeometryKind; 3] = [GeometryKind::Point, GeometryKind::Line, GeometryKind::Poly];

    /// The SQL table holding features of this kind.
    pub fn table(self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::Line => "LINE",
            GeometryKind::Poly => "POLY",
        }
    }
}

/// A project status catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct ProjectStatus {
    pub code: u8,
    pub value: &'static str,
    pub default: bool,
}

pub const PROJECT_STATUSES: [ProjectStatus; 6] = [
    ProjectStatus { code: 1, value: "Draft", default: false },
    ProjectStatus { code: 2, value: "Proposed", default: true },
    ProjectStatus { code: 3, value: "Current", default: true },
    ProjectStatus { code: 4, value: "Pending Completed", default: true },
    ProjectStatus { code: 5, value: "Completed", default: true },
    ProjectStatus { code: 6, value: "Cancelled", default: false },
];

/// A feature type catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct FeatureTypeDef {
    pub code: u8,
    pub label: &'static str,
    pub kind: GeometryKind,
}

pub const FEATURE_TYPES: [FeatureTypeDef; 11] = [
    FeatureTypeDef { code: 1, label: "Terrestrial Treatment Area", kind: GeometryKind::Poly },
    FeatureTypeDef { code: 2, label: "Aquatic/Riparian Treatment Area", kind: GeometryKind::Poly },
    FeatureTypeDef { code: 3, label: "Affected Area", kind: GeometryKind::Poly },
    FeatureTypeDef { code: 4, label: "Easement/Acquisition", kind: GeometryKind::Poly },
    FeatureTypeDef { code: 5, label: "Guzzler", kind: GeometryKind::Point },
    FeatureTypeDef { code: 8, label: "Other point feature", kind: GeometryKind::Point },
    FeatureTypeDef { code: 9, label: "Fish passage structure", kind: GeometryKind::Point },
    FeatureTypeDef { code: 10, label: "Fence", kind: GeometryKind::Line },
    FeatureTypeDef { code: 11, label: "Pipeline", kind: GeometryKind::Line },
    FeatureTypeDef { code: 12, label: "Dam", kind: GeometryKind::Line },
    FeatureTypeDef { code: 13, label: "Water development point feature", kind: GeometryKind::Point },
];

/// Look up a feature type by its label. Unknown labels return `None` and are
/// silently skipped by the compiler.
pub fn find_feature_type(label: &str) -> Option<&'static FeatureTypeDef> {
    FEATURE_TYPES.iter().find(|f| f.label == label)
}

/// Number of catalog entries of the given kind.
pub fn kind_total(kind: GeometryKind) -> usize {
    FEATURE_TYPES.iter().filter(|f| f.kind == kind).count()
}

/// A filter selection: either the "all" sentinel or an explicit list of keys.
///
/// Key order is preserved from the input; the compiler does not sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Keys(Vec<String>),
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Sentinel(String),
            Keys(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Sentinel(s) if s == "all" => Ok(Selection::All),
            Raw::Sentinel(other) => Err(serde::de::Error::custom(format!(
                "unknown selection sentinel: {other:?} (expected \"all\" or a list)"
            ))),
            Raw::Keys(keys) => Ok(Selection::Keys(keys)),
        }
    }
}

/// How multiple selected feature types combine on the centroids table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    And,
    Or,
}

/// The full filter selection submitted by the UI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub projects: Selection,
    pub features: Selection,
    pub join: JoinMode,
    #[serde(default)]
    pub wri_funding: bool,
}
