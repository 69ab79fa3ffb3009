// SPDX-License-Identifier: MIT

//! Definition expression compiler.
//!
//! Compiles a filter selection (project statuses, feature types, join mode,
//! WRI funding flag) into four SQL `WHERE` fragments, one per map layer
//! table. Each output is either empty (no restriction), `1=0` (exclude
//! everything), or a boolean predicate fragment assigned verbatim to the
//! layer's definition expression.

use crate::models::filters::{
    find_feature_type, kind_total, FeatureTypeDef, GeometryKind, JoinMode, Selection,
    SelectionState, PROJECT_STATUSES,
};
use serde::Serialize;

/// Predicate fragment meaning no rows match.
const NO_RECORDS: &str = "1=0";

/// Inclusion subquery for projects in the WRI funding category.
const WRI_FUNDING_CLAUSE: &str =
    "Project_ID in(select Project_ID from PROJECTCATEGORYFUNDING where CategoryFundingID=1)";

/// Compiled definition expressions for the four map layer tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionExpressions {
    pub centroids: String,
    pub point: String,
    pub line: String,
    pub poly: String,
}

impl DefinitionExpressions {
    fn uniform(fragment: &str) -> Self {
        Self {
            centroids: fragment.to_string(),
            point: fragment.to_string(),
            line: fragment.to_string(),
            poly: fragment.to_string(),
        }
    }
}

/// A predicate over a closed value vocabulary. The three string forms
/// ("", "1=0", explicit SQL) exist only at the output boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Unrestricted,
    Excluded,
    Values(Vec<String>),
}

/// Selection state of one geometry kind's bucket.
#[derive(Debug, Clone)]
enum Bucket {
    /// Every catalog type of this kind is selected: no type restriction.
    Full,
    /// No type of this kind is selected: the table shows nothing.
    Empty,
    /// A proper subset, in input order.
    Partial(Vec<&'static FeatureTypeDef>),
}

impl Bucket {
    fn is_full(&self) -> bool {
        matches!(self, Bucket::Full)
    }

    fn is_empty(&self) -> bool {
        matches!(self, Bucket::Empty)
    }
}

/// Compile a selection state into the four layer fragments.
///
/// Pure and idempotent: the same state always yields identical strings.
pub fn compile(state: &SelectionState) -> DefinitionExpressions {
    let status = status_predicate(&state.projects);
    let buckets = feature_buckets(&state.features);

    // Nothing selected on either axis: show nothing, regardless of any
    // other flag. Takes precedence over all other logic.
    if status == Predicate::Excluded || buckets.iter().all(|(_, b)| b.is_empty()) {
        return DefinitionExpressions::uniform(NO_RECORDS);
    }

    // Everything selected: unrestricted, or just the funding filter.
    if status == Predicate::Unrestricted && buckets.iter().all(|(_, b)| b.is_full()) {
        let fragment = if state.wri_funding { WRI_FUNDING_CLAUSE } else { "" };
        return DefinitionExpressions::uniform(fragment);
    }

    let centroid_status = match &status {
        Predicate::Values(values) => Some(format!("Status in({})", quote_list(values))),
        _ => None,
    };
    let table_status = match &status {
        Predicate::Values(values) => Some(format!("StatusDescription in({})", quote_list(values))),
        _ => None,
    };

    let funding = (state.wri_funding && state.join == JoinMode::Or).then_some(WRI_FUNDING_CLAUSE);

    match state.join {
        JoinMode::Or => compile_or(&buckets, funding, centroid_status, table_status),
        JoinMode::And => compile_and(&buckets, centroid_status, table_status),
    }
}

/// `or` mode: any selected type qualifies a project. Each partially selected
/// bucket contributes one `in(...)` subquery; a full bucket alongside a
/// non-full sibling contributes an unrestricted subquery so that projects
/// with any feature of that kind still qualify. Subqueries combine with
/// `union` inside a single `Project_ID in(...)`.
fn compile_or(
    buckets: &[(GeometryKind, Bucket); 3],
    funding: Option<&str>,
    centroid_status: Option<String>,
    table_status: Option<String>,
) -> DefinitionExpressions {
    let any_not_full = buckets.iter().any(|(_, b)| !b.is_full());

    let mut subqueries: Vec<String> = Vec::new();
    let mut tables: Vec<String> = Vec::new();

    for (kind, bucket) in buckets {
        match bucket {
            Bucket::Partial(types) => {
                let labels = quote_labels(types);
                subqueries.push(format!(
                    "select Project_ID from {} where TypeDescription in({labels})",
                    kind.table()
                ));

                let type_filter = format!("TypeDescription in({labels})");
                tables.push(conjoin(&[
                    funding,
                    table_status.as_deref(),
                    Some(type_filter.as_str()),
                ]));
            }
            Bucket::Full => {
                if any_not_full {
                    subqueries.push(format!("select Project_ID from {}", kind.table()));
                }
                tables.push(conjoin(&[funding, table_status.as_deref()]));
            }
            Bucket::Empty => tables.push(NO_RECORDS.to_string()),
        }
    }

    let inclusion = (!subqueries.is_empty())
        .then(|| format!("Project_ID in({})", subqueries.join(" union ")));

    let centroids = conjoin(&[funding, centroid_status.as_deref(), inclusion.as_deref()]);

    let [point, line, poly] = tables.try_into().expect("one fragment per kind");
    DefinitionExpressions { centroids, point, line, poly }
}

/// `and` mode: every selected type must be present on the same project.
/// Each individual type value contributes its own subquery — a full bucket
/// alongside a non-full sibling expands per type value, not as an aggregate
/// `in(...)` list — and all subqueries combine with `intersect` inside one
/// `Project_ID in(...)`. Contributing tables conjoin their local type filter
/// with the full inclusion expression.
fn compile_and(
    buckets: &[(GeometryKind, Bucket); 3],
    centroid_status: Option<String>,
    table_status: Option<String>,
) -> DefinitionExpressions {
    let any_not_full = buckets.iter().any(|(_, b)| !b.is_full());

    let mut subqueries: Vec<String> = Vec::new();
    for (kind, bucket) in buckets {
        let types: Vec<&'static FeatureTypeDef> = match bucket {
            Bucket::Partial(types) => types.clone(),
            Bucket::Full if any_not_full => catalog_of_kind(*kind),
            _ => Vec::new(),
        };

        for def in types {
            subqueries.push(format!(
                "select Project_ID from {} where TypeDescription='{}'",
                kind.table(),
                def.label
            ));
        }
    }

    let inclusion = (!subqueries.is_empty())
        .then(|| format!("Project_ID in({})", subqueries.join(" intersect ")));

    let mut tables: Vec<String> = Vec::new();
    for (_, bucket) in buckets {
        match bucket {
            Bucket::Partial(types) => {
                let type_filter = format!("TypeDescription in({})", quote_labels(types));
                tables.push(conjoin(&[
                    table_status.as_deref(),
                    Some(type_filter.as_str()),
                    inclusion.as_deref(),
                ]));
            }
            Bucket::Full => tables.push(conjoin(&[table_status.as_deref(), inclusion.as_deref()])),
            Bucket::Empty => tables.push(NO_RECORDS.to_string()),
        }
    }

    let centroids = conjoin(&[centroid_status.as_deref(), inclusion.as_deref()]);

    let [point, line, poly] = tables.try_into().expect("one fragment per kind");
    DefinitionExpressions { centroids, point, line, poly }
}

fn status_predicate(selection: &Selection) -> Predicate {
    match selection {
        Selection::All => Predicate::Unrestricted,
        Selection::Keys(keys) => {
            let unique = dedup_preserving_order(keys);

            if unique.is_empty() {
                Predicate::Excluded
            } else if unique.len() == PROJECT_STATUSES.len() {
                Predicate::Unrestricted
            } else {
                Predicate::Values(unique)
            }
        }
    }
}

/// Partition the feature selection into per-kind buckets, in the order the
/// compiler emits table fragments (point, line, poly). Labels absent from
/// the catalog are skipped, not rejected.
fn feature_buckets(selection: &Selection) -> [(GeometryKind, Bucket); 3] {
    GeometryKind::ALL.map(|kind| {
        let bucket = match selection {
            Selection::All => Bucket::Full,
            Selection::Keys(keys) => {
                let mut types: Vec<&'static FeatureTypeDef> = Vec::new();
                for label in &dedup_preserving_order(keys) {
                    if let Some(def) = find_feature_type(label) {
                        if def.kind == kind {
                            types.push(def);
                        }
                    }
                }

                if types.is_empty() {
                    Bucket::Empty
                } else if types.len() == kind_total(kind) {
                    Bucket::Full
                } else {
                    Bucket::Partial(types)
                }
            }
        };
        (kind, bucket)
    })
}

fn catalog_of_kind(kind: GeometryKind) -> Vec<&'static FeatureTypeDef> {
    crate::models::filters::FEATURE_TYPES
        .iter()
        .filter(|f| f.kind == kind)
        .collect()
}

fn dedup_preserving_order(keys: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keys.iter()
        .filter(|k| seen.insert(k.as_str()))
        .cloned()
        .collect()
}

/// Join the non-empty parts with ` and `, omitting either side when empty.
fn conjoin(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .filter_map(|p| *p)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" and ")
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(",")
}

fn quote_labels(types: &[&FeatureTypeDef]) -> String {
    types
        .iter()
        .map(|t| format!("'{}'", t.label))
        .collect::<Vec<_>>()
        .join(",")
}
