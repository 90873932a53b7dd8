//! Style derivation
//!
//! Distills a fully processed group into a portable rule set: one rule per
//! cluster, carrying the cluster's feature centroid, its non-computed-kind
//! adjustment delta, and its member count as weight.

use crate::models::{PhotoEntry, Style, StyleRule};
use crate::services::clustering::Cluster;
use crate::types::{Adjustments, AdjustmentField};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Derive a style from a processed group.
///
/// Callers guarantee every cluster member is Completed (the scheduler
/// enforces the precondition; Failed entries are already excluded from the
/// partition). Clusters take their reference's resolved delta when they have
/// one, otherwise the field-wise median over all members.
pub fn derive_style(
    entries: &HashMap<String, PhotoEntry>,
    clusters: &[Cluster],
    computed_fields: &HashSet<AdjustmentField>,
) -> Style {
    let mut rules = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let members: Vec<&PhotoEntry> = cluster
            .members
            .iter()
            .filter_map(|id| entries.get(id))
            .collect();
        if members.is_empty() {
            continue;
        }

        let centroid = mean_features(&members);

        // Members are sorted, so the first reference found is the
        // lexicographically smallest - same tie-break as resolution.
        let reference_resolved = members
            .iter()
            .find(|e| e.is_reference)
            .and_then(|e| e.resolved());
        let delta = match reference_resolved {
            Some(record) => strip_computed(&record, computed_fields),
            None => median_delta(&members, computed_fields),
        };

        rules.push(StyleRule {
            centroid,
            delta,
            weight: members.len() as u32,
        });
    }

    debug!(rules = rules.len(), "style derived");
    Style::new(rules)
}

/// Arithmetic mean of member feature vectors.
fn mean_features(members: &[&PhotoEntry]) -> Vec<f64> {
    let vectors: Vec<&Vec<f64>> = members.iter().filter_map(|e| e.features.as_ref()).collect();
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();
    let mut sum = vec![0.0; dim];
    for v in &vectors {
        for (slot, x) in sum.iter_mut().zip(v.iter()) {
            *slot += x;
        }
    }
    let n = vectors.len() as f64;
    sum.iter_mut().for_each(|x| *x /= n);
    sum
}

/// Field-wise median of members' resolved non-computed-kind adjustments.
fn median_delta(members: &[&PhotoEntry], computed_fields: &HashSet<AdjustmentField>) -> Adjustments {
    let resolved: Vec<Adjustments> = members.iter().filter_map(|e| e.resolved()).collect();
    let mut delta = Adjustments::default();
    for field in AdjustmentField::ALL {
        if computed_fields.contains(&field) {
            continue;
        }
        let mut values: Vec<f64> = resolved.iter().filter_map(|a| a.get(field)).collect();
        if values.is_empty() {
            continue;
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        let median = if values.len() % 2 == 1 {
            values[mid]
        } else {
            (values[mid - 1] + values[mid]) / 2.0
        };
        delta.set(field, Some(median));
    }
    delta
}

/// Copy of `record` without the computed-kind fields.
fn strip_computed(record: &Adjustments, computed_fields: &HashSet<AdjustmentField>) -> Adjustments {
    let mut stripped = record.clone();
    for field in computed_fields {
        stripped.set(*field, None);
    }
    stripped
}
