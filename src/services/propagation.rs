//! Effective-adjustment resolution
//!
//! Resolves an entry's materialized adjustments from its own computed
//! fields, its cluster's reference photo, and any attached style. Field
//! precedence, highest first:
//!
//! 1. manual overrides (applied as a read-time overlay, not here)
//! 2. fields of a configured computed kind - the entry's own compute result
//! 3. the cluster's active reference, for all remaining fields
//! 4. the nearest style rule, for all remaining fields
//! 5. the field's prior value

use crate::models::{EntryStatus, PhotoEntry, Style, StyleRule};
use crate::services::clustering::{cluster_of, Cluster};
use crate::types::{Adjustments, AdjustmentField, DistanceMetric, FeatureVector};
use std::collections::{HashMap, HashSet};

/// Immutable inputs shared by every resolution in one pass.
pub struct ResolutionContext<'a> {
    /// Fields owned by the group's configured computed kinds
    pub computed_fields: &'a HashSet<AdjustmentField>,
    /// Current similarity partition
    pub clusters: &'a [Cluster],
    /// Style attached to the group, if any
    pub style: Option<&'a Style>,
    /// Metric for style-rule centroid lookup
    pub metric: DistanceMetric,
}

/// Pick the active reference for `entry_id` within its cluster.
///
/// When a cluster holds several references the lexicographically smallest id
/// wins, keeping resolution deterministic.
pub fn active_reference<'a>(
    entry_id: &str,
    clusters: &[Cluster],
    entries: &'a HashMap<String, PhotoEntry>,
) -> Option<&'a PhotoEntry> {
    let cluster = cluster_of(clusters, entry_id)?;
    cluster
        .members
        .iter()
        .filter(|m| m.as_str() != entry_id)
        .filter_map(|m| entries.get(m))
        .find(|e| e.is_reference && e.status == EntryStatus::Completed)
}

/// Pick the style rule for an entry.
///
/// Nearest rule by centroid distance when the entry has features; entries
/// without features take the heaviest rule. They still never take peer
/// references.
pub fn select_rule<'a>(
    style: &'a Style,
    features: Option<&FeatureVector>,
    metric: DistanceMetric,
) -> Option<&'a StyleRule> {
    if style.rules.is_empty() {
        return None;
    }
    match features {
        Some(f) => style.rules.iter().min_by(|a, b| {
            metric
                .distance(&a.centroid, f)
                .total_cmp(&metric.distance(&b.centroid, f))
        }),
        None => style.rules.iter().max_by_key(|r| r.weight),
    }
}

/// Materialize rules 2-5 for one entry.
///
/// `computed` is the fresh gateway output for the configured kinds. Manual
/// overrides are deliberately absent here: they are overlaid at read time so
/// an override set after completion still wins.
pub fn materialize(
    entry: &PhotoEntry,
    computed: &Adjustments,
    entries: &HashMap<String, PhotoEntry>,
    ctx: &ResolutionContext<'_>,
) -> Adjustments {
    let reference = active_reference(&entry.id, ctx.clusters, entries);
    let reference_resolved = reference.and_then(|r| r.resolved());
    let rule = ctx
        .style
        .and_then(|s| select_rule(s, entry.features.as_ref(), ctx.metric));

    let mut resolved = Adjustments::default();
    for field in AdjustmentField::ALL {
        let value = if ctx.computed_fields.contains(&field) {
            // Intrinsically photo-specific: own compute result only.
            computed.get(field)
        } else if let Some(ref record) = reference_resolved {
            record
                .get(field)
                .or_else(|| prior_value(entry, field))
        } else if let Some(rule) = rule {
            rule.delta
                .get(field)
                .or_else(|| prior_value(entry, field))
        } else {
            prior_value(entry, field)
        };
        resolved.set(field, value);
    }
    resolved
}

fn prior_value(entry: &PhotoEntry, field: AdjustmentField) -> Option<f64> {
    entry.adjustments.as_ref().and_then(|a| a.get(field))
}
