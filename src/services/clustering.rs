//! Similarity clustering engine
//!
//! Partitions entries with populated feature vectors by union-find over
//! entry pairs. Pairs are processed in ascending lexicographic id order, so
//! the partition is deterministic for identical ids and feature values,
//! independent of entry insertion order. Entries without features are not
//! clustered at all; they are scheduled and propagated independently.

use crate::types::{DistanceMetric, FeatureVector};
use tracing::debug;

/// One similarity cluster. Members are sorted lexicographically; the first
/// member is the cluster representative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<String>,
}

impl Cluster {
    pub fn representative(&self) -> &str {
        &self.members[0]
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }
}

/// Disjoint-set forest over entry indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Attach the larger index under the smaller: the root stays the
            // lexicographically smallest member of the merged set.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// Partition `(id, features)` pairs into clusters.
///
/// Two entries merge iff their feature distance is ≤ `threshold`; merging is
/// transitive through union-find, so a chain of pairwise-similar entries
/// forms a single cluster. The returned list is sorted by representative id.
pub fn partition(
    features: &[(String, FeatureVector)],
    threshold: f64,
    metric: DistanceMetric,
) -> Vec<Cluster> {
    let mut indexed: Vec<(&String, &FeatureVector)> =
        features.iter().map(|(id, f)| (id, f)).collect();
    indexed.sort_by(|a, b| a.0.cmp(b.0));

    let mut forest = UnionFind::new(indexed.len());
    for i in 0..indexed.len() {
        for j in (i + 1)..indexed.len() {
            let d = metric.distance(indexed[i].1, indexed[j].1);
            if d <= threshold {
                forest.union(i, j);
            }
        }
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    let mut root_to_cluster: std::collections::HashMap<usize, usize> =
        std::collections::HashMap::new();
    for (i, (id, _)) in indexed.iter().enumerate() {
        let root = forest.find(i);
        let slot = *root_to_cluster.entry(root).or_insert_with(|| {
            clusters.push(Cluster {
                members: Vec::new(),
            });
            clusters.len() - 1
        });
        clusters[slot].members.push((*id).clone());
    }

    // Members arrive in sorted order; clusters ordered by representative.
    clusters.sort_by(|a, b| a.members[0].cmp(&b.members[0]));

    debug!(
        entries = features.len(),
        clusters = clusters.len(),
        threshold,
        "clustering recomputed"
    );
    clusters
}

/// Find the cluster containing `id`, if any.
pub fn cluster_of<'a>(clusters: &'a [Cluster], id: &str) -> Option<&'a Cluster> {
    clusters.iter().find(|c| c.contains(id))
}
