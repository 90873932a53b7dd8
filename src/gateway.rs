//! External pipeline gateways
//!
//! The coordinator treats per-photo auto-compute and render/apply as opaque
//! async operations behind trait objects. Gateway instances are owned
//! resource handles passed in at group construction - never ambient globals -
//! and each group's gateway serves exactly one in-flight call at a time.

use crate::types::{AdjustKind, Adjustments, FeatureVector, SourceHandle};
use async_trait::async_trait;

/// Output of one auto-compute call.
#[derive(Debug, Clone, Default)]
pub struct ComputeOutput {
    /// Similarity feature vector, when the pipeline produced one
    pub features: Option<FeatureVector>,
    /// Computed values for the requested kinds' fields
    pub adjustments: Adjustments,
}

/// Per-photo auto-compute pipeline.
///
/// One call per entry per processing pass. Calls are not preemptible and the
/// coordinator never retries on its own: a failure is terminal for that
/// entry. Implementations should be idempotent-safe so a caller can
/// re-register the photo as a fresh entry.
#[async_trait]
pub trait AutoComputeGateway: Send + Sync {
    /// Compute the requested adjustment kinds (and the feature vector) for
    /// one photo.
    async fn compute(
        &self,
        entry_id: &str,
        source: &SourceHandle,
        kinds: &[AdjustKind],
    ) -> anyhow::Result<ComputeOutput>;
}

/// Render/apply pipeline.
///
/// Consumes a resolved adjustment record and an entry's source data to
/// produce output bytes. Invoked by the caller after `get_adjustments`,
/// never by the coordinator itself.
#[async_trait]
pub trait RenderGateway: Send + Sync {
    async fn render(
        &self,
        source: &SourceHandle,
        adjustments: &Adjustments,
    ) -> anyhow::Result<Vec<u8>>;
}
