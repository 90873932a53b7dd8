//! Photo entry state machine
//!
//! Entry status progresses Pending → Processing → {Completed, Failed}.
//! Completed entries may be pushed back to Pending by reference-propagation
//! invalidation; nothing ever leaves Failed.

use crate::types::{Adjustments, FeatureVector, SourceHandle};
use serde::{Deserialize, Serialize};

/// Processing status of one photo entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Queued, waiting for the scheduler
    Pending,
    /// Auto-compute in flight (at most one per group)
    Processing,
    /// Adjustments resolved and readable
    Completed,
    /// Auto-compute failed; terminal
    Failed,
}

impl EntryStatus {
    /// True for statuses the scheduler will never revisit on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }

    /// Legal direct transitions of the per-entry state machine.
    ///
    /// Completed → Pending is the invalidation path used when a reference
    /// mark forces cluster mates to recompute.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Pending, EntryStatus::Processing)
                | (EntryStatus::Processing, EntryStatus::Completed)
                | (EntryStatus::Processing, EntryStatus::Failed)
                | (EntryStatus::Completed, EntryStatus::Pending)
        )
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Pending => write!(f, "pending"),
            EntryStatus::Processing => write!(f, "processing"),
            EntryStatus::Completed => write!(f, "completed"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Coordinator-tracked state for one photo
#[derive(Debug, Clone)]
pub struct PhotoEntry {
    /// Unique id within the group
    pub id: String,

    /// Opaque handle to externally owned source data
    pub source: SourceHandle,

    /// Current status
    pub status: EntryStatus,

    /// Similarity feature vector, populated once auto-compute runs
    pub features: Option<FeatureVector>,

    /// Materialized adjustments (resolution rules below manual overrides),
    /// populated at completion, cleared on invalidation
    pub adjustments: Option<Adjustments>,

    /// User-set partial record; highest precedence, applied at read time
    pub manual_overrides: Adjustments,

    /// Marked as the propagation source for its cluster
    pub is_reference: bool,

    /// Failure detail, set iff status is Failed
    pub last_error: Option<String>,
}

impl PhotoEntry {
    pub fn new(id: String, source: SourceHandle) -> Self {
        Self {
            id,
            source,
            status: EntryStatus::Pending,
            features: None,
            adjustments: None,
            manual_overrides: Adjustments::default(),
            is_reference: false,
            last_error: None,
        }
    }

    /// Effective adjustments for a Completed entry: the materialized record
    /// with manual overrides layered on top. `None` for any other status so
    /// a partially resolved record is never exposed.
    pub fn resolved(&self) -> Option<Adjustments> {
        if self.status != EntryStatus::Completed {
            return None;
        }
        let base = self.adjustments.clone().unwrap_or_default();
        Some(base.overlaid_with(&self.manual_overrides))
    }
}
