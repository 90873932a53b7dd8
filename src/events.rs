//! Event types and bus for group notifications
//!
//! Notifications are delivered over a broadcast channel, decoupled from the
//! scheduler's execution context: a slow or failing subscriber drops events
//! but can never stall processing or corrupt group state.

use crate::models::EntryStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Group notification events
///
/// Both the per-entry and the queue-level notification fire after every
/// entry transition completes, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GroupEvent {
    /// One entry changed status (includes invalidation back to pending)
    EntryStatusChanged {
        group_id: Uuid,
        entry_id: String,
        status: EntryStatus,
        /// Failure detail when `status` is `Failed`
        error: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue-level progress after an entry transition
    QueueProgress {
        group_id: Uuid,
        completed_count: usize,
        failed_count: usize,
        total_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler started draining the queue
    GroupResumed {
        group_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler will stop after the in-flight entry
    GroupPaused {
        group_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A style was attached to the group
    StyleAttached {
        group_id: Uuid,
        version: u32,
        rule_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GroupEvent {
    /// Event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            GroupEvent::EntryStatusChanged { .. } => "EntryStatusChanged",
            GroupEvent::QueueProgress { .. } => "QueueProgress",
            GroupEvent::GroupResumed { .. } => "GroupResumed",
            GroupEvent::GroupPaused { .. } => "GroupPaused",
            GroupEvent::StyleAttached { .. } => "StyleAttached",
        }
    }
}

/// Broadcast bus for [`GroupEvent`]s.
///
/// Thin wrapper over `tokio::sync::broadcast`: multiple producers, multiple
/// consumers, bounded buffer, oldest events dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GroupEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the absence of subscribers.
    ///
    /// Notifications are best-effort side effects; nobody listening is not
    /// an error.
    pub fn emit_lossy(&self, event: GroupEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
