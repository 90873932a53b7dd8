//! Error types for the adjustment coordinator

use thiserror::Error;

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator error taxonomy
///
/// Structural misuse (unknown id, invalid transition, incompatible style) is
/// surfaced synchronously to the call site. Per-entry compute failures are
/// recorded on the entry and reported via notifications; they never raise
/// through `resume()` or `wait_until_completed()`.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation referenced an id unknown to the group
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Registration attempted to reuse an id already present in the group
    #[error("entry already registered: {0}")]
    DuplicateEntry(String),

    /// Operation not valid for the entry's current status
    /// (e.g. marking a non-Completed entry as reference)
    #[error("invalid state transition for entry {entry_id}: status is {status}")]
    InvalidStateTransition {
        entry_id: String,
        status: crate::models::EntryStatus,
    },

    /// External auto-compute call failed for one entry; isolated, terminal
    /// for that entry only
    #[error("auto-compute failed for entry {entry_id}: {message}")]
    ComputeFailure { entry_id: String, message: String },

    /// Operation precondition not met (e.g. style save while entries remain
    /// non-terminal)
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Loaded style carries an unsupported format version
    #[error("unsupported style version {found} (supported: {supported})")]
    VersionMismatch { found: u32, supported: u32 },

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// The group's scheduler task is gone (handle outlived the group)
    #[error("group scheduler is no longer running")]
    ChannelClosed,
}
