//! Adjustment group coordinator
//!
//! One group owns one scheduler task which in turn owns all mutable group
//! state. The public [`AdjustmentGroup`] handle sends commands over a
//! channel and awaits replies, so every mutating operation is serialized
//! through the scheduler's single execution context and can never interleave
//! with an in-flight dequeue step. The gateway call awaited during a dequeue
//! is the group's only suspension point; commands received meanwhile queue
//! up and are handled after the in-flight entry finishes.
//!
//! Independent groups, each owning an independent gateway handle, run fully
//! in parallel with no shared mutable state.

use crate::config::GroupConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, GroupEvent};
use crate::gateway::AutoComputeGateway;
use crate::models::{EntryStatus, PhotoEntry, Style};
use crate::services::clustering::{self, Cluster};
use crate::services::propagation::{self, ResolutionContext};
use crate::services::style_codec;
use crate::types::{Adjustments, AdjustmentField, FeatureVector, SourceHandle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A photo to register with a group.
pub struct NewEntry {
    /// Caller-chosen id, unique within the group
    pub id: String,
    /// Opaque handle to the externally owned source data
    pub source: SourceHandle,
}

impl NewEntry {
    pub fn new(id: impl Into<String>, source: SourceHandle) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// Point-in-time view of a group's processing state.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: bool,
    /// Per-entry status in insertion order
    pub statuses: Vec<(String, EntryStatus)>,
}

enum Command {
    Resume,
    Pause,
    Register(Vec<NewEntry>, oneshot::Sender<Result<()>>),
    MarkAsReference(String, oneshot::Sender<Result<()>>),
    SetAdjustments(String, Adjustments, oneshot::Sender<Result<()>>),
    GetAdjustments(String, oneshot::Sender<Result<Option<Adjustments>>>),
    GetLastError(String, oneshot::Sender<Result<Option<String>>>),
    SaveStyle(oneshot::Sender<Result<Style>>),
    LoadStyle(Style, oneshot::Sender<Result<()>>),
    ReresolveCompleted(oneshot::Sender<Result<usize>>),
    WaitCompleted(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<GroupSnapshot>),
}

/// Handle to one auto-adjustments group.
///
/// Cheap to clone; the underlying scheduler task exits once every handle is
/// dropped and the queue has drained its commands.
#[derive(Clone, Debug)]
pub struct AdjustmentGroup {
    group_id: Uuid,
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl AdjustmentGroup {
    /// Create a group over `entries` and spawn its scheduler.
    ///
    /// The group starts paused: nothing processes before [`resume`].
    /// Must be called within a tokio runtime.
    ///
    /// [`resume`]: AdjustmentGroup::resume
    pub fn new(
        config: GroupConfig,
        gateway: Arc<dyn AutoComputeGateway>,
        entries: Vec<NewEntry>,
    ) -> Result<Self> {
        config.validate()?;

        let group_id = Uuid::new_v4();
        let events = EventBus::new(config.event_capacity);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut scheduler = Scheduler {
            group_id,
            config,
            gateway,
            events: events.clone(),
            cmd_rx,
            entries: HashMap::new(),
            order: Vec::new(),
            pending: VecDeque::new(),
            running: false,
            style: None,
            clusters_cache: None,
            waiters: Vec::new(),
        };
        scheduler.insert_entries(entries)?;

        info!(
            group_id = %group_id,
            total = scheduler.order.len(),
            "adjustment group created (paused)"
        );
        tokio::spawn(scheduler.run());

        Ok(Self {
            group_id,
            cmd_tx,
            events,
        })
    }

    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    /// Subscribe to group notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.events.subscribe()
    }

    /// Start (or keep) draining the pending queue. No-op while running.
    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Stop dequeuing after the in-flight entry completes. Never cancels an
    /// in-flight gateway call. No-op while paused.
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Register additional entries; they are appended Pending in order.
    pub async fn register_entries(&self, entries: Vec<NewEntry>) -> Result<()> {
        self.request(|tx| Command::Register(entries, tx)).await?
    }

    /// Mark a Completed entry as its cluster's reference and invalidate the
    /// cluster's other non-reference members for recomputation.
    pub async fn mark_as_reference(&self, id: impl Into<String>) -> Result<()> {
        self.request(|tx| Command::MarkAsReference(id.into(), tx))
            .await?
    }

    /// Merge a partial record into an entry's manual overrides. Never
    /// changes status; no propagation to other entries.
    pub async fn set_adjustments(
        &self,
        id: impl Into<String>,
        partial: Adjustments,
    ) -> Result<()> {
        self.request(|tx| Command::SetAdjustments(id.into(), partial, tx))
            .await?
    }

    /// Resolved adjustments for a Completed entry; `None` for any other
    /// status.
    pub async fn get_adjustments(&self, id: impl Into<String>) -> Result<Option<Adjustments>> {
        self.request(|tx| Command::GetAdjustments(id.into(), tx))
            .await?
    }

    /// Failure detail for a Failed entry; `None` otherwise.
    ///
    /// Failed entries never leave Failed; a caller can re-register the
    /// photo under a fresh id or exclude it from export.
    pub async fn last_error(&self, id: impl Into<String>) -> Result<Option<String>> {
        self.request(|tx| Command::GetLastError(id.into(), tx))
            .await?
    }

    /// Distill the processed group into a portable style.
    pub async fn save_style(&self) -> Result<Style> {
        self.request(Command::SaveStyle).await?
    }

    /// Attach a style to the group. Takes effect the next time an entry's
    /// adjustments are (re)resolved.
    pub async fn load_style(&self, style: Style) -> Result<()> {
        self.request(|tx| Command::LoadStyle(style, tx)).await?
    }

    /// Re-run resolution for every Completed entry without calling the
    /// gateway, so a freshly loaded style applies immediately. Returns the
    /// number of entries re-resolved.
    pub async fn reresolve_completed(&self) -> Result<usize> {
        self.request(Command::ReresolveCompleted).await?
    }

    /// Suspend until no entry is Pending or Processing.
    ///
    /// A paused group with pending work never satisfies the condition;
    /// callers must `resume()` first or this future never resolves.
    pub async fn wait_until_completed(&self) -> Result<()> {
        self.request(Command::WaitCompleted).await
    }

    /// Current status counts and per-entry statuses.
    pub async fn snapshot(&self) -> Result<GroupSnapshot> {
        self.request(Command::Snapshot).await
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| Error::ChannelClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }
}

/// Single-writer scheduler: owns all group state, processes one entry at a
/// time, handles commands only between dequeue steps.
struct Scheduler {
    group_id: Uuid,
    config: GroupConfig,
    gateway: Arc<dyn AutoComputeGateway>,
    events: EventBus,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    entries: HashMap<String, PhotoEntry>,
    /// Insertion order, for FIFO scheduling and snapshots
    order: Vec<String>,
    /// Ids awaiting processing: registration order, invalidations appended
    pending: VecDeque<String>,
    running: bool,
    style: Option<Style>,
    /// Partition cache, dropped when features or reference marks change
    clusters_cache: Option<Vec<Cluster>>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Scheduler {
    async fn run(mut self) {
        loop {
            // Handle every command already queued before touching the queue.
            loop {
                match self.cmd_rx.try_recv() {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        debug!(group_id = %self.group_id, "all handles dropped, scheduler exiting");
                        return;
                    }
                }
            }

            if self.running {
                if let Some(id) = self.pending.pop_front() {
                    self.process_entry(id).await;
                    continue;
                }
            }

            // Idle (paused, or running with an empty queue): block for the
            // next command.
            match self.cmd_rx.recv().await {
                Some(cmd) => self.handle_command(cmd),
                None => {
                    debug!(group_id = %self.group_id, "all handles dropped, scheduler exiting");
                    return;
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Resume => {
                if !self.running {
                    self.running = true;
                    info!(group_id = %self.group_id, pending = self.pending.len(), "group resumed");
                    self.events.emit_lossy(GroupEvent::GroupResumed {
                        group_id: self.group_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            Command::Pause => {
                if self.running {
                    self.running = false;
                    info!(group_id = %self.group_id, "group paused");
                    self.events.emit_lossy(GroupEvent::GroupPaused {
                        group_id: self.group_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            Command::Register(entries, reply) => {
                let result = self.insert_entries(entries);
                if result.is_ok() {
                    self.emit_progress();
                }
                let _ = reply.send(result);
            }
            Command::MarkAsReference(id, reply) => {
                let _ = reply.send(self.mark_as_reference(&id));
            }
            Command::SetAdjustments(id, partial, reply) => {
                let _ = reply.send(self.set_adjustments(&id, &partial));
            }
            Command::GetAdjustments(id, reply) => {
                let _ = reply.send(self.get_adjustments(&id));
            }
            Command::GetLastError(id, reply) => {
                let result = self
                    .entries
                    .get(&id)
                    .map(|e| e.last_error.clone())
                    .ok_or_else(|| Error::EntryNotFound(id.clone()));
                let _ = reply.send(result);
            }
            Command::SaveStyle(reply) => {
                let _ = reply.send(self.save_style());
            }
            Command::LoadStyle(style, reply) => {
                let _ = reply.send(self.load_style(style));
            }
            Command::ReresolveCompleted(reply) => {
                let _ = reply.send(Ok(self.reresolve_completed()));
            }
            Command::WaitCompleted(reply) => {
                if self.is_drained() {
                    let _ = reply.send(());
                } else {
                    self.waiters.push(reply);
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// One dequeue step: Processing → gateway → resolution → terminal state.
    /// The gateway await is the only suspension point in the group.
    async fn process_entry(&mut self, id: String) {
        let Some((source, prior_status)) = self
            .entries
            .get(&id)
            .map(|e| (e.source.clone(), e.status))
        else {
            return;
        };
        if prior_status != EntryStatus::Pending {
            return;
        }

        self.set_status(&id, EntryStatus::Processing, None);
        debug!(group_id = %self.group_id, entry_id = %id, "auto-compute started");

        let result = self
            .gateway
            .compute(&id, &source, &self.config.kinds)
            .await;

        match result {
            Ok(output) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.features = output.features.clone();
                }
                // Feature set changed; the partition must be rebuilt before
                // this entry resolves against its cluster.
                self.clusters_cache = None;
                let resolved = self.resolve(&id, &output.adjustments);
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.adjustments = Some(resolved);
                    entry.last_error = None;
                }
                self.set_status(&id, EntryStatus::Completed, None);
                debug!(group_id = %self.group_id, entry_id = %id, "entry completed");
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(
                    group_id = %self.group_id,
                    entry_id = %id,
                    error = %message,
                    "auto-compute failed, entry isolated"
                );
                // A Failed entry leaves the partition for good.
                self.clusters_cache = None;
                self.set_status(&id, EntryStatus::Failed, Some(message));
            }
        }

        self.check_waiters();
    }

    /// Materialize resolution rules 2-5 for `id` using `computed` as the
    /// entry's own compute result.
    fn resolve(&mut self, id: &str, computed: &Adjustments) -> Adjustments {
        let clusters = self.clusters();
        let computed_fields = self.config.computed_fields();
        let Some(entry) = self.entries.get(id) else {
            return Adjustments::default();
        };
        let ctx = ResolutionContext {
            computed_fields: &computed_fields,
            clusters: &clusters,
            style: self.style.as_ref(),
            metric: self.config.metric,
        };
        propagation::materialize(entry, computed, &self.entries, &ctx)
    }

    fn insert_entries(&mut self, entries: Vec<NewEntry>) -> Result<()> {
        let mut batch_ids = HashSet::new();
        for e in &entries {
            if self.entries.contains_key(&e.id) || !batch_ids.insert(e.id.clone()) {
                return Err(Error::DuplicateEntry(e.id.clone()));
            }
        }
        for e in entries {
            debug!(group_id = %self.group_id, entry_id = %e.id, "entry registered");
            self.order.push(e.id.clone());
            self.pending.push_back(e.id.clone());
            self.entries
                .insert(e.id.clone(), PhotoEntry::new(e.id, e.source));
        }
        Ok(())
    }

    fn mark_as_reference(&mut self, id: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;
        if entry.status != EntryStatus::Completed {
            return Err(Error::InvalidStateTransition {
                entry_id: id.to_string(),
                status: entry.status,
            });
        }
        entry.is_reference = true;

        // Reference marks are a partition recompute trigger.
        self.clusters_cache = None;
        let clusters = self.clusters();
        let mates: Vec<String> = clustering::cluster_of(&clusters, id)
            .map(|c| {
                c.members
                    .iter()
                    .filter(|m| m.as_str() != id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        info!(
            group_id = %self.group_id,
            entry_id = %id,
            cluster_mates = mates.len(),
            "reference marked"
        );

        // Invalidate Completed, non-reference cluster mates so they resolve
        // against the new reference on their next pass. Appended in
        // invalidation order, not at their original queue position.
        for mate in mates {
            let invalidate = self
                .entries
                .get(&mate)
                .map(|e| e.status == EntryStatus::Completed && !e.is_reference)
                .unwrap_or(false);
            if invalidate {
                if let Some(e) = self.entries.get_mut(&mate) {
                    e.adjustments = None;
                }
                self.pending.push_back(mate.clone());
                self.set_status(&mate, EntryStatus::Pending, None);
                debug!(group_id = %self.group_id, entry_id = %mate, "entry invalidated by reference");
            }
        }
        Ok(())
    }

    fn set_adjustments(&mut self, id: &str, partial: &Adjustments) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;
        entry.manual_overrides.merge_from(partial);
        debug!(group_id = %self.group_id, entry_id = %id, "manual overrides merged");
        Ok(())
    }

    fn get_adjustments(&self, id: &str) -> Result<Option<Adjustments>> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))?;
        Ok(entry.resolved())
    }

    fn save_style(&mut self) -> Result<Style> {
        let unfinished = self
            .entries
            .values()
            .filter(|e| !e.status.is_terminal())
            .count();
        if unfinished > 0 {
            return Err(Error::PreconditionFailed(format!(
                "{} entries are still pending or processing",
                unfinished
            )));
        }

        let clusters = self.clusters();
        let computed_fields = self.config.computed_fields();
        let style = style_codec::derive_style(&self.entries, &clusters, &computed_fields);
        info!(
            group_id = %self.group_id,
            rules = style.rules.len(),
            "style saved"
        );
        Ok(style)
    }

    fn load_style(&mut self, style: Style) -> Result<()> {
        if !style.is_supported() {
            return Err(Error::VersionMismatch {
                found: style.version,
                supported: crate::models::STYLE_FORMAT_VERSION,
            });
        }
        info!(
            group_id = %self.group_id,
            rules = style.rules.len(),
            "style attached"
        );
        self.events.emit_lossy(GroupEvent::StyleAttached {
            group_id: self.group_id,
            version: style.version,
            rule_count: style.rules.len(),
            timestamp: chrono::Utc::now(),
        });
        self.style = Some(style);
        Ok(())
    }

    /// Rules 2-5 again for every Completed entry, without the gateway. The
    /// entry's own computed-kind values are reused from its materialized
    /// record, so rule 2 still holds.
    fn reresolve_completed(&mut self) -> usize {
        let completed: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .map(|e| e.status == EntryStatus::Completed)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let computed_fields = self.config.computed_fields();
        for id in &completed {
            let own_computed = self
                .entries
                .get(id)
                .and_then(|e| e.adjustments.as_ref())
                .map(|a| restrict(a, &computed_fields))
                .unwrap_or_default();
            let resolved = self.resolve(id, &own_computed);
            if let Some(entry) = self.entries.get_mut(id) {
                entry.adjustments = Some(resolved);
            }
        }
        debug!(group_id = %self.group_id, count = completed.len(), "completed entries re-resolved");
        completed.len()
    }

    /// Current partition over non-Failed entries with populated features,
    /// rebuilt on demand.
    fn clusters(&mut self) -> Vec<Cluster> {
        if let Some(cached) = &self.clusters_cache {
            return cached.clone();
        }
        let features: Vec<(String, FeatureVector)> = self
            .entries
            .values()
            .filter(|e| e.status != EntryStatus::Failed)
            .filter_map(|e| e.features.clone().map(|f| (e.id.clone(), f)))
            .collect();
        let clusters = clustering::partition(
            &features,
            self.config.similarity_threshold,
            self.config.metric,
        );
        self.clusters_cache = Some(clusters.clone());
        clusters
    }

    /// Apply a status transition and fire the per-entry and queue-level
    /// notifications, in that order.
    fn set_status(&mut self, id: &str, next: EntryStatus, error: Option<String>) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if !entry.status.can_transition_to(next) {
            warn!(
                group_id = %self.group_id,
                entry_id = %id,
                from = %entry.status,
                to = %next,
                "illegal status transition ignored"
            );
            return;
        }
        entry.status = next;
        entry.last_error = error.clone();

        self.events.emit_lossy(GroupEvent::EntryStatusChanged {
            group_id: self.group_id,
            entry_id: id.to_string(),
            status: next,
            error,
            timestamp: chrono::Utc::now(),
        });
        self.emit_progress();
    }

    fn emit_progress(&self) {
        let snapshot = self.snapshot();
        self.events.emit_lossy(GroupEvent::QueueProgress {
            group_id: self.group_id,
            completed_count: snapshot.completed,
            failed_count: snapshot.failed,
            total_count: snapshot.total,
            timestamp: chrono::Utc::now(),
        });
    }

    fn snapshot(&self) -> GroupSnapshot {
        let mut snapshot = GroupSnapshot {
            total: self.order.len(),
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            paused: !self.running,
            statuses: Vec::with_capacity(self.order.len()),
        };
        for id in &self.order {
            if let Some(entry) = self.entries.get(id) {
                match entry.status {
                    EntryStatus::Pending => snapshot.pending += 1,
                    EntryStatus::Processing => snapshot.processing += 1,
                    EntryStatus::Completed => snapshot.completed += 1,
                    EntryStatus::Failed => snapshot.failed += 1,
                }
                snapshot.statuses.push((id.clone(), entry.status));
            }
        }
        snapshot
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty()
            && !self
                .entries
                .values()
                .any(|e| e.status == EntryStatus::Processing)
    }

    fn check_waiters(&mut self) {
        if self.is_drained() && !self.waiters.is_empty() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

/// Copy of `record` keeping only `fields`.
fn restrict(record: &Adjustments, fields: &HashSet<AdjustmentField>) -> Adjustments {
    let mut out = Adjustments::default();
    for field in fields {
        out.set(*field, record.get(*field));
    }
    out
}
