//! Scheduler lifecycle tests
//!
//! Queue draining order, pause/resume semantics, failure isolation, and the
//! status-count invariants.

mod helpers;

use autoadjust::{
    AdjustKind, AdjustmentGroup, Adjustments, EntryStatus, Error, GroupConfig, NewEntry,
};
use helpers::{dummy_source, init_tracing, EventLog, MockGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn entries(ids: &[&str]) -> Vec<NewEntry> {
    ids.iter().map(|id| NewEntry::new(*id, dummy_source())).collect()
}

fn spaced_gateway(ids: &[&str]) -> MockGateway {
    // Far-apart features so every entry is its own cluster.
    ids.iter().enumerate().fold(MockGateway::new(), |gw, (i, id)| {
        gw.with_output(id, &[i as f64 * 100.0], Adjustments::default())
    })
}

fn assert_counts_consistent(snapshot: &autoadjust::GroupSnapshot) {
    assert_eq!(
        snapshot.pending + snapshot.processing + snapshot.completed + snapshot.failed,
        snapshot.total,
        "status counts must partition the group"
    );
}

#[tokio::test]
async fn group_starts_paused_and_processes_nothing() {
    init_tracing();
    let gateway = Arc::new(spaced_gateway(&["a", "b"]));
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway.clone(), entries(&["a", "b"]))
            .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = group.snapshot().await.unwrap();
    assert!(snapshot.paused);
    assert_eq!(snapshot.pending, 2);
    assert_eq!(gateway.call_count("a"), 0, "paused group must not compute");
    assert_counts_consistent(&snapshot);
}

#[tokio::test]
async fn resume_drains_queue_in_insertion_order() {
    init_tracing();
    let gateway = Arc::new(spaced_gateway(&["c", "a", "b"]));
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway.clone(),
        entries(&["c", "a", "b"]),
    )
    .unwrap();

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();

    assert_eq!(
        gateway.calls(),
        vec!["c", "a", "b"],
        "dequeue follows insertion order, not id order"
    );
    let snapshot = group.snapshot().await.unwrap();
    assert_eq!(snapshot.completed, 3);
    assert_counts_consistent(&snapshot);
}

#[tokio::test]
async fn failure_is_isolated_to_one_entry() {
    let gateway = Arc::new(
        spaced_gateway(&["a", "c"]).with_failure("b", "decoder rejected frame"),
    );
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway.clone(),
        entries(&["a", "b", "c"]),
    )
    .unwrap();
    let log = EventLog::attach(&group);

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();

    let snapshot = group.snapshot().await.unwrap();
    assert_eq!(snapshot.completed, 2, "siblings unaffected by the failure");
    assert_eq!(snapshot.failed, 1);
    assert_counts_consistent(&snapshot);

    assert_eq!(
        group.last_error("b").await.unwrap().as_deref(),
        Some("decoder rejected frame")
    );
    assert!(group.get_adjustments("b").await.unwrap().is_none());
    log.settle().await;
    assert_eq!(
        log.statuses_of("b"),
        vec![EntryStatus::Processing, EntryStatus::Failed]
    );
}

#[tokio::test]
async fn wait_never_resolves_while_paused_with_pending_work() {
    // Scenario: pause with pending entries remaining, then wait. The wait
    // must not resolve until a later resume drains the queue; the timeout
    // here asserts intended behavior, not a hang.
    let gateway = Arc::new(
        spaced_gateway(&["a", "b", "c", "d"]).with_delay(Duration::from_millis(30)),
    );
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway.clone(),
        entries(&["a", "b", "c", "d"]),
    )
    .unwrap();

    group.resume().unwrap();
    group.pause().unwrap();

    let waited = timeout(Duration::from_millis(200), group.wait_until_completed()).await;
    assert!(waited.is_err(), "wait must not resolve while paused");

    let snapshot = group.snapshot().await.unwrap();
    assert!(snapshot.paused);
    assert!(snapshot.pending > 0);
    assert_counts_consistent(&snapshot);

    group.resume().unwrap();
    timeout(Duration::from_secs(2), group.wait_until_completed())
        .await
        .expect("resume must drain the queue")
        .unwrap();
    assert_eq!(group.snapshot().await.unwrap().completed, 4);
}

#[tokio::test]
async fn pause_stops_after_the_in_flight_entry() {
    let gateway = Arc::new(
        spaced_gateway(&["a", "b", "c"]).with_delay(Duration::from_millis(60)),
    );
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway.clone(),
        entries(&["a", "b", "c"]),
    )
    .unwrap();

    group.resume().unwrap();
    // Let the first compute get in flight, then request a pause.
    tokio::time::sleep(Duration::from_millis(20)).await;
    group.pause().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = group.snapshot().await.unwrap();
    assert_eq!(
        snapshot.completed, 1,
        "the in-flight entry finishes, nothing new starts"
    );
    assert_eq!(snapshot.pending, 2);
    assert_eq!(gateway.calls().len(), 1);
    assert_counts_consistent(&snapshot);
}

#[tokio::test]
async fn resume_and_pause_are_idempotent() {
    let gateway = Arc::new(spaced_gateway(&["a"]));
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway, entries(&["a"])).unwrap();
    let log = EventLog::attach(&group);

    group.resume().unwrap();
    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();
    group.pause().unwrap();
    group.pause().unwrap();

    // Snapshot round-trip flushes the command queue before counting.
    let snapshot = group.snapshot().await.unwrap();
    assert!(snapshot.paused);
    log.settle().await;
    assert_eq!(log.count_of("GroupResumed"), 1, "second resume is a no-op");
    assert_eq!(log.count_of("GroupPaused"), 1, "second pause is a no-op");
}

#[tokio::test]
async fn at_most_one_entry_processing_at_any_instant() {
    let gateway = Arc::new(
        spaced_gateway(&["a", "b", "c", "d"]).with_delay(Duration::from_millis(10)),
    );
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway,
        entries(&["a", "b", "c", "d"]),
    )
    .unwrap();
    let log = EventLog::attach(&group);

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();
    log.settle().await;

    // Replay the status stream; the processing set may never exceed one.
    let mut processing = std::collections::HashSet::new();
    for event in log.all() {
        if let autoadjust::GroupEvent::EntryStatusChanged {
            entry_id, status, ..
        } = event
        {
            match status {
                EntryStatus::Processing => {
                    processing.insert(entry_id.clone());
                }
                _ => {
                    processing.remove(&entry_id);
                }
            }
            assert!(
                processing.len() <= 1,
                "two entries processing concurrently: {:?}",
                processing
            );
        }
    }
}

#[tokio::test]
async fn queue_progress_fires_after_every_transition() {
    let gateway = Arc::new(spaced_gateway(&["a", "b"]));
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway, entries(&["a", "b"])).unwrap();
    let mut rx = group.subscribe();

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();

    let mut last_progress = None;
    let mut transitions = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            autoadjust::GroupEvent::EntryStatusChanged { .. } => transitions += 1,
            autoadjust::GroupEvent::QueueProgress {
                completed_count,
                total_count,
                ..
            } => last_progress = Some((completed_count, total_count)),
            _ => {}
        }
    }
    // Processing + Completed for each of two entries.
    assert_eq!(transitions, 4);
    assert_eq!(last_progress, Some((2, 2)));
}

#[tokio::test]
async fn incremental_registration_feeds_a_running_group() {
    let gateway = Arc::new(spaced_gateway(&["a", "b", "c"]));
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway.clone(), entries(&["a"]))
            .unwrap();

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();

    group.register_entries(entries(&["b", "c"])).await.unwrap();
    group.wait_until_completed().await.unwrap();

    let snapshot = group.snapshot().await.unwrap();
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(gateway.calls(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let gateway = Arc::new(MockGateway::new());
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway.clone(), entries(&["a"]))
            .unwrap();

    let err = group.register_entries(entries(&["a"])).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateEntry(id) if id == "a"));

    let err = AdjustmentGroup::new(
        GroupConfig::new(vec![], 0.5),
        gateway,
        entries(&["x", "x"]),
    )
    .unwrap_err();
    assert!(matches!(err, Error::DuplicateEntry(_)));
}

#[tokio::test]
async fn get_adjustments_absent_for_non_completed_entries() {
    let gateway = Arc::new(spaced_gateway(&["a"]));
    let group =
        AdjustmentGroup::new(GroupConfig::new(vec![], 0.5), gateway, entries(&["a"])).unwrap();

    // Pending (never resumed): absent.
    assert!(group.get_adjustments("a").await.unwrap().is_none());

    // Unknown id: structural error, not absence.
    let err = group.get_adjustments("ghost").await.unwrap_err();
    assert!(matches!(err, Error::EntryNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn computed_kind_fields_come_from_the_gateway_result() {
    let gateway = Arc::new(MockGateway::new().with_output(
        "a",
        &[1.0],
        Adjustments {
            straighten_angle: Some(-2.5),
            // Outside the configured kinds; must be ignored by resolution.
            exposure: Some(9.9),
            ..Default::default()
        },
    ));
    let group = AdjustmentGroup::new(
        GroupConfig::new(vec![AdjustKind::Straighten], 0.5),
        gateway,
        entries(&["a"]),
    )
    .unwrap();

    group.resume().unwrap();
    group.wait_until_completed().await.unwrap();

    let resolved = group.get_adjustments("a").await.unwrap().unwrap();
    assert_eq!(resolved.straighten_angle, Some(-2.5));
    assert_eq!(
        resolved.exposure, None,
        "non-computed-kind fields never come from the gateway"
    );
}
