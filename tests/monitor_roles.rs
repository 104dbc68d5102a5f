//! Warmup restore and active/passive role conversion.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use skerry::config::DurabilityConfig;
use skerry::core::{Level, PartitionId, Seqno};
use skerry::durability::{
    ActiveDurabilityMonitor, DurabilityMonitor, MonitorError, MonitorRole,
    PassiveDurabilityMonitor, PassiveResolution, PersistedPartitionState,
};

use common::{
    Applied, ManualClock, RecordingNotifier, RecordingStore, handle, harness, node, passive_harness,
    prepare,
};

fn warmup_monitor(
    persisted: PersistedPartitionState,
    outstanding: Vec<skerry::core::PreparedWrite>,
) -> (
    Result<ActiveDurabilityMonitor, MonitorError>,
    Arc<RecordingStore>,
    Arc<RecordingNotifier>,
) {
    let store = Arc::new(RecordingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::start());
    let monitor = ActiveDurabilityMonitor::from_warmup(
        DurabilityConfig::default(),
        PartitionId::new(0),
        store.clone(),
        notifier.clone(),
        clock,
        persisted,
        outstanding,
    );
    (monitor, store, notifier)
}

#[test]
fn warmup_restores_tracked_state() {
    let persisted = PersistedPartitionState {
        high_prepared_seqno: Seqno::new(4),
        high_completed_seqno: Seqno::new(2),
        persisted_seqno: Seqno::new(4),
    };
    let outstanding = vec![
        prepare(5, Level::PersistToMajority),
        prepare(6, Level::Majority),
    ];
    let (monitor, store, notifier) = warmup_monitor(persisted, outstanding);
    let monitor = monitor.unwrap();

    assert_eq!(monitor.num_tracked(), 2);
    assert_eq!(monitor.high_prepared_seqno(), Seqno::new(4));
    assert_eq!(monitor.high_completed_seqno(), Seqno::new(2));

    // topology stays unset until the caller installs one
    let err = monitor
        .add_sync_write(Some(handle(7)), prepare(7, Level::Majority))
        .unwrap_err();
    assert!(matches!(err, MonitorError::TopologyNotSet { .. }));

    monitor
        .set_replication_topology(&json!([["a", "b"]]))
        .unwrap();
    monitor
        .seqno_ack_received(&node("b"), Seqno::new(6))
        .unwrap();
    // seqno 5 still waits on the local flush recovering past it
    assert_eq!(monitor.tracked_seqnos(), vec![Seqno::new(5), Seqno::new(6)]);

    monitor.notify_local_persistence(Seqno::new(6));
    assert_eq!(monitor.num_tracked(), 0);
    assert_eq!(
        store.snapshot(),
        vec![
            Applied::Commit(Seqno::new(5)),
            Applied::Commit(Seqno::new(6))
        ]
    );
    // restored prepares carry no client handles, so nobody is notified
    assert!(notifier.snapshot().is_empty());
}

#[test]
fn warmup_rejects_out_of_order_prepares() {
    let outstanding = vec![prepare(6, Level::Majority), prepare(5, Level::Majority)];
    let (monitor, _, _) = warmup_monitor(PersistedPartitionState::default(), outstanding);
    let err = monitor.err().unwrap();
    assert!(matches!(
        err,
        MonitorError::OutOfOrderWarmupPrepare { .. }
    ));
}

#[test]
fn cookies_are_taken_once_and_never_renotified() {
    let h = harness();
    h.monitor
        .set_replication_topology(&json!([["a", "b"]]))
        .unwrap();
    h.monitor
        .add_sync_write(Some(handle(1)), prepare(1, Level::Majority))
        .unwrap();
    h.monitor
        .add_sync_write(None, prepare(2, Level::Majority))
        .unwrap();

    let cookies = h.monitor.get_cookies_for_in_flight_sync_writes();
    assert_eq!(cookies, vec![handle(1)]);
    assert!(h.monitor.get_cookies_for_in_flight_sync_writes().is_empty());

    h.monitor
        .seqno_ack_received(&node("b"), Seqno::new(2))
        .unwrap();
    assert_eq!(h.monitor.num_tracked(), 0);
    assert!(
        h.notifier.snapshot().is_empty(),
        "cleared handles must not be notified on completion"
    );
}

#[test]
fn passive_tracks_and_completes_in_decision_order() {
    let p = passive_harness();
    p.monitor
        .track_received_prepare(prepare(1, Level::Majority))
        .unwrap();
    p.monitor
        .track_received_prepare(prepare(2, Level::Majority))
        .unwrap();
    assert_eq!(p.monitor.high_prepared_seqno(), Seqno::new(2));

    let err = p
        .monitor
        .complete_sync_write(Seqno::new(2), PassiveResolution::Commit)
        .unwrap_err();
    assert!(matches!(err, MonitorError::UnexpectedCompletion { .. }));

    p.monitor
        .complete_sync_write(Seqno::new(1), PassiveResolution::Commit)
        .unwrap();
    p.monitor
        .complete_sync_write(Seqno::new(2), PassiveResolution::Abort)
        .unwrap();

    assert_eq!(p.monitor.num_tracked(), 0);
    assert_eq!(p.monitor.high_completed_seqno(), Seqno::new(2));
    assert_eq!(p.monitor.num_committed(), 1);
    assert_eq!(p.monitor.num_aborted(), 1);
    assert_eq!(
        p.store.snapshot(),
        vec![
            Applied::Commit(Seqno::new(1)),
            Applied::Abort(Seqno::new(2))
        ]
    );
}

#[test]
fn passive_high_prepared_waits_for_persistence() {
    let p = passive_harness();
    p.monitor
        .track_received_prepare(prepare(1, Level::PersistToMajority))
        .unwrap();
    assert_eq!(p.monitor.high_prepared_seqno(), Seqno::ZERO);

    p.monitor.notify_local_persistence(Seqno::new(1));
    assert_eq!(p.monitor.high_prepared_seqno(), Seqno::new(1));

    p.monitor
        .track_received_prepare(prepare(2, Level::Majority))
        .unwrap();
    assert_eq!(p.monitor.high_prepared_seqno(), Seqno::new(2));
}

#[test]
fn passive_converts_to_active_preserving_in_flight_prepares() {
    let p = passive_harness();
    p.monitor
        .track_received_prepare(prepare(3, Level::Majority))
        .unwrap();
    p.monitor
        .track_received_prepare(prepare(4, Level::PersistToMajority))
        .unwrap();

    let store = p.store.clone();
    let notifier = Arc::new(RecordingNotifier::default());
    let active = ActiveDurabilityMonitor::from_passive(p.monitor, notifier.clone());

    assert_eq!(active.tracked_seqnos(), vec![Seqno::new(3), Seqno::new(4)]);
    let err = active
        .add_sync_write(Some(handle(9)), prepare(9, Level::Majority))
        .unwrap_err();
    assert!(matches!(err, MonitorError::TopologyNotSet { .. }));

    active
        .set_replication_topology(&json!([["a", "b"]]))
        .unwrap();

    // deadlines were reset to "never" by the conversion
    active.process_timeout(std::time::Instant::now() + Duration::from_secs(3600));
    assert_eq!(active.num_tracked(), 2);

    active
        .seqno_ack_received(&node("b"), Seqno::new(4))
        .unwrap();
    assert_eq!(active.tracked_seqnos(), vec![Seqno::new(4)]);

    active.notify_local_persistence(Seqno::new(4));
    assert_eq!(active.num_tracked(), 0);
    assert_eq!(
        store.snapshot(),
        vec![
            Applied::Commit(Seqno::new(3)),
            Applied::Commit(Seqno::new(4))
        ]
    );
    // nothing to notify: replicas hold no client handles
    assert!(notifier.snapshot().is_empty());
}

#[test]
fn active_converts_to_passive_after_cookies_are_taken() {
    let h = harness();
    h.monitor
        .set_replication_topology(&json!([["a", "b"]]))
        .unwrap();
    h.monitor
        .add_sync_write(Some(handle(7)), prepare(7, Level::Majority))
        .unwrap();

    let cookies = h.monitor.get_cookies_for_in_flight_sync_writes();
    assert_eq!(cookies, vec![handle(7)]);

    let passive = PassiveDurabilityMonitor::from_active(h.monitor);
    assert_eq!(passive.num_tracked(), 1);
    assert_eq!(passive.high_prepared_seqno(), Seqno::new(7));

    passive
        .complete_sync_write(Seqno::new(7), PassiveResolution::Commit)
        .unwrap();
    assert_eq!(h.store.snapshot(), vec![Applied::Commit(Seqno::new(7))]);
}

#[test]
fn durability_monitor_enum_delegates_shared_operations() {
    let h = harness();
    h.monitor
        .set_replication_topology(&json!([["a", "b"]]))
        .unwrap();
    h.monitor
        .add_sync_write(Some(handle(1)), prepare(1, Level::Majority))
        .unwrap();

    let monitor = DurabilityMonitor::Active(h.monitor);
    assert_eq!(monitor.role(), MonitorRole::Active);
    assert_eq!(monitor.partition(), PartitionId::new(0));
    assert_eq!(monitor.high_prepared_seqno(), Seqno::new(1));
    assert_eq!(monitor.num_tracked(), 1);

    let stats = monitor.stats();
    assert_eq!(stats.num_accepted, 1);
    assert_eq!(stats.chains.len(), 1);
    assert_eq!(stats.chains[0].majority, 2);

    let DurabilityMonitor::Active(active) = monitor else {
        panic!("role changed unexpectedly");
    };
    let passive = PassiveDurabilityMonitor::from_active(active);
    let monitor = DurabilityMonitor::Passive(passive);
    assert_eq!(monitor.role(), MonitorRole::Passive);
    assert_eq!(monitor.num_tracked(), 1);
    assert!(monitor.stats().chains.is_empty());
}
