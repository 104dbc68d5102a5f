//! Shared test doubles for the durability monitor integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use skerry::config::DurabilityConfig;
use skerry::core::{ClientHandle, Key, Level, NodeId, PartitionId, PreparedWrite, Seqno};
use skerry::durability::{
    ActiveDurabilityMonitor, ClientNotifier, PartitionStore, PassiveDurabilityMonitor, StoreError,
    SyncWriteResult, TimeSource,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Commit(Seqno),
    Abort(Seqno),
}

/// Hash-table stand-in that records every applied resolution in order.
#[derive(Default)]
pub struct RecordingStore {
    applied: Mutex<Vec<Applied>>,
}

impl RecordingStore {
    pub fn snapshot(&self) -> Vec<Applied> {
        self.applied.lock().unwrap().clone()
    }
}

impl PartitionStore for RecordingStore {
    fn commit(&self, _key: &Key, prepare_seqno: Seqno) -> Result<(), StoreError> {
        self.applied
            .lock()
            .unwrap()
            .push(Applied::Commit(prepare_seqno));
        Ok(())
    }

    fn abort(&self, _key: &Key, prepare_seqno: Seqno) -> Result<(), StoreError> {
        self.applied
            .lock()
            .unwrap()
            .push(Applied::Abort(prepare_seqno));
        Ok(())
    }
}

/// Notifier stand-in recording every woken client.
#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<(ClientHandle, SyncWriteResult)>>,
}

impl RecordingNotifier {
    pub fn snapshot(&self) -> Vec<(ClientHandle, SyncWriteResult)> {
        self.notified.lock().unwrap().clone()
    }
}

impl ClientNotifier for RecordingNotifier {
    fn notify(&self, client: ClientHandle, result: SyncWriteResult) {
        self.notified.lock().unwrap().push((client, result));
    }
}

/// Hand-cranked monotonic clock.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn start() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn current(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        self.current()
    }
}

pub struct Harness {
    pub monitor: ActiveDurabilityMonitor,
    pub store: Arc<RecordingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

pub fn harness() -> Harness {
    harness_with_config(DurabilityConfig::default())
}

pub fn harness_with_config(config: DurabilityConfig) -> Harness {
    let store = Arc::new(RecordingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::start());
    let monitor = ActiveDurabilityMonitor::new(
        config,
        PartitionId::new(0),
        store.clone(),
        notifier.clone(),
        clock.clone(),
    );
    Harness {
        monitor,
        store,
        notifier,
        clock,
    }
}

pub struct PassiveHarness {
    pub monitor: PassiveDurabilityMonitor,
    pub store: Arc<RecordingStore>,
    pub clock: Arc<ManualClock>,
}

pub fn passive_harness() -> PassiveHarness {
    let store = Arc::new(RecordingStore::default());
    let clock = Arc::new(ManualClock::start());
    let monitor = PassiveDurabilityMonitor::new(
        DurabilityConfig::default(),
        PartitionId::new(0),
        store.clone(),
        clock.clone(),
    );
    PassiveHarness {
        monitor,
        store,
        clock,
    }
}

pub fn node(raw: &str) -> NodeId {
    NodeId::parse(raw).unwrap()
}

pub fn handle(token: u64) -> ClientHandle {
    ClientHandle::new(token)
}

pub fn prepare(seqno: i64, level: Level) -> PreparedWrite {
    PreparedWrite::new(
        Key::new(format!("k{seqno}").into_bytes()),
        Seqno::new(seqno),
        level,
        None,
    )
}

pub fn prepare_with_timeout(seqno: i64, level: Level, timeout: Duration) -> PreparedWrite {
    PreparedWrite::new(
        Key::new(format!("k{seqno}").into_bytes()),
        Seqno::new(seqno),
        level,
        Some(timeout),
    )
}
