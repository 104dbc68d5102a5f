//! Passive durability monitor for replica partitions.
//!
//! A replica tracks the prepares streamed from the active, acks them back
//! (through the replication layer, which reads the high prepared seqno), and
//! applies commit/abort strictly in the order the active decided them.

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::DurabilityConfig;
use crate::core::{Level, PartitionId, PreparedWrite, Seqno};

use super::MonitorCore;
use super::clock::TimeSource;
use super::completed::{AbortReason, CompletedQueue, CompletedSyncWrite, Resolution};
use super::effects::PartitionStore;
use super::error::MonitorError;
use super::stats::{MonitorRole, MonitorStats};
use super::tracked::{SyncWrite, TrackedWrites};

/// The active's verdict for one prepare, relayed over the replication
/// stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassiveResolution {
    Commit,
    Abort,
}

struct PassiveState {
    tracked: TrackedWrites,
    high_prepared_seqno: Seqno,
    high_completed_seqno: Seqno,
    persisted_seqno: Seqno,
    num_accepted: u64,
    num_committed: u64,
    num_aborted: u64,
}

/// The durability monitor for a passive (replica) partition.
pub struct PassiveDurabilityMonitor {
    partition: PartitionId,
    config: DurabilityConfig,
    state: Mutex<PassiveState>,
    completed: CompletedQueue,
    store: Arc<dyn PartitionStore>,
    clock: Arc<dyn TimeSource>,
}

impl PassiveDurabilityMonitor {
    pub fn new(
        config: DurabilityConfig,
        partition: PartitionId,
        store: Arc<dyn PartitionStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            partition,
            config,
            state: Mutex::new(PassiveState {
                tracked: TrackedWrites::new(),
                high_prepared_seqno: Seqno::ZERO,
                high_completed_seqno: Seqno::ZERO,
                persisted_seqno: Seqno::ZERO,
                num_accepted: 0,
                num_committed: 0,
                num_aborted: 0,
            }),
            completed: CompletedQueue::new(),
            store,
            clock,
        }
    }

    /// Convert an active monitor into a passive one, retaining the in-flight
    /// prepares. Client handles do not survive: callers wanting to notify
    /// the blocked clients must take the cookies before converting.
    pub fn from_active(active: super::active::ActiveDurabilityMonitor) -> Self {
        let core = active.dismantle();
        let num_accepted = core.tracked.len() as u64;
        Self {
            partition: core.partition,
            config: core.config,
            state: Mutex::new(PassiveState {
                tracked: core.tracked,
                high_prepared_seqno: core.high_prepared_seqno,
                high_completed_seqno: core.high_completed_seqno,
                persisted_seqno: core.persisted_seqno,
                num_accepted,
                num_committed: 0,
                num_aborted: 0,
            }),
            completed: CompletedQueue::new(),
            store: core.store,
            clock: core.clock,
        }
    }

    /// Track a prepare received from the active, in stream (seqno) order.
    pub fn track_received_prepare(&self, prepare: PreparedWrite) -> Result<(), MonitorError> {
        let mut state = self.lock_state();
        let seqno = prepare.seqno;
        let level = prepare.level;
        state.tracked.append(SyncWrite::restored(prepare))?;
        state.num_accepted += 1;
        if level == Level::Majority && seqno > state.high_prepared_seqno {
            state.high_prepared_seqno = seqno;
        }
        Ok(())
    }

    /// Apply the active's commit/abort for the oldest tracked prepare.
    ///
    /// Completions arrive in decision order, so anything but the front is a
    /// broken stream.
    pub fn complete_sync_write(
        &self,
        seqno: Seqno,
        resolution: PassiveResolution,
    ) -> Result<(), MonitorError> {
        let mut state = self.lock_state();
        let expected = state.tracked.front().map(SyncWrite::seqno);
        if expected != Some(seqno) {
            return Err(MonitorError::UnexpectedCompletion {
                got: seqno,
                expected: expected.unwrap_or(Seqno::ZERO),
            });
        }
        let Some(write) = state.tracked.pop_front() else {
            return Err(MonitorError::UnexpectedCompletion {
                got: seqno,
                expected: Seqno::ZERO,
            });
        };

        if write.seqno() > state.high_completed_seqno {
            state.high_completed_seqno = write.seqno();
        }
        let resolution = match resolution {
            PassiveResolution::Commit => {
                state.num_committed += 1;
                Resolution::Commit
            }
            PassiveResolution::Abort => {
                state.num_aborted += 1;
                Resolution::Abort(AbortReason::Instructed)
            }
        };
        self.completed.push(CompletedSyncWrite {
            seqno: write.seqno(),
            key: write.key().clone(),
            resolution,
            client: None,
        });
        drop(state);
        self.drain_completed();
        Ok(())
    }

    /// Called by the storage layer after a successful flush; raises the high
    /// prepared seqno past persistence-gated prepares.
    pub fn notify_local_persistence(&self, persisted_seqno: Seqno) {
        let mut state = self.lock_state();
        if persisted_seqno > state.persisted_seqno {
            state.persisted_seqno = persisted_seqno;
        }
        let PassiveState {
            tracked,
            persisted_seqno: persisted,
            high_prepared_seqno,
            ..
        } = &mut *state;
        for write in tracked.iter() {
            let met = match write.level() {
                Level::Majority => true,
                Level::MajorityAndPersistOnMaster | Level::PersistToMajority => {
                    write.seqno() <= *persisted
                }
            };
            if met && write.seqno() > *high_prepared_seqno {
                *high_prepared_seqno = write.seqno();
            }
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn high_prepared_seqno(&self) -> Seqno {
        self.lock_state().high_prepared_seqno
    }

    pub fn high_completed_seqno(&self) -> Seqno {
        self.lock_state().high_completed_seqno
    }

    pub fn num_tracked(&self) -> usize {
        self.lock_state().tracked.len()
    }

    pub fn num_accepted(&self) -> u64 {
        self.lock_state().num_accepted
    }

    pub fn num_committed(&self) -> u64 {
        self.lock_state().num_committed
    }

    pub fn num_aborted(&self) -> u64 {
        self.lock_state().num_aborted
    }

    pub fn tracked_seqnos(&self) -> Vec<Seqno> {
        self.lock_state().tracked.seqnos()
    }

    pub fn stats(&self) -> MonitorStats {
        let state = self.lock_state();
        MonitorStats {
            role: MonitorRole::Passive,
            partition: self.partition,
            high_prepared_seqno: state.high_prepared_seqno,
            high_completed_seqno: state.high_completed_seqno,
            num_tracked: state.tracked.len(),
            num_accepted: state.num_accepted,
            num_committed: state.num_committed,
            num_aborted: state.num_aborted,
            chains: Vec::new(),
        }
    }

    fn drain_completed(&self) {
        self.completed.drain(|done| {
            let applied = match done.resolution {
                Resolution::Commit => self.store.commit(&done.key, done.seqno),
                Resolution::Abort(_) => self.store.abort(&done.key, done.seqno),
            };
            if let Err(err) = applied {
                warn!(
                    partition = %self.partition,
                    seqno = %done.seqno,
                    "applying completed sync write failed: {err}"
                );
            }
        });
    }

    /// Tear down into the role-neutral core, applying any still-queued
    /// decisions first.
    pub(crate) fn dismantle(self) -> MonitorCore {
        self.drain_completed();
        let state = self
            .state
            .into_inner()
            .expect("passive durability monitor state lock poisoned");
        MonitorCore {
            config: self.config,
            partition: self.partition,
            store: self.store,
            clock: self.clock,
            tracked: state.tracked,
            high_prepared_seqno: state.high_prepared_seqno,
            high_completed_seqno: state.high_completed_seqno,
            persisted_seqno: state.persisted_seqno,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, PassiveState> {
        self.state
            .lock()
            .expect("passive durability monitor state lock poisoned")
    }
}
