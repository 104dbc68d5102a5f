//! Active durability monitor: drives completion of tracked sync writes.
//!
//! One instance per active partition. Client threads add prepares, the
//! replication layer feeds seqno acks, and a timer task sweeps deadlines.
//! All three paths mutate state under one lock, queue their commit/abort
//! decisions, and apply them to the hash table only after releasing it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::DurabilityConfig;
use crate::core::{ClientHandle, Level, NodeId, PartitionId, PreparedWrite, Seqno};

use super::MonitorCore;
use super::chain::Topology;
use super::clock::TimeSource;
use super::completed::{AbortReason, CompletedQueue, CompletedSyncWrite, Resolution};
use super::effects::PartitionStore;
use super::error::MonitorError;
use super::notify::{ClientNotifier, SyncWriteResult};
use super::passive::PassiveDurabilityMonitor;
use super::persisted::PersistedPartitionState;
use super::stats::{ChainStats, MonitorRole, MonitorStats, NodeStats};
use super::tracked::{SyncWrite, TrackedWrites};

/// Everything guarded by the state lock. The completed queue stays outside
/// so decisions can be applied without holding it.
struct State {
    topology: Option<Topology>,
    tracked: TrackedWrites,
    /// Acks from nodes outside the current topology, keyed by node and
    /// superseded by later acks. Applied if a topology change brings the
    /// node in; removed when its stream closes.
    queued_acks: BTreeMap<NodeId, Seqno>,
    high_prepared_seqno: Seqno,
    high_completed_seqno: Seqno,
    /// Highest seqno the local storage layer has flushed.
    persisted_seqno: Seqno,
    num_accepted: u64,
    num_committed: u64,
    num_aborted: u64,
}

impl State {
    fn fresh() -> Self {
        Self {
            topology: None,
            tracked: TrackedWrites::new(),
            queued_acks: BTreeMap::new(),
            high_prepared_seqno: Seqno::ZERO,
            high_completed_seqno: Seqno::ZERO,
            persisted_seqno: Seqno::ZERO,
            num_accepted: 0,
            num_committed: 0,
            num_aborted: 0,
        }
    }

    /// Commit condition for one tracked write against the installed
    /// topology. Replica acks are producer-gated (a replica only acks a
    /// persist-level prepare once it persisted it), so the ack set is
    /// level-correct by construction; the active's own membership is gated
    /// where it is added.
    fn commit_satisfied(&self, write: &SyncWrite) -> bool {
        let Some(topology) = &self.topology else {
            return false;
        };
        if !topology
            .chains()
            .all(|chain| chain.majority_met(write.acked_by()))
        {
            return false;
        }
        match write.level() {
            Level::Majority | Level::PersistToMajority => true,
            Level::MajorityAndPersistOnMaster => self.persisted_seqno >= write.seqno(),
        }
    }

    /// Walk from the front, committing while the front prepare is
    /// satisfied. Never commits out of order: an unsatisfied front blocks
    /// everything behind it.
    fn check_for_commit(&mut self, completed: &CompletedQueue) {
        loop {
            let Some(front) = self.tracked.front() else {
                return;
            };
            if !self.commit_satisfied(front) {
                return;
            }
            let Some(write) = self.tracked.pop_front() else {
                return;
            };
            self.complete(completed, write, Resolution::Commit);
        }
    }

    fn complete(&mut self, completed: &CompletedQueue, mut write: SyncWrite, resolution: Resolution) {
        if write.seqno() > self.high_completed_seqno {
            self.high_completed_seqno = write.seqno();
        }
        match resolution {
            Resolution::Commit => self.num_committed += 1,
            Resolution::Abort(_) => self.num_aborted += 1,
        }
        completed.push(CompletedSyncWrite {
            seqno: write.seqno(),
            key: write.key().clone(),
            resolution,
            client: write.take_client(),
        });
    }

    /// Abort a prepare that was never tracked (durability impossible on
    /// arrival). The log accepted it, so the hash table still needs the
    /// abort.
    fn complete_untracked(
        &mut self,
        completed: &CompletedQueue,
        prepare: PreparedWrite,
        client: Option<ClientHandle>,
    ) {
        if prepare.seqno > self.high_completed_seqno {
            self.high_completed_seqno = prepare.seqno;
        }
        self.num_aborted += 1;
        completed.push(CompletedSyncWrite {
            seqno: prepare.seqno,
            key: prepare.key,
            resolution: Resolution::Abort(AbortReason::DurabilityImpossible),
            client,
        });
    }

    /// Raise a node's ack seqno and cross every tracked write it covers.
    fn apply_ack(&mut self, node: &NodeId, seqno: Seqno) {
        if let Some(topology) = self.topology.as_mut() {
            for chain in topology.chains_mut() {
                if let Some(position) = chain.position_mut(node)
                    && seqno > position.ack_seqno
                {
                    position.ack_seqno = seqno;
                }
            }
        }
        self.advance_node(node);
    }

    /// Advance a node's write cursor while the next tracked write is within
    /// its ack seqno, recording the ack on each crossed prepare.
    fn advance_node(&mut self, node: &NodeId) {
        let State {
            topology, tracked, ..
        } = self;
        let Some(topology) = topology.as_mut() else {
            return;
        };
        for chain in topology.chains_mut() {
            let Some(position) = chain.position_mut(node) else {
                continue;
            };
            while let Some(next) = tracked.first_seqno_after(position.write_seqno) {
                if next > position.ack_seqno {
                    break;
                }
                position.write_seqno = next;
                if let Some(write) = tracked.get_mut(next) {
                    write.add_ack(node.clone());
                }
            }
        }
    }

    /// Re-cross for every replica; a freshly appended prepare may already be
    /// covered by acks that ran ahead of tracking.
    fn advance_all_replicas(&mut self) {
        let Some(topology) = &self.topology else {
            return;
        };
        let active = topology.active().clone();
        let nodes: Vec<NodeId> = topology
            .chains()
            .flat_map(|chain| chain.assigned().cloned())
            .filter(|node| node != &active)
            .collect();
        for node in nodes {
            self.advance_node(&node);
        }
    }

    /// Record the active node's own acks: immediate for Majority prepares,
    /// gated on the local flush for persistence-sensitive levels. Raises the
    /// high prepared seqno for every prepare whose self-ack condition holds.
    fn refresh_self_acks(&mut self) {
        let State {
            topology,
            tracked,
            persisted_seqno,
            high_prepared_seqno,
            ..
        } = self;
        let Some(topology) = topology.as_ref() else {
            return;
        };
        let active = topology.active().clone();
        for write in tracked.iter_mut() {
            let met = match write.level() {
                Level::Majority => true,
                Level::MajorityAndPersistOnMaster | Level::PersistToMajority => {
                    write.seqno() <= *persisted_seqno
                }
            };
            if !met {
                continue;
            }
            write.add_ack(active.clone());
            if write.level().requires_local_persistence() {
                write.mark_persisted_on_master();
            }
            if write.seqno() > *high_prepared_seqno {
                *high_prepared_seqno = write.seqno();
            }
        }
    }

    /// Keep the active node's chain position in step with its self-acks.
    fn refresh_active_position(&mut self) {
        let State {
            topology,
            tracked,
            high_prepared_seqno,
            ..
        } = self;
        let Some(topology) = topology.as_mut() else {
            return;
        };
        let active = topology.active().clone();
        for chain in topology.chains_mut() {
            let Some(position) = chain.position_mut(&active) else {
                continue;
            };
            if *high_prepared_seqno > position.ack_seqno {
                position.ack_seqno = *high_prepared_seqno;
            }
            while let Some(next) = tracked.first_seqno_after(position.write_seqno) {
                let Some(write) = tracked.get(next) else {
                    break;
                };
                if !write.acked_by().contains(&active) {
                    break;
                }
                position.write_seqno = next;
            }
        }
    }
}

/// The durability monitor for an active partition.
///
/// Tracks pending sync writes and the acks replicas send back, and commits
/// or aborts each prepare according to the replication topology.
pub struct ActiveDurabilityMonitor {
    partition: PartitionId,
    config: DurabilityConfig,
    state: Mutex<State>,
    completed: CompletedQueue,
    store: Arc<dyn PartitionStore>,
    notifier: Arc<dyn ClientNotifier>,
    clock: Arc<dyn TimeSource>,
}

impl ActiveDurabilityMonitor {
    pub fn new(
        config: DurabilityConfig,
        partition: PartitionId,
        store: Arc<dyn PartitionStore>,
        notifier: Arc<dyn ClientNotifier>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            partition,
            config,
            state: Mutex::new(State::fresh()),
            completed: CompletedQueue::new(),
            store,
            notifier,
            clock,
        }
    }

    /// Restore an active monitor from the persisted partition state plus the
    /// outstanding prepares, in ascending seqno order. Restored prepares
    /// carry no client handle and no deadline; topology stays unset until
    /// the caller installs one.
    pub fn from_warmup(
        config: DurabilityConfig,
        partition: PartitionId,
        store: Arc<dyn PartitionStore>,
        notifier: Arc<dyn ClientNotifier>,
        clock: Arc<dyn TimeSource>,
        persisted: PersistedPartitionState,
        outstanding: Vec<PreparedWrite>,
    ) -> Result<Self, MonitorError> {
        let mut tracked = TrackedWrites::new();
        let mut prev = Seqno::ZERO;
        for prepare in outstanding {
            if prepare.seqno <= prev {
                return Err(MonitorError::OutOfOrderWarmupPrepare {
                    prev,
                    got: prepare.seqno,
                });
            }
            prev = prepare.seqno;
            tracked.append(SyncWrite::restored(prepare))?;
        }

        let num_accepted = tracked.len() as u64;
        let state = State {
            topology: None,
            tracked,
            queued_acks: BTreeMap::new(),
            high_prepared_seqno: persisted.high_prepared_seqno,
            high_completed_seqno: persisted.high_completed_seqno,
            persisted_seqno: persisted.persisted_seqno,
            num_accepted,
            num_committed: 0,
            num_aborted: 0,
        };
        Ok(Self {
            partition,
            config,
            state: Mutex::new(state),
            completed: CompletedQueue::new(),
            store,
            notifier,
            clock,
        })
    }

    /// Convert a passive monitor into an active one, retaining the in-flight
    /// prepares. Deadlines stay "never" until the next topology is set, and
    /// no prepare carries a client handle (replicas have none).
    pub fn from_passive(
        passive: PassiveDurabilityMonitor,
        notifier: Arc<dyn ClientNotifier>,
    ) -> Self {
        let core = passive.dismantle();
        let num_accepted = core.tracked.len() as u64;
        let state = State {
            topology: None,
            tracked: core.tracked,
            queued_acks: BTreeMap::new(),
            high_prepared_seqno: core.high_prepared_seqno,
            high_completed_seqno: core.high_completed_seqno,
            persisted_seqno: core.persisted_seqno,
            num_accepted,
            num_committed: 0,
            num_aborted: 0,
        };
        Self {
            partition: core.partition,
            config: core.config,
            state: Mutex::new(state),
            completed: CompletedQueue::new(),
            store: core.store,
            notifier,
            clock: core.clock,
        }
    }

    /// Install a replication topology.
    ///
    /// Validation happens before any state changes. Nodes surviving from the
    /// previous topology keep their positions; queued acks from nodes the
    /// change brings in are applied and may complete prepares immediately.
    pub fn set_replication_topology(
        &self,
        topology: &serde_json::Value,
    ) -> Result<(), MonitorError> {
        let mut incoming = Topology::parse(topology, self.config.max_chain_size())?;

        let mut state = self.lock_state();
        if let Some(old) = state.topology.as_ref() {
            incoming.adopt_positions(old);
        }
        info!(
            partition = %self.partition,
            topology = %topology,
            "replication topology installed"
        );
        state.topology = Some(incoming);

        let pending: Vec<(NodeId, Seqno)> = state
            .queued_acks
            .iter()
            .filter(|(node, _)| {
                state
                    .topology
                    .as_ref()
                    .is_some_and(|topology| topology.contains(node))
            })
            .map(|(node, &seqno)| (node.clone(), seqno))
            .collect();
        for (node, seqno) in pending {
            state.queued_acks.remove(&node);
            state.apply_ack(&node, seqno);
        }

        state.refresh_self_acks();
        state.advance_all_replicas();
        state.refresh_active_position();
        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
        Ok(())
    }

    /// True iff every chain has enough assigned nodes to ever reach its
    /// majority.
    pub fn is_durability_possible(&self) -> bool {
        self.lock_state()
            .topology
            .as_ref()
            .is_some_and(Topology::durability_possible)
    }

    /// Start tracking a new sync write the log has accepted.
    ///
    /// When the topology cannot satisfy any durability requirement the
    /// prepare is aborted on the spot instead of tracked; the client is
    /// notified with the durability-impossible status.
    pub fn add_sync_write(
        &self,
        client: Option<ClientHandle>,
        prepare: PreparedWrite,
    ) -> Result<(), MonitorError> {
        let mut state = self.lock_state();
        let Some(topology) = state.topology.as_ref() else {
            return Err(MonitorError::TopologyNotSet {
                partition: self.partition,
            });
        };

        if !topology.durability_possible() {
            debug!(
                partition = %self.partition,
                seqno = %prepare.seqno,
                "durability impossible, aborting prepare on arrival"
            );
            state.complete_untracked(&self.completed, prepare, client);
            drop(state);
            self.drain_completed();
            return Ok(());
        }

        let active = topology.active().clone();
        let deadline = prepare
            .timeout
            .or(self.config.default_timeout())
            .map(|timeout| self.clock.now() + timeout);
        let seqno = prepare.seqno;
        let level = prepare.level;
        let mut write = SyncWrite::tracked(prepare, client, deadline);
        if level == Level::Majority {
            // the active's ack is implicit at tracking time
            write.add_ack(active);
        }
        state.tracked.append(write)?;
        state.num_accepted += 1;
        if level == Level::Majority && seqno > state.high_prepared_seqno {
            state.high_prepared_seqno = seqno;
        }

        // replicas whose acks ran ahead of tracking cover this prepare now
        state.advance_all_replicas();
        state.refresh_active_position();
        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
        Ok(())
    }

    /// Apply a seqno ack from a replica.
    ///
    /// Acks from nodes outside the topology are queued for a later topology
    /// change. Protocol violations fail the call without touching tracked
    /// state; the caller closes the offending stream.
    pub fn seqno_ack_received(
        &self,
        node: &NodeId,
        prepared_seqno: Seqno,
    ) -> Result<(), MonitorError> {
        let mut state = self.lock_state();

        let known = state
            .topology
            .as_ref()
            .is_some_and(|topology| topology.contains(node));
        if !known {
            let entry = state.queued_acks.entry(node.clone()).or_insert(Seqno::ZERO);
            if prepared_seqno > *entry {
                *entry = prepared_seqno;
            }
            debug!(
                partition = %self.partition,
                node = %node,
                seqno = %prepared_seqno,
                "queued ack from node outside the topology"
            );
            return Ok(());
        }

        let topology = state
            .topology
            .as_ref()
            .expect("topology checked above");
        if node == topology.active() {
            warn!(
                partition = %self.partition,
                node = %node,
                "ignoring seqno ack claiming to be the active node"
            );
            return Ok(());
        }

        let current = topology
            .position(node)
            .map(|position| position.ack_seqno)
            .unwrap_or(Seqno::ZERO);
        if prepared_seqno < current {
            warn!(
                partition = %self.partition,
                node = %node,
                current = %current,
                got = %prepared_seqno,
                "replica ack went backwards"
            );
            return Err(MonitorError::AckNonMonotonic {
                node: node.clone(),
                current,
                got: prepared_seqno,
            });
        }
        let high_seqno = state.tracked.high_seqno();
        if prepared_seqno > high_seqno {
            warn!(
                partition = %self.partition,
                node = %node,
                got = %prepared_seqno,
                high_seqno = %high_seqno,
                "replica acked a seqno the log has not prepared"
            );
            return Err(MonitorError::AckAheadOfLog {
                node: node.clone(),
                got: prepared_seqno,
                high_seqno,
            });
        }

        state.apply_ack(node, prepared_seqno);
        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
        Ok(())
    }

    /// Abort every tracked prepare whose deadline passed before `as_of`.
    ///
    /// A prepare whose commit condition is already satisfied commits instead
    /// of aborting, even when expired.
    pub fn process_timeout(&self, as_of: Instant) {
        let mut state = self.lock_state();
        state.check_for_commit(&self.completed);

        let expired: Vec<Seqno> = state
            .tracked
            .iter()
            .filter(|write| write.expired_by(as_of) && !state.commit_satisfied(write))
            .map(SyncWrite::seqno)
            .collect();
        for seqno in expired {
            if let Some(write) = state.tracked.remove(seqno) {
                info!(
                    partition = %self.partition,
                    seqno = %seqno,
                    "sync write timed out"
                );
                state.complete(&self.completed, write, Resolution::Abort(AbortReason::Timeout));
            }
        }

        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
    }

    /// Called by the storage layer after a successful flush. Advances the
    /// active node's persistence-gated acks, which may raise the high
    /// prepared seqno and unblock commits.
    pub fn notify_local_persistence(&self, persisted_seqno: Seqno) {
        let mut state = self.lock_state();
        if persisted_seqno > state.persisted_seqno {
            state.persisted_seqno = persisted_seqno;
        }
        state.refresh_self_acks();
        state.refresh_active_position();
        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
    }

    /// Re-evaluate commits without any new input.
    pub fn check_for_commit(&self) {
        let mut state = self.lock_state();
        state.check_for_commit(&self.completed);
        drop(state);
        self.drain_completed();
    }

    /// Drop the queued ack for a node whose stream closed.
    pub fn removed_queued_ack(&self, node: &NodeId) {
        self.lock_state().queued_acks.remove(node);
    }

    /// Take (and clear) the client handles of every in-flight sync write.
    ///
    /// Clearing prevents a double notification; the caller must notify each
    /// returned handle exactly once.
    pub fn get_cookies_for_in_flight_sync_writes(&self) -> Vec<ClientHandle> {
        self.lock_state()
            .tracked
            .iter_mut()
            .filter_map(SyncWrite::take_client)
            .collect()
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

    pub fn first_chain_size(&self) -> usize {
        self.lock_state()
            .topology
            .as_ref()
            .map_or(0, |topology| topology.first().size())
    }

    pub fn first_chain_majority(&self) -> usize {
        self.lock_state()
            .topology
            .as_ref()
            .map_or(0, |topology| topology.first().majority())
    }

    pub fn second_chain_size(&self) -> usize {
        self.lock_state()
            .topology
            .as_ref()
            .and_then(Topology::second)
            .map_or(0, |chain| chain.size())
    }

    pub fn second_chain_majority(&self) -> usize {
        self.lock_state()
            .topology
            .as_ref()
            .and_then(Topology::second)
            .map_or(0, |chain| chain.majority())
    }

    /// Seqno of the tracked write the node's cursor currently points at.
    pub fn node_write_seqno(&self, node: &NodeId) -> Option<Seqno> {
        self.lock_state()
            .topology
            .as_ref()
            .and_then(|topology| topology.position(node))
            .map(|position| position.write_seqno)
    }

    /// Last seqno acked by the node; may run ahead of its write seqno.
    pub fn node_ack_seqno(&self, node: &NodeId) -> Option<Seqno> {
        self.lock_state()
            .topology
            .as_ref()
            .and_then(|topology| topology.position(node))
            .map(|position| position.ack_seqno)
    }

    /// Diagnostic: the seqnos currently tracked.
    pub fn tracked_seqnos(&self) -> Vec<Seqno> {
        self.lock_state().tracked.seqnos()
    }

    /// Diagnostic: the currently tracked writes.
    pub fn tracked_writes(&self) -> Vec<SyncWrite> {
        self.lock_state().tracked.iter().cloned().collect()
    }

    pub fn stats(&self) -> MonitorStats {
        let state = self.lock_state();
        MonitorStats {
            role: MonitorRole::Active,
            partition: self.partition,
            high_prepared_seqno: state.high_prepared_seqno,
            high_completed_seqno: state.high_completed_seqno,
            num_tracked: state.tracked.len(),
            num_accepted: state.num_accepted,
            num_committed: state.num_committed,
            num_aborted: state.num_aborted,
            chains: state
                .topology
                .as_ref()
                .map(chain_stats)
                .unwrap_or_default(),
        }
    }

    /// Apply queued decisions to the hash table and wake their clients, in
    /// decision order, without holding the state lock.
    fn drain_completed(&self) {
        self.completed.drain(|done| {
            let applied = match done.resolution {
                Resolution::Commit => self.store.commit(&done.key, done.seqno),
                Resolution::Abort(_) => self.store.abort(&done.key, done.seqno),
            };
            if let Err(err) = applied {
                // the decision is authoritative; the store failure is not
                warn!(
                    partition = %self.partition,
                    seqno = %done.seqno,
                    "applying completed sync write failed: {err}"
                );
            }
            if let Some(client) = done.client {
                self.notifier.notify(client, SyncWriteResult::from(done.resolution));
            }
        });
    }

    /// Tear down into the role-neutral core, applying any still-queued
    /// decisions first. Deadlines and client handles do not survive a role
    /// change.
    pub(crate) fn dismantle(self) -> MonitorCore {
        self.drain_completed();
        let mut state = self
            .state
            .into_inner()
            .expect("active durability monitor state lock poisoned");
        for write in state.tracked.iter_mut() {
            write.clear_deadline();
            write.take_client();
        }
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

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("active durability monitor state lock poisoned")
    }
}

fn chain_stats(topology: &Topology) -> Vec<ChainStats> {
    topology
        .chains()
        .map(|chain| ChainStats {
            name: chain.name(),
            size: chain.size(),
            majority: chain.majority(),
            nodes: chain
                .assigned()
                .map(|node| {
                    let position = chain.position(node).unwrap_or_default();
                    NodeStats {
                        node: node.clone(),
                        write_seqno: position.write_seqno,
                        ack_seqno: position.ack_seqno,
                    }
                })
                .collect(),
        })
        .collect()
}
