//! Per-partition durability monitors.
//!
//! Provides:
//! - tracked: the seqno-ordered container of in-flight sync writes
//! - chain: replication chains and topology validation
//! - active: the monitor driving commit/abort on the active node
//! - passive: the replica-side monitor and role conversion
//! - completed: the queue decoupling decisions from their side effects
//! - effects / notify / clock: the hash-table, client and time seams

pub mod active;
pub mod chain;
pub mod clock;
pub mod completed;
pub mod effects;
pub mod error;
pub mod notify;
pub mod passive;
pub mod persisted;
pub mod stats;
pub mod tracked;

use std::sync::Arc;

use crate::config::DurabilityConfig;
use crate::core::{PartitionId, Seqno};

pub use active::ActiveDurabilityMonitor;
pub use chain::{ChainName, NodePosition, ReplicationChain, Topology, TopologyError};
pub use clock::{SteadyClock, TimeSource};
pub use completed::{AbortReason, CompletedQueue, CompletedSyncWrite, Resolution};
pub use effects::{PartitionStore, StoreError};
pub use error::MonitorError;
pub use notify::{ChannelNotifier, ClientNotifier, NullNotifier, SyncWriteResult};
pub use passive::{PassiveDurabilityMonitor, PassiveResolution};
pub use persisted::PersistedPartitionState;
pub use stats::{ChainStats, MonitorRole, MonitorStats, NodeStats};
pub use tracked::{SyncWrite, TrackedError, TrackedWrites};

/// The role-neutral pieces that survive an active<->passive conversion.
pub(crate) struct MonitorCore {
    pub(crate) config: DurabilityConfig,
    pub(crate) partition: PartitionId,
    pub(crate) store: Arc<dyn PartitionStore>,
    pub(crate) clock: Arc<dyn TimeSource>,
    pub(crate) tracked: TrackedWrites,
    pub(crate) high_prepared_seqno: Seqno,
    pub(crate) high_completed_seqno: Seqno,
    pub(crate) persisted_seqno: Seqno,
}

/// A partition's durability monitor in either role.
///
/// Role changes are explicit value moves that transfer the in-flight
/// prepares; see [`ActiveDurabilityMonitor::from_passive`] and
/// [`PassiveDurabilityMonitor::from_active`].
pub enum DurabilityMonitor {
    Active(ActiveDurabilityMonitor),
    Passive(PassiveDurabilityMonitor),
}

impl DurabilityMonitor {
    pub fn role(&self) -> MonitorRole {
        match self {
            DurabilityMonitor::Active(_) => MonitorRole::Active,
            DurabilityMonitor::Passive(_) => MonitorRole::Passive,
        }
    }

    pub fn partition(&self) -> PartitionId {
        match self {
            DurabilityMonitor::Active(monitor) => monitor.partition(),
            DurabilityMonitor::Passive(monitor) => monitor.partition(),
        }
    }

    pub fn high_prepared_seqno(&self) -> Seqno {
        match self {
            DurabilityMonitor::Active(monitor) => monitor.high_prepared_seqno(),
            DurabilityMonitor::Passive(monitor) => monitor.high_prepared_seqno(),
        }
    }

    pub fn high_completed_seqno(&self) -> Seqno {
        match self {
            DurabilityMonitor::Active(monitor) => monitor.high_completed_seqno(),
            DurabilityMonitor::Passive(monitor) => monitor.high_completed_seqno(),
        }
    }

    pub fn num_tracked(&self) -> usize {
        match self {
            DurabilityMonitor::Active(monitor) => monitor.num_tracked(),
            DurabilityMonitor::Passive(monitor) => monitor.num_tracked(),
        }
    }

    pub fn stats(&self) -> MonitorStats {
        match self {
            DurabilityMonitor::Active(monitor) => monitor.stats(),
            DurabilityMonitor::Passive(monitor) => monitor.stats(),
        }
    }
}
