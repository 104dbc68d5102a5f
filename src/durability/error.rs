//! Durability monitor errors.

use thiserror::Error;

use crate::core::{NodeId, PartitionId, Seqno};
use crate::error::{Effect, Transience};

use super::chain::TopologyError;
use super::tracked::TrackedError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("no replication topology set for partition {partition}")]
    TopologyNotSet { partition: PartitionId },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Tracked(#[from] TrackedError),

    /// The replica acked a seqno below one it already acked. The stream
    /// serving it is broken; the caller closes it.
    #[error("ack from {node} went backwards: got {got} after {current}")]
    AckNonMonotonic {
        node: NodeId,
        current: Seqno,
        got: Seqno,
    },

    /// The replica acked a seqno the log has never prepared.
    #[error("ack from {node} for seqno {got} is beyond the prepared log (high seqno {high_seqno})")]
    AckAheadOfLog {
        node: NodeId,
        got: Seqno,
        high_seqno: Seqno,
    },

    #[error("warmup prepares out of order: {got} after {prev}")]
    OutOfOrderWarmupPrepare { prev: Seqno, got: Seqno },

    /// The active resolved a prepare the passive is not tracking at its
    /// front. Completions arrive in decision order, so this is fatal for the
    /// stream.
    #[error("completion for seqno {got} does not match the oldest tracked prepare {expected}")]
    UnexpectedCompletion { got: Seqno, expected: Seqno },
}

impl MonitorError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    /// Every error path leaves the monitor's state untouched.
    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
