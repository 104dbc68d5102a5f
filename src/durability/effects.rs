//! Hash-table application seam.

use thiserror::Error;

use crate::core::{Key, Seqno};
use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no pending item for {key:?} at seqno {seqno}")]
    PendingMissing { key: Key, seqno: Seqno },

    #[error("storage backend failure: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::PendingMissing { .. } => Transience::Permanent,
            StoreError::Backend { .. } => Transience::Retryable,
        }
    }

    pub fn effect(&self) -> Effect {
        Effect::Unknown
    }
}

/// Applies resolved prepares to the partition's in-memory hash table.
///
/// Implementations do their own locking. The monitor only calls in from the
/// completed-queue drain, never while holding its state lock.
pub trait PartitionStore: Send + Sync {
    /// Make the prepare's value the current value of its key.
    fn commit(&self, key: &Key, prepare_seqno: Seqno) -> Result<(), StoreError>;

    /// Discard the prepare; the key reverts to its prior committed value.
    fn abort(&self, key: &Key, prepare_seqno: Seqno) -> Result<(), StoreError>;
}
