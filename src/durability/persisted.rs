//! Persisted partition state consumed at warmup.

use serde::{Deserialize, Serialize};

use crate::core::Seqno;

/// What the storage layer recovered for a partition.
///
/// The monitor never persists this itself; it only consumes it when the
/// partition is restored, together with the outstanding prepares in seqno
/// order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPartitionState {
    pub high_prepared_seqno: Seqno,
    pub high_completed_seqno: Seqno,
    pub persisted_seqno: Seqno,
}
