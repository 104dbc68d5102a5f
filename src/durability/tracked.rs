//! Seqno-ordered container of in-flight sync writes.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::time::Instant;

use thiserror::Error;

use crate::core::{ClientHandle, Key, Level, NodeId, PreparedWrite, Seqno};

/// One tracked prepare.
#[derive(Clone, Debug)]
pub struct SyncWrite {
    key: Key,
    seqno: Seqno,
    level: Level,
    deadline: Option<Instant>,
    client: Option<ClientHandle>,
    acked_by: BTreeSet<NodeId>,
    persisted_on_master: bool,
}

impl SyncWrite {
    pub(crate) fn tracked(
        prepare: PreparedWrite,
        client: Option<ClientHandle>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            key: prepare.key,
            seqno: prepare.seqno,
            level: prepare.level,
            deadline,
            client,
            acked_by: BTreeSet::new(),
            persisted_on_master: false,
        }
    }

    /// A prepare recovered at warmup: no client to notify, no deadline.
    pub(crate) fn restored(prepare: PreparedWrite) -> Self {
        Self::tracked(prepare, None, None)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn seqno(&self) -> Seqno {
        self.seqno
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn client(&self) -> Option<ClientHandle> {
        self.client
    }

    pub fn acked_by(&self) -> &BTreeSet<NodeId> {
        &self.acked_by
    }

    pub fn is_persisted_on_master(&self) -> bool {
        self.persisted_on_master
    }

    pub(crate) fn add_ack(&mut self, node: NodeId) {
        self.acked_by.insert(node);
    }

    pub(crate) fn mark_persisted_on_master(&mut self) {
        self.persisted_on_master = true;
    }

    pub(crate) fn take_client(&mut self) -> Option<ClientHandle> {
        self.client.take()
    }

    pub(crate) fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    pub(crate) fn expired_by(&self, as_of: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline < as_of)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackedError {
    #[error("prepare seqno must be positive, got {seqno}")]
    NonPositiveSeqno { seqno: Seqno },

    #[error("prepare seqno {seqno} does not advance the tracked high seqno {high_seqno}")]
    NonMonotonicSeqno { seqno: Seqno, high_seqno: Seqno },
}

/// Ordered map seqno -> [`SyncWrite`].
///
/// Keyed by seqno so per-node cursors survive front erasure: a cursor is the
/// seqno of the last write the node crossed, and iteration resumes strictly
/// after it whether or not that write is still tracked.
#[derive(Debug, Default)]
pub struct TrackedWrites {
    writes: BTreeMap<Seqno, SyncWrite>,
    /// Highest seqno ever appended; survives front erasure.
    high_seqno: Seqno,
}

impl TrackedWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the back. Seqnos must be strictly increasing and positive.
    pub fn append(&mut self, write: SyncWrite) -> Result<(), TrackedError> {
        let seqno = write.seqno();
        if !seqno.is_positive() {
            return Err(TrackedError::NonPositiveSeqno { seqno });
        }
        if seqno <= self.high_seqno {
            return Err(TrackedError::NonMonotonicSeqno {
                seqno,
                high_seqno: self.high_seqno,
            });
        }
        self.writes.insert(seqno, write);
        self.high_seqno = seqno;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn high_seqno(&self) -> Seqno {
        self.high_seqno
    }

    pub fn front(&self) -> Option<&SyncWrite> {
        self.writes.values().next()
    }

    pub fn pop_front(&mut self) -> Option<SyncWrite> {
        self.writes.pop_first().map(|(_, write)| write)
    }

    pub fn get(&self, seqno: Seqno) -> Option<&SyncWrite> {
        self.writes.get(&seqno)
    }

    pub fn get_mut(&mut self, seqno: Seqno) -> Option<&mut SyncWrite> {
        self.writes.get_mut(&seqno)
    }

    pub fn remove(&mut self, seqno: Seqno) -> Option<SyncWrite> {
        self.writes.remove(&seqno)
    }

    /// The next tracked seqno strictly after `cursor`.
    pub fn first_seqno_after(&self, cursor: Seqno) -> Option<Seqno> {
        self.writes
            .range((Excluded(cursor), Unbounded))
            .next()
            .map(|(&seqno, _)| seqno)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncWrite> {
        self.writes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SyncWrite> {
        self.writes.values_mut()
    }

    pub fn seqnos(&self) -> Vec<Seqno> {
        self.writes.keys().copied().collect()
    }
}
