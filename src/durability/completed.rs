//! Queue of resolved sync writes awaiting application.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::{ClientHandle, Key, Seqno};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The deadline passed before the durability requirement was met.
    Timeout,
    /// The topology could not satisfy the requirement when the prepare
    /// arrived.
    DurabilityImpossible,
    /// The active instructed this (passive) partition to abort.
    Instructed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Commit,
    Abort(AbortReason),
}

/// A commit/abort decision, frozen at the moment it was made.
#[derive(Clone, Debug)]
pub struct CompletedSyncWrite {
    pub seqno: Seqno,
    pub key: Key,
    pub resolution: Resolution,
    pub client: Option<ClientHandle>,
}

/// FIFO of commit/abort decisions.
///
/// Lives outside the monitor's state lock: decisions are queued while the
/// state lock is held and applied to the hash table only after it is
/// released, which keeps the state-lock -> hash-table-lock order
/// one-directional. The drainer mutex serializes consumers so the hash table
/// observes decisions in the order they were made, while the inner mutex is
/// never held across an application.
#[derive(Debug, Default)]
pub struct CompletedQueue {
    items: Mutex<VecDeque<CompletedSyncWrite>>,
    drainer: Mutex<()>,
}

impl CompletedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, completed: CompletedSyncWrite) {
        self.items
            .lock()
            .expect("completed queue lock poisoned")
            .push_back(completed);
    }

    /// Apply every queued decision in insertion order.
    pub(crate) fn drain(&self, mut apply: impl FnMut(CompletedSyncWrite)) {
        let _exclusive = self.drainer.lock().expect("completed queue drainer poisoned");
        loop {
            let next = self
                .items
                .lock()
                .expect("completed queue lock poisoned")
                .pop_front();
            let Some(completed) = next else {
                return;
            };
            apply(completed);
        }
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .expect("completed queue lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
