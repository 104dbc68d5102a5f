//! Client notification seam.

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::core::ClientHandle;

use super::completed::{AbortReason, Resolution};

/// What the blocked client is told when its prepare resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncWriteResult {
    Success,
    Timedout,
    DurabilityImpossible,
    Aborted,
}

impl From<Resolution> for SyncWriteResult {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Commit => SyncWriteResult::Success,
            Resolution::Abort(AbortReason::Timeout) => SyncWriteResult::Timedout,
            Resolution::Abort(AbortReason::DurabilityImpossible) => {
                SyncWriteResult::DurabilityImpossible
            }
            Resolution::Abort(AbortReason::Instructed) => SyncWriteResult::Aborted,
        }
    }
}

/// Wakes the client blocked on a sync write.
///
/// Called once per handle, from the completed-queue drain, outside the
/// monitor's state lock. Implementations must tolerate being called from any
/// worker thread.
pub trait ClientNotifier: Send + Sync {
    fn notify(&self, client: ClientHandle, result: SyncWriteResult);
}

/// Discards notifications; for partitions with no attached sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl ClientNotifier for NullNotifier {
    fn notify(&self, _client: ClientHandle, _result: SyncWriteResult) {}
}

/// Forwards notifications over a channel to the session layer.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: Sender<(ClientHandle, SyncWriteResult)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<(ClientHandle, SyncWriteResult)>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl ClientNotifier for ChannelNotifier {
    fn notify(&self, client: ClientHandle, result: SyncWriteResult) {
        if self.tx.send((client, result)).is_err() {
            tracing::warn!(client = ?client, "sync write notification dropped: receiver gone");
        }
    }
}
