//! Opaque client handles.

use std::fmt;

/// Token identifying the client connection blocked on a sync write.
///
/// The durability monitor never interprets the value: it only stores it,
/// compares it for presence, and hands it back to the notifier when the
/// prepare resolves. Pointer-sized so the session layer can pack whatever
/// it needs into one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientHandle(u64);

impl ClientHandle {
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientHandle({:#x})", self.0)
    }
}
