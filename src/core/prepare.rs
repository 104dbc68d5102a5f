//! Prepared writes handed over by the ordered log.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use super::level::Level;
use super::seqno::Seqno;

/// Document key of a tracked prepare.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Bytes);

impl Key {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// A prepare already accepted and sequenced by the log.
///
/// The monitor never assigns seqnos; it is handed prepares in log order.
#[derive(Clone, Debug)]
pub struct PreparedWrite {
    pub key: Key,
    pub seqno: Seqno,
    pub level: Level,
    /// `None` keeps the prepare tracked until resolved (subject to the
    /// configured default).
    pub timeout: Option<Duration>,
}

impl PreparedWrite {
    pub fn new(key: Key, seqno: Seqno, level: Level, timeout: Option<Duration>) -> Self {
        Self {
            key,
            seqno,
            level,
            timeout,
        }
    }
}
