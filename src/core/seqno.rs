//! Sequence numbers assigned by the ordered log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in the partition's ordered log.
///
/// Prepares always carry a strictly positive seqno; `ZERO` is the "nothing
/// yet" sentinel used by cursors, watermarks and acks before any progress.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seqno(i64);

impl Seqno {
    pub const ZERO: Seqno = Seqno(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for Seqno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seqno({})", self.0)
    }
}

impl fmt::Display for Seqno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Seqno> for i64 {
    fn from(value: Seqno) -> i64 {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_sentinel() {
        assert!(Seqno::new(1) > Seqno::ZERO);
        assert!(Seqno::new(2) > Seqno::new(1));
        assert!(!Seqno::ZERO.is_positive());
        assert!(Seqno::new(1).is_positive());
    }

    #[test]
    fn display_is_bare_number() {
        assert_eq!(Seqno::new(42).to_string(), "42");
    }
}
