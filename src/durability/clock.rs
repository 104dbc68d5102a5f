//! Monotonic time source for deadline evaluation.

use std::time::Instant;

/// Supplies `now` for computing and evaluating sync-write deadlines.
///
/// Deadlines fire lazily when the owner calls `process_timeout`, so their
/// resolution is the caller's tick interval, not the deadline itself.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SteadyClock;

impl TimeSource for SteadyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
