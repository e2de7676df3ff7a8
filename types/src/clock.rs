//! Source of "now" for every time-dependent derivation.

use crate::Timestamp;

/// Provides the current wall-clock instant.
///
/// Status resolution and pre-submission checks read the time through this
/// trait so tests can substitute a deterministic clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The operating system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}
