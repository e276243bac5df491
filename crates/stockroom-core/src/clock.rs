//! Wall-clock source shared by the breaker windows and audit stamps.

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current time. Injected so breaker cool-downs and audit
/// timestamps can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since `earlier`, clamped at zero if the clock went back.
    fn since(&self, earlier: DateTime<Utc>) -> TimeDelta {
        (self.now() - earlier).max(TimeDelta::zero())
    }
}

/// Clock backed by `Utc::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
