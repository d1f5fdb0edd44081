//! Wall-clock source for timestamps on synthesized data.

use std::sync::Arc;

/// Supplies the current Unix time in seconds.
pub trait Clock: Send + Sync {
    /// Current Unix time, seconds.
    fn now_unix(&self) -> i64;
}

/// The real clock, backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_unix(&self) -> i64 {
        (**self).now_unix()
    }
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// The default shared clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
