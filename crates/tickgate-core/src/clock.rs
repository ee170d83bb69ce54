use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;

use crate::sync::lock_or_recover;
use crate::UtcDateTime;

/// Source of wall-clock time for quota windows, disable windows and cache expiry.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> UtcDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock_or_recover(&self.now, "manual clock");
        *now = now.after(by);
    }

    pub fn set(&self, at: UtcDateTime) {
        *lock_or_recover(&self.now, "manual clock") = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(UtcDateTime::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *lock_or_recover(&self.now, "manual clock")
    }
}
