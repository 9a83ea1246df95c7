//! Time source shared by every ledger component.
//!
//! Calendar days are UTC days everywhere in the ledger.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// Supplies the current moment and the calendar day it falls on.
pub trait Clock: Send + Sync {
    /// Current moment.
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day of `at` as `%Y-%m-%d`.
    fn day_of(&self, at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%d").to_string()
    }

    /// Calendar day of `now()`.
    fn today(&self) -> String {
        self.day_of(self.now())
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at a unix timestamp (seconds). Out-of-range values start at the epoch.
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
