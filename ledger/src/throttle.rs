//! Per-user minimum interval between answer requests.

use chrono::{DateTime, Utc};

use crate::config::LedgerConfig;
use crate::types::{millis, UserAccount};

/// Enforces the per-tier minimum interval.
///
/// The guard only decides. Recording `last_request_at` happens in the same
/// atomic unit as the quota decision (see [`crate::policy`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleGuard {
    free_interval_ms: u64,
    premium_interval_ms: u64,
}

impl ThrottleGuard {
    pub fn new(free_interval_ms: u64, premium_interval_ms: u64) -> Self {
        Self {
            free_interval_ms,
            premium_interval_ms,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.free_interval_ms, config.premium_interval_ms)
    }

    /// Interval that applies to `account` at `now`.
    pub fn min_interval_ms(&self, account: &UserAccount, now: DateTime<Utc>) -> u64 {
        if account.is_premium(now) {
            self.premium_interval_ms
        } else {
            self.free_interval_ms
        }
    }

    /// Milliseconds left before `account` may ask again; 0 when admitted.
    ///
    /// If the clock has stepped back behind `last_request_at` the request is
    /// admitted. Its stamp then moves back to `now`, so the interval applies
    /// again from there.
    pub fn retry_in_ms(&self, account: &UserAccount, now: DateTime<Utc>) -> u64 {
        let elapsed = millis(now).saturating_sub(account.last_request_at);
        match u64::try_from(elapsed) {
            Ok(elapsed) => self.min_interval_ms(account, now).saturating_sub(elapsed),
            Err(_) => 0,
        }
    }

    /// Admit iff `now - last_request_at >= min interval`.
    pub fn admit(&self, account: &UserAccount, now: DateTime<Utc>) -> bool {
        self.retry_in_ms(account, now) == 0
    }
}
