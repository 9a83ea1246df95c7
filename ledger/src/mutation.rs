//! Typed account mutations.
//!
//! Every change to a [`UserAccount`] goes through an [`AccountMutation`]:
//! a named set of field deltas that is validated against the current row
//! before any field is touched.

use serde::{Deserialize, Serialize};

use crate::types::{LedgerError, Result, UserAccount};

/// Subscription extension parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumExtension {
    /// Purchase moment (unix seconds)
    pub from: i64,
    /// Seconds to add
    pub duration_secs: i64,
}

/// Field deltas applied atomically to one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMutation {
    /// New `last_request_at` (unix ms)
    pub last_request_at: Option<i64>,
    /// Added to `daily_count`
    pub daily_count_increment: u32,
    /// Signed change to `balance`
    pub balance_delta: i64,
    /// Added to `referral_count`, clamped to `referral_cap`
    pub referral_increment: u32,
    /// Cap enforced when `referral_increment > 0`
    pub referral_cap: Option<u32>,
    /// Subscription extension
    pub premium_extension: Option<PremiumExtension>,
}

impl AccountMutation {
    /// A mutation that changes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Record an admitted request at `at_ms`.
    pub fn stamp_request(mut self, at_ms: i64) -> Self {
        self.last_request_at = Some(at_ms);
        self
    }

    /// Count one answer against today's counter.
    pub fn count_answer(mut self) -> Self {
        self.daily_count_increment += 1;
        self
    }

    /// Spend one credit.
    pub fn debit_credit(mut self) -> Self {
        self.balance_delta -= 1;
        self
    }

    /// Add `amount` credits.
    pub fn credit(mut self, amount: u64) -> Self {
        self.balance_delta = self
            .balance_delta
            .saturating_add(i64::try_from(amount).unwrap_or(i64::MAX));
        self
    }

    /// Count one referral, never exceeding `cap`.
    pub fn count_referral(mut self, cap: u32) -> Self {
        self.referral_increment += 1;
        self.referral_cap = Some(cap);
        self
    }

    /// Extend the subscription from the later of `from` and the current expiry.
    pub fn extend_premium(mut self, from: i64, duration_secs: i64) -> Self {
        self.premium_extension = Some(PremiumExtension {
            from,
            duration_secs,
        });
        self
    }

    /// Check the mutation can be applied to `account` without breaking an invariant.
    pub fn validate(&self, account: &UserAccount) -> Result<()> {
        if self.balance_delta < 0 && self.balance_delta.unsigned_abs() > account.balance {
            return Err(LedgerError::InvalidMutation(format!(
                "debit of {} exceeds balance {} for user {}",
                self.balance_delta.unsigned_abs(),
                account.balance,
                account.id
            )));
        }

        if self.referral_increment > 0 {
            let cap = self.referral_cap.ok_or_else(|| {
                LedgerError::InvalidMutation("referral increment without a cap".into())
            })?;
            if account.referral_count >= cap {
                return Err(LedgerError::InvalidMutation(format!(
                    "referral count {} already at cap {} for user {}",
                    account.referral_count, cap, account.id
                )));
            }
        }

        if let Some(ext) = self.premium_extension {
            if ext.duration_secs <= 0 {
                return Err(LedgerError::InvalidMutation(format!(
                    "non-positive subscription extension of {}s",
                    ext.duration_secs
                )));
            }
        }

        Ok(())
    }

    /// Validate, then apply every delta to `account`.
    pub fn apply(&self, account: &mut UserAccount) -> Result<()> {
        self.validate(account)?;

        if let Some(at) = self.last_request_at {
            account.last_request_at = at;
        }

        account.daily_count = account.daily_count.saturating_add(self.daily_count_increment);

        if self.balance_delta >= 0 {
            account.balance = account.balance.saturating_add(self.balance_delta as u64);
        } else {
            account.balance -= self.balance_delta.unsigned_abs();
        }

        if let Some(cap) = self.referral_cap {
            account.referral_count = account
                .referral_count
                .saturating_add(self.referral_increment)
                .min(cap);
        }

        if let Some(ext) = self.premium_extension {
            account.premium_until = account
                .premium_until
                .max(ext.from)
                .saturating_add(ext.duration_secs);
        }

        Ok(())
    }
}
