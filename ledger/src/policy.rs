//! Quota policy engine.
//!
//! Decides whether an answer request is served and what it costs. The
//! decision is evaluated inside the store's atomic unit for the user, after
//! the daily reset, so throttle admission, the decision and its debit commit
//! together.
//!
//! Evaluation order:
//!
//! ```text
//! throttled?            -> Deny(Throttled)
//! premium active?       -> daily_count < fair-use cap ? Allow(Premium) : Deny(FairUseExceeded)
//! daily_count < free?   -> Allow(Free)        (daily_count += 1)
//! balance > 0?          -> Allow(Credits)     (balance -= 1)
//! otherwise             -> Deny(QuotaExhausted)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::mutation::AccountMutation;
use crate::store::LedgerStore;
use crate::throttle::ThrottleGuard;
use crate::types::{millis, Tier, UserAccount, UserId};

/// Why an answer request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// Asked again before the minimum interval elapsed
    Throttled { retry_in_ms: u64 },
    /// Subscriber reached the fair-use cap for today
    FairUseExceeded,
    /// Free allotment used and no credits left
    QuotaExhausted,
    /// Ledger could not be read or written
    StoreUnavailable,
}

impl DenyReason {
    /// Whether the refusal should come with purchase options.
    pub fn wants_upsell(&self) -> bool {
        matches!(self, DenyReason::QuotaExhausted)
    }
}

/// Outcome of one answer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow { tier: Tier },
    Deny { reason: DenyReason },
}

impl Decision {
    /// Ledger change that pays for this decision. Denials change nothing.
    pub fn mutation(&self, now_ms: i64) -> AccountMutation {
        match self {
            Decision::Allow { tier: Tier::Premium | Tier::Free } => {
                AccountMutation::none().stamp_request(now_ms).count_answer()
            }
            Decision::Allow { tier: Tier::Credits } => {
                AccountMutation::none().stamp_request(now_ms).debit_credit()
            }
            Decision::Deny { .. } => AccountMutation::none(),
        }
    }
}

/// Pure decision for a day-rolled account snapshot.
pub fn evaluate(
    config: &LedgerConfig,
    throttle: &ThrottleGuard,
    account: &UserAccount,
    now: DateTime<Utc>,
) -> Decision {
    if !throttle.admit(account, now) {
        return Decision::Deny {
            reason: DenyReason::Throttled {
                retry_in_ms: throttle.retry_in_ms(account, now),
            },
        };
    }

    if account.is_premium(now) {
        if account.daily_count < config.fair_use_daily_cap {
            return Decision::Allow { tier: Tier::Premium };
        }
        return Decision::Deny {
            reason: DenyReason::FairUseExceeded,
        };
    }

    if account.daily_count < config.free_daily_limit {
        return Decision::Allow { tier: Tier::Free };
    }

    if account.balance > 0 {
        return Decision::Allow { tier: Tier::Credits };
    }

    Decision::Deny {
        reason: DenyReason::QuotaExhausted,
    }
}

/// Applies [`evaluate`] atomically against the ledger.
pub struct QuotaEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    throttle: ThrottleGuard,
}

impl QuotaEngine {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        let throttle = ThrottleGuard::from_config(&config);
        Self {
            store,
            clock,
            config,
            throttle,
        }
    }

    /// Decide and pay for one answer request in a single unit.
    ///
    /// Store failures deny with [`DenyReason::StoreUnavailable`].
    pub async fn request_answer(&self, user_id: UserId) -> Decision {
        let now = self.clock.now();
        let today = self.clock.day_of(now);
        let mut decision = None;

        let result = self
            .store
            .update(user_id, &today, &mut |account: &UserAccount| {
                let d = evaluate(&self.config, &self.throttle, account, now);
                let mutation = d.mutation(millis(now));
                decision = Some(d);
                Ok(mutation)
            })
            .await;

        match (result, decision) {
            (Ok(account), Some(decision)) => {
                match decision {
                    Decision::Allow { tier } => debug!(
                        user_id = %user_id,
                        tier = ?tier,
                        daily_count = account.daily_count,
                        balance = account.balance,
                        "Answer allowed"
                    ),
                    Decision::Deny { reason } => {
                        info!(user_id = %user_id, reason = ?reason, "Answer denied")
                    }
                }
                decision
            }
            (Ok(_), None) => {
                error!(user_id = %user_id, "Store committed without consulting the policy");
                Decision::Deny {
                    reason: DenyReason::StoreUnavailable,
                }
            }
            (Err(e), _) => {
                error!(user_id = %user_id, store = self.store.name(), error = %e, "Quota decision failed");
                Decision::Deny {
                    reason: DenyReason::StoreUnavailable,
                }
            }
        }
    }
}
