//! Referral ledger.
//!
//! Records inviter → invitee edges and pays the inviter's bonus in the same
//! unit. Validation order: self-referral, unknown inviter, existing edge
//! (an idempotent no-op for the same pair), then the inviter's cap.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::mutation::AccountMutation;
use crate::notify::{Notification, Notifier};
use crate::store::{LedgerStore, ReferralAppend};
use crate::types::{InvalidReferral, ReferralEdge, Result, UserAccount, UserId};

/// Result of a referral attempt that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// Edge recorded and bonus credited
    Recorded {
        inviter: UserAccount,
        /// Whether the inviter was told about it
        notified: bool,
    },
    /// This exact edge was recorded before
    AlreadyRecorded,
}

pub struct ReferralLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    notifier: Arc<dyn Notifier>,
}

impl ReferralLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            notifier,
        }
    }

    /// Record that `invitee` joined through `inviter`'s link.
    pub async fn record_referral(&self, inviter: UserId, invitee: UserId) -> Result<ReferralOutcome> {
        if inviter == invitee {
            return Err(InvalidReferral::SelfReferral(inviter).into());
        }

        let now = self.clock.now();
        let today = self.clock.day_of(now);
        let cap = self.config.max_referrals;
        let bonus = self.config.referral_bonus;

        let edge = ReferralEdge {
            inviter_id: inviter,
            invitee_id: invitee,
            created_at: now.timestamp(),
        };

        let appended = self
            .store
            .append_referral(edge, &today, &mut |account: &UserAccount| {
                if account.referral_count >= cap {
                    return Err(InvalidReferral::CapReached { inviter, cap }.into());
                }
                Ok(AccountMutation::none().count_referral(cap).credit(bonus))
            })
            .await?;

        let account = match appended {
            ReferralAppend::Recorded(account) => account,
            ReferralAppend::AlreadyRecorded => {
                info!(inviter = %inviter, invitee = %invitee, "Referral already recorded");
                return Ok(ReferralOutcome::AlreadyRecorded);
            }
        };

        info!(
            inviter = %inviter,
            invitee = %invitee,
            referral_count = account.referral_count,
            balance = account.balance,
            "Referral recorded"
        );

        let notification = Notification::ReferralBonus {
            bonus,
            referral_count: account.referral_count,
        };
        let notified = match self.notifier.notify(inviter, notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(inviter = %inviter, error = %e, "Referral notification failed");
                false
            }
        };

        Ok(ReferralOutcome::Recorded {
            inviter: account,
            notified,
        })
    }
}
