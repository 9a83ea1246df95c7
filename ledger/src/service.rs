//! LedgerService - the entry point for every inbound event.
//!
//! Wires the quota engine, referral ledger and payment applier around one
//! shared store and clock, and runs the answer flow: decide and pay inside
//! the store's unit, then call the agent with no lock held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use answer_agent::service::NOT_CONFIGURED_MESSAGE;
use answer_agent::{user_prompt, AnswerAgent, QualityTier};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::events::{AnswerRequested, InboundEvent, OutboundMessage, ReferralStartSeen};
use crate::notify::Notifier;
use crate::offers::{catalog, plans_summary, Offer, UpsellOffer};
use crate::payment::{PaymentApplier, PaymentConfirmed, PaymentReceipt};
use crate::policy::{Decision, DenyReason, QuotaEngine};
use crate::referral::{ReferralLedger, ReferralOutcome};
use crate::store::{LedgerStats, LedgerStore};
use crate::types::{LedgerError, Result, Tier, UserId};

/// Bot username used in referral links when none is configured.
pub const DEFAULT_BOT_USERNAME: &str = "AskCryptoAIBot";

/// Admission result for an answer request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerDecision {
    /// Paid for; `prompt` is what goes to the model
    Allowed {
        tier: Tier,
        quality: QualityTier,
        prompt: String,
    },
    Denied {
        reason: DenyReason,
        upsell: Option<UpsellOffer>,
    },
}

/// `/plan` view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStatus {
    pub day: String,
    pub daily_count: u32,
    pub free_daily_limit: u32,
    pub balance: u64,
    pub premium: bool,
    /// Set only while the subscription is active
    pub premium_until: Option<DateTime<Utc>>,
    pub message: String,
}

/// `/referral` view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralInfo {
    pub code: String,
    pub link: String,
    pub bonus_per_friend: u64,
    pub invited: u32,
    pub max_referrals: u32,
    pub remaining: u32,
    pub message: String,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    quota: QuotaEngine,
    referrals: ReferralLedger,
    payments: PaymentApplier,
    agent: Option<Arc<AnswerAgent>>,
    admin_id: Option<UserId>,
    bot_username: String,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            quota: QuotaEngine::new(store.clone(), clock.clone(), config.clone()),
            referrals: ReferralLedger::new(store.clone(), clock.clone(), config.clone(), notifier),
            payments: PaymentApplier::new(store.clone(), clock.clone(), config.clone()),
            store,
            clock,
            config,
            agent: None,
            admin_id: None,
            bot_username: DEFAULT_BOT_USERNAME.to_string(),
        }
    }

    /// Attach the answer agent.
    pub fn with_agent(mut self, agent: Arc<AnswerAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Only this user may read admin stats.
    pub fn with_admin(mut self, admin_id: UserId) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = username.into();
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Decide and pay for an answer request.
    pub async fn answer_requested(&self, event: &AnswerRequested) -> AnswerDecision {
        match self.quota.request_answer(event.user_id).await {
            Decision::Allow { tier } => AnswerDecision::Allowed {
                tier,
                quality: tier.quality(),
                prompt: user_prompt(&event.text),
            },
            Decision::Deny { reason } => AnswerDecision::Denied {
                reason,
                upsell: reason.wants_upsell().then(|| UpsellOffer::new(&self.config)),
            },
        }
    }

    /// Full answer flow. The debit is never refunded if the agent fails.
    pub async fn answer(&self, event: &AnswerRequested) -> OutboundMessage {
        let user_id = event.user_id;
        let (tier, quality, prompt) = match self.answer_requested(event).await {
            AnswerDecision::Allowed {
                tier,
                quality,
                prompt,
            } => (tier, quality, prompt),
            AnswerDecision::Denied { reason, upsell } => {
                return OutboundMessage::Denied {
                    user_id,
                    reason,
                    upsell,
                }
            }
        };

        let agent = match &self.agent {
            Some(agent) => agent,
            None => {
                warn!(user_id = %user_id, "No answer agent attached");
                return OutboundMessage::AnswerFailed {
                    user_id,
                    message: NOT_CONFIGURED_MESSAGE.to_string(),
                };
            }
        };

        match agent.answer(quality, &prompt).await {
            Ok(answer) => {
                debug!(user_id = %user_id, model = %answer.model, attempts = answer.attempts, "Answered");
                OutboundMessage::Answer {
                    user_id,
                    tier,
                    model: answer.model,
                    text: answer.text,
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Answer failed after admission");
                OutboundMessage::AnswerFailed {
                    user_id,
                    message: e.user_message().to_string(),
                }
            }
        }
    }

    /// Create the user's account and attribute a referral if the start
    /// parameter names an inviter.
    ///
    /// Referral rejections are logged and reported as `Ok(None)`; only store
    /// failures are errors.
    pub async fn referral_start_seen(&self, event: &ReferralStartSeen) -> Result<Option<ReferralOutcome>> {
        let today = self.clock.today();
        self.store.get(event.user_id, &today).await?;

        let inviter = match event.inviter() {
            Ok(Some(inviter)) => inviter,
            Ok(None) => return Ok(None),
            Err(invalid) => {
                info!(user_id = %event.user_id, reason = %invalid, "Referral ignored");
                return Ok(None);
            }
        };

        match self.referrals.record_referral(inviter, event.user_id).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(LedgerError::InvalidReferral(invalid)) => {
                info!(user_id = %event.user_id, inviter = %inviter, reason = %invalid, "Referral ignored");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn payment_confirmed(&self, event: PaymentConfirmed) -> Result<PaymentReceipt> {
        self.payments.apply_payment(event).await
    }

    pub async fn plan_status(&self, user_id: UserId) -> Result<PlanStatus> {
        let now = self.clock.now();
        let account = self.store.get(user_id, &self.clock.day_of(now)).await?;
        let premium = account.is_premium(now);
        let premium_until = if premium { account.premium_expiry() } else { None };

        let until = premium_until
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let message = format!(
            "Your status:\n\
             • Today: {}/{}\n\
             • Pro credits: {}\n\
             • Premium: {} (until: {})\n\n\
             Use /upgrade to add more.",
            account.daily_count,
            self.config.free_daily_limit,
            account.balance,
            if premium { "YES" } else { "NO" },
            until
        );

        Ok(PlanStatus {
            day: account.day,
            daily_count: account.daily_count,
            free_daily_limit: self.config.free_daily_limit,
            balance: account.balance,
            premium,
            premium_until,
            message,
        })
    }

    pub async fn referral_info(&self, user_id: UserId) -> Result<ReferralInfo> {
        let account = self.store.get(user_id, &self.clock.today()).await?;
        let link = format!("https://t.me/{}?start={}", self.bot_username, account.referral_code);
        let remaining = self.config.max_referrals.saturating_sub(account.referral_count);

        let message = format!(
            "Invite friends and earn extra answers!\n\
             • Your link: {}\n\
             • Reward: +{} answers per friend\n\
             • Invited so far: {} (max {})",
            link, self.config.referral_bonus, account.referral_count, self.config.max_referrals
        );

        Ok(ReferralInfo {
            code: account.referral_code,
            link,
            bonus_per_friend: self.config.referral_bonus,
            invited: account.referral_count,
            max_referrals: self.config.max_referrals,
            remaining,
            message,
        })
    }

    pub fn offers(&self) -> Vec<Offer> {
        catalog(&self.config)
    }

    /// Aggregate figures, served only to the admin.
    pub async fn admin_stats(&self, requester: UserId) -> Result<Option<LedgerStats>> {
        if self.admin_id != Some(requester) {
            debug!(user_id = %requester, "Stats request from non-admin ignored");
            return Ok(None);
        }
        self.store.stats().await.map(Some)
    }

    pub fn welcome_message(&self) -> String {
        format!(
            "Welcome to AskCryptoAI\n{}\n\n\
             Type your first question or use /upgrade /plan /referral /help",
            plans_summary(&self.config)
        )
    }

    pub fn help_message(&self) -> String {
        format!(
            "How it works:\n{}\n\n\
             Disclaimer: This is not financial advice. Always DYOR.",
            plans_summary(&self.config)
        )
    }

    /// Serve one inbound event.
    pub async fn handle(&self, event: InboundEvent) -> OutboundMessage {
        let user_id = event.user_id();
        let result = match event {
            InboundEvent::AnswerRequested(e) => return self.answer(&e).await,
            InboundEvent::ReferralStartSeen(e) => {
                self.referral_start_seen(&e)
                    .await
                    .map(|_| OutboundMessage::Welcome {
                        user_id,
                        message: self.welcome_message(),
                    })
            }
            InboundEvent::PaymentConfirmed(e) => self.payment_confirmed(e).await.map(|receipt| {
                let message = match &receipt {
                    PaymentReceipt::Applied { confirmation, .. } => Some(confirmation.message()),
                    PaymentReceipt::Duplicate { .. } => None,
                };
                OutboundMessage::Payment {
                    user_id,
                    receipt,
                    message,
                }
            }),
            InboundEvent::PlanRequested { .. } => self
                .plan_status(user_id)
                .await
                .map(|status| OutboundMessage::Plan { user_id, status }),
            InboundEvent::ReferralInfoRequested { .. } => self
                .referral_info(user_id)
                .await
                .map(|info| OutboundMessage::ReferralInfo { user_id, info }),
            InboundEvent::OffersRequested { .. } => Ok(OutboundMessage::Offers {
                user_id,
                offers: self.offers(),
            }),
            InboundEvent::HelpRequested { .. } => Ok(OutboundMessage::Help {
                user_id,
                message: self.help_message(),
            }),
            InboundEvent::StatsRequested { .. } => self.admin_stats(user_id).await.map(|stats| match stats {
                Some(stats) => OutboundMessage::Stats { user_id, stats },
                None => OutboundMessage::Ignored { user_id },
            }),
        };

        result.unwrap_or_else(|e| {
            error!(user_id = %user_id, store = self.store.name(), error = %e, "Event failed");
            OutboundMessage::Unavailable { user_id }
        })
    }
}
