//! Payment credit applier.
//!
//! Turns a confirmed purchase into exactly one ledger change paired with
//! exactly one payment record. The payment id is the idempotency key:
//! re-delivery of the same id changes nothing.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::mutation::AccountMutation;
use crate::offers::Product;
use crate::store::{LedgerStore, PaymentAppend};
use crate::types::{PaymentRecord, Result, UserAccount, UserId};

/// A purchase confirmed by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmed {
    pub user_id: UserId,
    /// Invoice payload naming the product
    pub product_code: String,
    /// Amount in minor units
    pub amount: u64,
    /// Provider charge id; a fresh id is generated when absent
    #[serde(default)]
    pub provider_charge_id: Option<String>,
}

/// What the buyer is told after a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Confirmation {
    CreditsAdded { added: u64, balance: u64 },
    PremiumExtended { until: DateTime<Utc> },
    /// Unrecognized product; recorded without a ledger change
    Received,
}

impl Confirmation {
    pub fn message(&self) -> String {
        match self {
            Confirmation::CreditsAdded { added, .. } => {
                format!("Thanks! Added +{} answers. Use /plan to check.", added)
            }
            Confirmation::PremiumExtended { until } => {
                format!("Premium active until {}.", until.format("%Y-%m-%d"))
            }
            Confirmation::Received => "Payment received.".to_string(),
        }
    }
}

/// Outcome of applying one payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentReceipt {
    Applied {
        payment_id: String,
        confirmation: Confirmation,
    },
    /// Already applied under this payment id
    Duplicate { payment_id: String },
}

pub struct PaymentApplier {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl PaymentApplier {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Record `payment` and apply what it buys in one unit.
    pub async fn apply_payment(&self, payment: PaymentConfirmed) -> Result<PaymentReceipt> {
        let now = self.clock.now();
        let today = self.clock.day_of(now);
        let product = Product::from_code(&payment.product_code);

        let payment_id = payment
            .provider_charge_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if product.is_none() {
            warn!(
                user_id = %payment.user_id,
                product_code = %payment.product_code,
                "Unrecognized product, recording payment without ledger change"
            );
        }

        let record = PaymentRecord {
            payment_id: payment_id.clone(),
            user_id: payment.user_id,
            product_code: payment.product_code.clone(),
            amount: payment.amount,
            timestamp: now.timestamp(),
        };

        let pack_size = self.config.credit_pack_size;
        let duration = self.config.subscription_secs();

        let appended = self
            .store
            .append_payment(record, &today, &mut |_: &UserAccount| {
                Ok(match product {
                    Some(Product::CreditPack) => AccountMutation::none().credit(pack_size),
                    Some(Product::Subscription) => {
                        AccountMutation::none().extend_premium(now.timestamp(), duration)
                    }
                    None => AccountMutation::none(),
                })
            })
            .await?;

        let account = match appended {
            PaymentAppend::Applied(account) => account,
            PaymentAppend::Duplicate(_) => {
                info!(user_id = %payment.user_id, payment_id = %payment_id, "Duplicate payment ignored");
                return Ok(PaymentReceipt::Duplicate { payment_id });
            }
        };

        let confirmation = match product {
            Some(Product::CreditPack) => Confirmation::CreditsAdded {
                added: pack_size,
                balance: account.balance,
            },
            Some(Product::Subscription) => Confirmation::PremiumExtended {
                until: Utc
                    .timestamp_opt(account.premium_until, 0)
                    .single()
                    .unwrap_or(now),
            },
            None => Confirmation::Received,
        };

        info!(
            user_id = %payment.user_id,
            payment_id = %payment_id,
            product_code = %payment.product_code,
            amount = payment.amount,
            balance = account.balance,
            premium_until = account.premium_until,
            "Payment applied"
        );

        Ok(PaymentReceipt::Applied {
            payment_id,
            confirmation,
        })
    }
}
