//! Inbound events and outbound messages.
//!
//! Both are JSON objects tagged by `type`. Every event is stamped with the
//! ledger's clock on arrival.

use serde::{Deserialize, Serialize};

use crate::notify::Notification;
use crate::offers::{Offer, UpsellOffer};
use crate::payment::{PaymentConfirmed, PaymentReceipt};
use crate::policy::DenyReason;
use crate::service::{PlanStatus, ReferralInfo};
use crate::store::LedgerStats;
use crate::types::{InvalidReferral, Tier, UserId, REFERRAL_PREFIX};

/// A user asked a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequested {
    pub user_id: UserId,
    pub text: String,
}

/// A user opened the bot, possibly through someone's referral link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStartSeen {
    /// The user who opened the bot
    pub user_id: UserId,
    /// Raw start parameter, e.g. `ref42`
    #[serde(default)]
    pub start_param: Option<String>,
}

impl ReferralStartSeen {
    pub fn new(user_id: UserId, start_param: Option<&str>) -> Self {
        Self {
            user_id,
            start_param: start_param.map(str::to_string),
        }
    }

    /// The inviter named by the start parameter.
    ///
    /// `Ok(None)` when there is no referral parameter at all.
    pub fn inviter(&self) -> Result<Option<UserId>, InvalidReferral> {
        let param = match self.start_param.as_deref().map(str::trim) {
            Some(p) if p.starts_with(REFERRAL_PREFIX) => p,
            _ => return Ok(None),
        };

        UserId::from_referral_code(param)
            .map(Some)
            .ok_or_else(|| InvalidReferral::MalformedStartParam(param.to_string()))
    }
}

/// One line of input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    AnswerRequested(AnswerRequested),
    ReferralStartSeen(ReferralStartSeen),
    PaymentConfirmed(PaymentConfirmed),
    PlanRequested { user_id: UserId },
    ReferralInfoRequested { user_id: UserId },
    OffersRequested { user_id: UserId },
    HelpRequested { user_id: UserId },
    StatsRequested { user_id: UserId },
}

impl InboundEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            InboundEvent::AnswerRequested(e) => e.user_id,
            InboundEvent::ReferralStartSeen(e) => e.user_id,
            InboundEvent::PaymentConfirmed(e) => e.user_id,
            InboundEvent::PlanRequested { user_id }
            | InboundEvent::ReferralInfoRequested { user_id }
            | InboundEvent::OffersRequested { user_id }
            | InboundEvent::HelpRequested { user_id }
            | InboundEvent::StatsRequested { user_id } => *user_id,
        }
    }
}

/// One line of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Answer produced for an allowed request
    Answer {
        user_id: UserId,
        tier: Tier,
        model: String,
        text: String,
    },
    /// Allowed and paid for, but the collaborator failed
    AnswerFailed { user_id: UserId, message: String },
    /// Request refused
    Denied {
        user_id: UserId,
        reason: DenyReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        upsell: Option<UpsellOffer>,
    },
    Welcome { user_id: UserId, message: String },
    Payment {
        user_id: UserId,
        receipt: PaymentReceipt,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Plan { user_id: UserId, status: PlanStatus },
    ReferralInfo { user_id: UserId, info: ReferralInfo },
    Offers { user_id: UserId, offers: Vec<Offer> },
    Help { user_id: UserId, message: String },
    Stats { user_id: UserId, stats: LedgerStats },
    /// Pushed to a user outside the request flow
    Notification {
        user_id: UserId,
        notification: Notification,
        message: String,
    },
    /// Store failure while serving a read
    Unavailable { user_id: UserId },
    /// Event produced no reply
    Ignored { user_id: UserId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"answer_requested","user_id":5,"text":"what is BTC?"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::AnswerRequested(AnswerRequested {
                user_id: UserId(5),
                text: "what is BTC?".into()
            })
        );

        let event: InboundEvent = serde_json::from_str(
            r#"{"type":"payment_confirmed","user_id":5,"product_code":"premium-30d","amount":700}"#,
        )
        .unwrap();
        assert_eq!(event.user_id(), UserId(5));

        let event: InboundEvent = serde_json::from_str(r#"{"type":"stats_requested","user_id":1}"#).unwrap();
        assert_eq!(event, InboundEvent::StatsRequested { user_id: UserId(1) });

        let event: InboundEvent = serde_json::from_str(r#"{"type":"help_requested","user_id":4}"#).unwrap();
        assert_eq!(event.user_id(), UserId(4));
    }

    #[test]
    fn test_start_param() {
        assert_eq!(ReferralStartSeen::new(UserId(2), Some("ref42")).inviter(), Ok(Some(UserId(42))));
        assert_eq!(ReferralStartSeen::new(UserId(2), None).inviter(), Ok(None));
        assert_eq!(ReferralStartSeen::new(UserId(2), Some("promo")).inviter(), Ok(None));
        assert!(matches!(
            ReferralStartSeen::new(UserId(2), Some("refxyz")).inviter(),
            Err(InvalidReferral::MalformedStartParam(_))
        ));
    }

    #[test]
    fn test_denied_serialization() {
        let msg = OutboundMessage::Denied {
            user_id: UserId(3),
            reason: DenyReason::FairUseExceeded,
            upsell: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "denied");
        assert_eq!(json["reason"]["kind"], "fair_use_exceeded");
        assert!(json.get("upsell").is_none());
    }
}
