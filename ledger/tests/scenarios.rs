//! End-to-end ledger behaviour over both store implementations.

mod common;

use chrono::Duration;

use answer_ledger::config::SECONDS_PER_DAY;
use answer_ledger::{
    AnswerDecision, Confirmation, DenyReason, InboundEvent, LedgerConfig, OutboundMessage,
    PaymentReceipt, ReferralOutcome, Tier, UserId,
};
use common::{unthrottled, Harness, T0};

fn denied_reason(decision: &AnswerDecision) -> Option<DenyReason> {
    match decision {
        AnswerDecision::Denied { reason, .. } => Some(*reason),
        AnswerDecision::Allowed { .. } => None,
    }
}

fn allowed_tier(decision: &AnswerDecision) -> Option<Tier> {
    match decision {
        AnswerDecision::Allowed { tier, .. } => Some(*tier),
        AnswerDecision::Denied { .. } => None,
    }
}

#[tokio::test]
async fn free_limit_then_exhausted() {
    for h in Harness::all(unthrottled()) {
        for _ in 0..10 {
            assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Free), "{}", h.name);
        }
        assert_eq!(h.account(1).await.daily_count, 10);

        match h.ask(1).await {
            AnswerDecision::Denied { reason, upsell } => {
                assert_eq!(reason, DenyReason::QuotaExhausted, "{}", h.name);
                let upsell = upsell.expect("exhausted quota comes with offers");
                assert_eq!(upsell.offers[0].code, "pro-pack-credits");
                assert_eq!(upsell.offers[1].code, "premium-30d");
            }
            other => panic!("{}: expected denial, got {:?}", h.name, other),
        }
        assert_eq!(h.account(1).await.daily_count, 10);
    }
}

#[tokio::test]
async fn new_day_resets_counter() {
    for h in Harness::all(unthrottled()) {
        for _ in 0..10 {
            h.ask(1).await;
        }
        assert_eq!(denied_reason(&h.ask(1).await), Some(DenyReason::QuotaExhausted));

        h.clock.advance(Duration::days(1));
        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Free), "{}", h.name);

        let account = h.account(1).await;
        assert_eq!(account.daily_count, 1);
        assert_eq!(account.day, "2026-10-19");
    }
}

#[tokio::test]
async fn credits_used_after_free_limit() {
    let config = LedgerConfig {
        free_daily_limit: 1,
        ..unthrottled()
    };
    for h in Harness::all(config) {
        h.pay(1, "pro-pack-credits", "c1").await;

        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Free));
        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Credits));
        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Credits));

        let account = h.account(1).await;
        assert_eq!(account.daily_count, 1, "{}", h.name);
        assert_eq!(account.balance, 98, "{}", h.name);
    }
}

#[tokio::test]
async fn balance_never_negative() {
    let config = LedgerConfig {
        free_daily_limit: 0,
        ..unthrottled()
    };
    for h in Harness::all(config) {
        h.store
            .apply_mutation(
                UserId(1),
                "2026-10-18",
                answer_ledger::AccountMutation::none().credit(2),
            )
            .await
            .unwrap();

        let decisions = [h.ask(1).await, h.ask(1).await, h.ask(1).await];
        assert!(decisions[0..2].iter().all(|d| allowed_tier(d) == Some(Tier::Credits)));
        assert_eq!(denied_reason(&decisions[2]), Some(DenyReason::QuotaExhausted));
        assert_eq!(h.account(1).await.balance, 0, "{}", h.name);
    }
}

#[tokio::test]
async fn subscription_from_zero() {
    for h in Harness::all(unthrottled()) {
        let receipt = h.pay(1, "premium-30d", "s1").await;
        assert!(matches!(
            receipt,
            PaymentReceipt::Applied {
                confirmation: Confirmation::PremiumExtended { .. },
                ..
            }
        ));
        assert_eq!(h.account(1).await.premium_until, T0 + 30 * SECONDS_PER_DAY, "{}", h.name);

        // Subscribers are served past the free limit without spending credits
        for _ in 0..12 {
            assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Premium));
        }
    }
}

#[tokio::test]
async fn premium_fair_use_cap_ignores_balance() {
    let config = LedgerConfig {
        fair_use_daily_cap: 3,
        ..unthrottled()
    };
    for h in Harness::all(config) {
        h.pay(1, "premium-30d", "s1").await;
        h.pay(1, "pro-pack-credits", "c1").await;

        for _ in 0..3 {
            assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Premium));
        }
        match h.ask(1).await {
            AnswerDecision::Denied { reason, upsell } => {
                assert_eq!(reason, DenyReason::FairUseExceeded, "{}", h.name);
                assert!(upsell.is_none());
            }
            other => panic!("{}: expected denial, got {:?}", h.name, other),
        }
        assert_eq!(h.account(1).await.balance, 100, "{}", h.name);
    }
}

#[tokio::test]
async fn subscription_expiry_falls_back_to_free() {
    for h in Harness::all(unthrottled()) {
        h.pay(1, "premium-30d", "s1").await;
        h.clock.advance(Duration::days(30));

        // premium_until == now is no longer active
        let status = h.service.plan_status(UserId(1)).await.unwrap();
        assert!(!status.premium, "{}", h.name);
        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Free));
    }
}

#[tokio::test]
async fn throttle_interval_per_tier() {
    for h in Harness::all(LedgerConfig::default()) {
        assert!(allowed_tier(&h.ask(1).await).is_some());
        assert_eq!(
            denied_reason(&h.ask(1).await),
            Some(DenyReason::Throttled { retry_in_ms: 2000 }),
            "{}",
            h.name
        );

        h.clock.advance(Duration::milliseconds(1999));
        assert!(matches!(
            denied_reason(&h.ask(1).await),
            Some(DenyReason::Throttled { retry_in_ms: 1 })
        ));

        h.clock.advance(Duration::milliseconds(1));
        assert!(allowed_tier(&h.ask(1).await).is_some());

        // Subscribers wait the shorter interval
        h.pay(2, "premium-30d", "s2").await;
        assert!(allowed_tier(&h.ask(2).await).is_some());
        h.clock.advance(Duration::milliseconds(500));
        assert_eq!(allowed_tier(&h.ask(2).await), Some(Tier::Premium), "{}", h.name);
    }
}

#[tokio::test]
async fn clock_stepping_back_does_not_lock_out() {
    for h in Harness::all(LedgerConfig::default()) {
        assert!(allowed_tier(&h.ask(1).await).is_some());

        h.clock.advance(Duration::hours(-1));
        assert_eq!(allowed_tier(&h.ask(1).await), Some(Tier::Free), "{}", h.name);
        assert_eq!(
            denied_reason(&h.ask(1).await),
            Some(DenyReason::Throttled { retry_in_ms: 2000 }),
            "{}",
            h.name
        );
        assert_eq!(h.account(1).await.daily_count, 2, "{}", h.name);
    }
}

#[tokio::test]
async fn referral_recorded_once() {
    for h in Harness::all(unthrottled()) {
        h.start(1, None).await;

        let first = h.start(2, Some("ref1")).await;
        assert!(matches!(first, Some(ReferralOutcome::Recorded { .. })), "{}", h.name);
        let again = h.start(2, Some("ref1")).await;
        assert_eq!(again, Some(ReferralOutcome::AlreadyRecorded));

        let inviter = h.account(1).await;
        assert_eq!(inviter.balance, 2, "{}", h.name);
        assert_eq!(inviter.referral_count, 1);
        assert_eq!(h.service.admin_stats(UserId(1)).await.unwrap(), None);
        assert_eq!(h.store.stats().await.unwrap().referrals, 1);
    }
}

#[tokio::test]
async fn referral_rejections_are_silent() {
    for h in Harness::all(unthrottled()) {
        h.start(1, None).await;
        h.start(3, None).await;

        // Self, unknown inviter, malformed, second inviter
        assert_eq!(h.start(1, Some("ref1")).await, None);
        assert_eq!(h.start(2, Some("ref99")).await, None);
        assert_eq!(h.start(2, Some("refabc")).await, None);
        assert!(h.start(2, Some("ref1")).await.is_some());
        assert_eq!(h.start(2, Some("ref3")).await, None);

        assert_eq!(h.account(1).await.balance, 2, "{}", h.name);
        assert_eq!(h.account(3).await.balance, 0, "{}", h.name);
        assert!(h.store.find(UserId(99)).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn referral_cap() {
    let config = LedgerConfig {
        max_referrals: 3,
        ..unthrottled()
    };
    for h in Harness::all(config) {
        h.start(1, None).await;
        h.start(2, Some("ref1")).await;
        h.start(3, Some("ref1")).await;
        assert_eq!(h.account(1).await.referral_count, 2);

        let last = h.start(4, Some("ref1")).await;
        assert!(matches!(last, Some(ReferralOutcome::Recorded { .. })));
        assert_eq!(h.account(1).await.referral_count, 3);
        assert_eq!(h.account(1).await.balance, 6);

        assert_eq!(h.start(5, Some("ref1")).await, None);
        let inviter = h.account(1).await;
        assert_eq!(inviter.referral_count, 3, "{}", h.name);
        assert_eq!(inviter.balance, 6, "{}", h.name);
        assert!(h.store.referral_of(UserId(5)).await.unwrap().is_none());

        let info = h.service.referral_info(UserId(1)).await.unwrap();
        assert_eq!(info.remaining, 0);
    }
}

#[tokio::test]
async fn payment_redelivery_does_not_double_credit() {
    for h in Harness::all(unthrottled()) {
        h.pay(1, "pro-pack-credits", "charge-1").await;
        let dup = h.pay(1, "pro-pack-credits", "charge-1").await;
        assert_eq!(dup, PaymentReceipt::Duplicate { payment_id: "charge-1".into() });

        h.pay(1, "premium-30d", "charge-2").await;
        h.pay(1, "premium-30d", "charge-2").await;

        let account = h.account(1).await;
        assert_eq!(account.balance, 100, "{}", h.name);
        assert_eq!(account.premium_until, T0 + 30 * SECONDS_PER_DAY, "{}", h.name);

        let stats = h.store.stats().await.unwrap();
        assert_eq!(stats.payments, 2);
        assert_eq!(stats.payment_total, 500);
    }
}

#[tokio::test]
async fn events_dispatch() {
    for h in Harness::all(unthrottled()) {
        let msg = h
            .service
            .handle(InboundEvent::ReferralStartSeen(answer_ledger::ReferralStartSeen::new(
                UserId(7),
                None,
            )))
            .await;
        assert!(matches!(msg, OutboundMessage::Welcome { user_id: UserId(7), .. }));

        let msg = h.service.handle(InboundEvent::PlanRequested { user_id: UserId(7) }).await;
        match msg {
            OutboundMessage::Plan { status, .. } => {
                assert_eq!(status.daily_count, 0);
                assert_eq!(status.free_daily_limit, 10);
            }
            other => panic!("{}: unexpected {:?}", h.name, other),
        }

        let msg = h.service.handle(InboundEvent::OffersRequested { user_id: UserId(7) }).await;
        assert!(matches!(msg, OutboundMessage::Offers { ref offers, .. } if offers.len() == 2));

        let msg = h
            .service
            .handle(InboundEvent::PaymentConfirmed(answer_ledger::PaymentConfirmed {
                user_id: UserId(7),
                product_code: "pro-pack-credits".into(),
                amount: 250,
                provider_charge_id: Some("x".into()),
            }))
            .await;
        match msg {
            OutboundMessage::Payment { message, .. } => {
                assert_eq!(message.as_deref(), Some("Thanks! Added +100 answers. Use /plan to check."));
            }
            other => panic!("{}: unexpected {:?}", h.name, other),
        }
    }
}
