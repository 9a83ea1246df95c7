#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use answer_ledger::{
    AnswerDecision, AnswerRequested, LedgerConfig, LedgerService, LedgerStore, LogNotifier,
    ManualClock, MemoryLedger, PaymentConfirmed, PaymentReceipt, ReferralOutcome,
    ReferralStartSeen, SqliteLedger, UserAccount, UserId,
};

/// 2026-10-18T05:06:40Z
pub const T0: i64 = 1_792_300_000;

/// A service over one store with a controllable clock.
pub struct Harness {
    pub name: &'static str,
    pub service: LedgerService,
    pub store: Arc<dyn LedgerStore>,
    pub clock: Arc<ManualClock>,
    _dir: Option<TempDir>,
}

impl Harness {
    pub fn memory(config: LedgerConfig) -> Self {
        Self::build("memory", Arc::new(MemoryLedger::new()), None, config)
    }

    pub fn sqlite(config: LedgerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let store = SqliteLedger::open(&dir.path().join("ledger.db")).unwrap();
        Self::build("sqlite", Arc::new(store), Some(dir), config)
    }

    /// One harness per store implementation.
    pub fn all(config: LedgerConfig) -> Vec<Harness> {
        vec![Self::memory(config.clone()), Self::sqlite(config)]
    }

    fn build(
        name: &'static str,
        store: Arc<dyn LedgerStore>,
        dir: Option<TempDir>,
        config: LedgerConfig,
    ) -> Self {
        let clock = Arc::new(ManualClock::at_timestamp(T0));
        let service = LedgerService::new(store.clone(), clock.clone(), config, Arc::new(LogNotifier));
        Self {
            name,
            service,
            store,
            clock,
            _dir: dir,
        }
    }

    pub async fn ask(&self, user: i64) -> AnswerDecision {
        self.service
            .answer_requested(&AnswerRequested {
                user_id: UserId(user),
                text: "What is a blockchain?".into(),
            })
            .await
    }

    pub async fn start(&self, user: i64, param: Option<&str>) -> Option<ReferralOutcome> {
        self.service
            .referral_start_seen(&ReferralStartSeen::new(UserId(user), param))
            .await
            .unwrap()
    }

    pub async fn pay(&self, user: i64, code: &str, charge: &str) -> PaymentReceipt {
        self.service
            .payment_confirmed(PaymentConfirmed {
                user_id: UserId(user),
                product_code: code.into(),
                amount: 250,
                provider_charge_id: Some(charge.into()),
            })
            .await
            .unwrap()
    }

    pub async fn account(&self, user: i64) -> UserAccount {
        self.store.find(UserId(user)).await.unwrap().unwrap()
    }
}

/// Defaults with no minimum interval between requests.
pub fn unthrottled() -> LedgerConfig {
    LedgerConfig {
        free_interval_ms: 0,
        premium_interval_ms: 0,
        ..Default::default()
    }
}
