//! In-process ledger store.
//!
//! Each account lives behind its own async mutex, so units for different
//! users never wait on each other. The referral and payment logs have their
//! own locks, always taken after the row lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{LedgerStats, LedgerStore, PaymentAppend, Plan, ReferralAppend};
use crate::reset::roll_day;
use crate::types::{
    InvalidReferral, PaymentRecord, ReferralEdge, Result, UserAccount, UserId,
};

type Row = Arc<Mutex<UserAccount>>;

#[derive(Default)]
struct PaymentLog {
    records: Vec<PaymentRecord>,
    ids: HashSet<String>,
}

/// Ledger held in memory.
#[derive(Default)]
pub struct MemoryLedger {
    accounts: DashMap<UserId, Row>,
    /// Edges keyed by invitee
    referrals: Mutex<HashMap<UserId, ReferralEdge>>,
    payments: Mutex<PaymentLog>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row for `user_id`, created on first contact.
    fn row(&self, user_id: UserId, today: &str) -> Row {
        self.accounts
            .entry(user_id)
            .or_insert_with(|| {
                debug!(user_id = %user_id, "Creating account");
                Arc::new(Mutex::new(UserAccount::new(user_id, today)))
            })
            .value()
            .clone()
    }

    fn existing_row(&self, user_id: UserId) -> Option<Row> {
        self.accounts.get(&user_id).map(|r| r.value().clone())
    }
}

/// Plan, validate and apply against a locked row.
fn plan_and_apply(account: &mut UserAccount, plan: &mut Plan<'_>) -> Result<()> {
    let mutation = plan(&*account)?;
    mutation.apply(account)
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, user_id: UserId, today: &str) -> Result<UserAccount> {
        let row = self.row(user_id, today);
        let mut account = row.lock().await;
        roll_day(&mut account, today);
        Ok(account.clone())
    }

    async fn find(&self, user_id: UserId) -> Result<Option<UserAccount>> {
        match self.existing_row(user_id) {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn update(&self, user_id: UserId, today: &str, plan: &mut Plan<'_>) -> Result<UserAccount> {
        let row = self.row(user_id, today);
        let mut account = row.lock().await;
        roll_day(&mut account, today);

        // Work on a copy so an aborted plan leaves the row untouched
        let mut next = account.clone();
        plan_and_apply(&mut next, plan)?;
        *account = next;

        Ok(account.clone())
    }

    async fn append_referral(
        &self,
        edge: ReferralEdge,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<ReferralAppend> {
        let row = self
            .existing_row(edge.inviter_id)
            .ok_or(InvalidReferral::UnknownInviter(edge.inviter_id))?;
        let mut inviter = row.lock().await;
        let mut referrals = self.referrals.lock().await;

        if let Some(existing) = referrals.get(&edge.invitee_id) {
            if existing.inviter_id == edge.inviter_id {
                return Ok(ReferralAppend::AlreadyRecorded);
            }
            return Err(InvalidReferral::AlreadyReferred {
                invitee: edge.invitee_id,
                inviter: existing.inviter_id,
            }
            .into());
        }

        roll_day(&mut inviter, today);
        let mut next = inviter.clone();
        plan_and_apply(&mut next, plan)?;
        *inviter = next;
        referrals.insert(edge.invitee_id, edge);

        Ok(ReferralAppend::Recorded(inviter.clone()))
    }

    async fn append_payment(
        &self,
        record: PaymentRecord,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<PaymentAppend> {
        let row = self.row(record.user_id, today);
        let mut account = row.lock().await;
        let mut payments = self.payments.lock().await;
        roll_day(&mut account, today);

        if payments.ids.contains(&record.payment_id) {
            return Ok(PaymentAppend::Duplicate(account.clone()));
        }

        let mut next = account.clone();
        plan_and_apply(&mut next, plan)?;
        *account = next;
        payments.ids.insert(record.payment_id.clone());
        payments.records.push(record);

        Ok(PaymentAppend::Applied(account.clone()))
    }

    async fn referral_of(&self, invitee: UserId) -> Result<Option<ReferralEdge>> {
        Ok(self.referrals.lock().await.get(&invitee).cloned())
    }

    async fn payments_of(&self, user_id: UserId) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.lock().await;
        Ok(payments
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats {
            users: self.accounts.len() as u64,
            referrals: self.referrals.lock().await.len() as u64,
            ..Default::default()
        };

        let payments = self.payments.lock().await;
        for record in &payments.records {
            stats.payments += 1;
            stats.payment_total = stats.payment_total.saturating_add(record.amount);
            *stats
                .payments_by_product
                .entry(record.product_code.clone())
                .or_insert(0) += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::AccountMutation;
    use crate::types::LedgerError;

    const TODAY: &str = "2026-10-18";

    #[tokio::test]
    async fn test_get_creates_and_resets() {
        let store = MemoryLedger::new();
        let account = store.get(UserId(1), "2026-10-17").await.unwrap();
        assert_eq!(account.day, "2026-10-17");

        store
            .apply_mutation(UserId(1), "2026-10-17", AccountMutation::none().count_answer())
            .await
            .unwrap();

        let account = store.get(UserId(1), TODAY).await.unwrap();
        assert_eq!(account.day, TODAY);
        assert_eq!(account.daily_count, 0);
    }

    #[tokio::test]
    async fn test_find_does_not_create() {
        let store = MemoryLedger::new();
        assert!(store.find(UserId(9)).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().users, 0);
    }

    #[tokio::test]
    async fn test_aborted_plan_leaves_row() {
        let store = MemoryLedger::new();
        store
            .apply_mutation(UserId(1), TODAY, AccountMutation::none().credit(1))
            .await
            .unwrap();

        let result = store
            .apply_mutation(
                UserId(1),
                TODAY,
                AccountMutation::none().stamp_request(99).debit_credit().debit_credit(),
            )
            .await;

        assert!(matches!(result, Err(LedgerError::InvalidMutation(_))));
        let account = store.get(UserId(1), TODAY).await.unwrap();
        assert_eq!(account.balance, 1);
        assert_eq!(account.last_request_at, 0);
    }

    #[tokio::test]
    async fn test_referral_requires_inviter() {
        let store = MemoryLedger::new();
        let edge = ReferralEdge {
            inviter_id: UserId(1),
            invitee_id: UserId(2),
            created_at: 0,
        };

        let result = store
            .append_referral(edge, TODAY, &mut |_: &UserAccount| Ok(AccountMutation::none()))
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InvalidReferral(InvalidReferral::UnknownInviter(UserId(1))))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_payment_id() {
        let store = MemoryLedger::new();
        let record = PaymentRecord {
            payment_id: "charge-1".into(),
            user_id: UserId(3),
            product_code: "pro-pack-credits".into(),
            amount: 250,
            timestamp: 0,
        };

        let first = store
            .append_payment(record.clone(), TODAY, &mut |_: &UserAccount| {
                Ok(AccountMutation::none().credit(100))
            })
            .await
            .unwrap();
        let second = store
            .append_payment(record, TODAY, &mut |_: &UserAccount| {
                Ok(AccountMutation::none().credit(100))
            })
            .await
            .unwrap();

        assert!(matches!(first, PaymentAppend::Applied(ref a) if a.balance == 100));
        assert!(matches!(second, PaymentAppend::Duplicate(ref a) if a.balance == 100));
        assert_eq!(store.payments_of(UserId(3)).await.unwrap().len(), 1);
    }
}
