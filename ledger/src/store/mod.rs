//! Ledger storage.
//!
//! The store is the sole owner of accounts, referral edges and payment
//! records. Every write is a single atomic unit scoped to one account row:
//! the row is read (applying the lazy daily reset), handed to a planning
//! closure that returns an [`AccountMutation`], validated and written back
//! before any other caller can observe the row. Log appends (referral
//! edges, payment records) commit in the same unit as the account change
//! they pay for.
//!
//! ## Implementations
//!
//! - [`MemoryLedger`] - per-user async mutexes over a `DashMap`
//! - [`SqliteLedger`] - rusqlite with one IMMEDIATE transaction per unit

pub mod memory;
pub mod schema;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::mutation::AccountMutation;
use crate::types::{PaymentRecord, ReferralEdge, Result, UserAccount, UserId};

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

/// Decides the mutation for an account inside its atomic unit.
///
/// Called exactly once per unit with the freshly read (and day-rolled) row.
/// Returning an error aborts the unit with nothing written.
pub type Plan<'a> = dyn FnMut(&UserAccount) -> Result<AccountMutation> + Send + 'a;

/// Result of appending a referral edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralAppend {
    /// Edge inserted; carries the inviter's updated account
    Recorded(UserAccount),
    /// The identical edge already exists; nothing changed
    AlreadyRecorded,
}

/// Result of appending a payment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentAppend {
    /// Record inserted and mutation applied; carries the updated account
    Applied(UserAccount),
    /// A record with the same payment id exists; carries the current account
    Duplicate(UserAccount),
}

/// Aggregate ledger figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub users: u64,
    pub payments: u64,
    /// Sum of payment amounts in minor units
    pub payment_total: u64,
    pub payments_by_product: BTreeMap<String, u64>,
    pub referrals: u64,
}

/// Durable per-user ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Read an account, creating it if absent and applying the daily reset.
    async fn get(&self, user_id: UserId, today: &str) -> Result<UserAccount>;

    /// Read an account as stored, without creating it.
    async fn find(&self, user_id: UserId) -> Result<Option<UserAccount>>;

    /// Atomic read-plan-write of one account (created if absent).
    async fn update(&self, user_id: UserId, today: &str, plan: &mut Plan<'_>) -> Result<UserAccount>;

    /// Atomic read-modify-write with a mutation fixed in advance.
    async fn apply_mutation(
        &self,
        user_id: UserId,
        today: &str,
        mutation: AccountMutation,
    ) -> Result<UserAccount> {
        self.update(user_id, today, &mut move |_: &UserAccount| Ok(mutation.clone()))
            .await
    }

    /// Insert `edge` and apply the inviter's planned mutation in one unit.
    ///
    /// Fails with `UnknownInviter` if the inviter has no account and with
    /// `AlreadyReferred` if the invitee already has an edge to someone else.
    async fn append_referral(
        &self,
        edge: ReferralEdge,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<ReferralAppend>;

    /// Insert `record` and apply the payer's planned mutation in one unit,
    /// unless a record with the same payment id already exists.
    async fn append_payment(
        &self,
        record: PaymentRecord,
        today: &str,
        plan: &mut Plan<'_>,
    ) -> Result<PaymentAppend>;

    /// The edge that referred `invitee`, if any.
    async fn referral_of(&self, invitee: UserId) -> Result<Option<ReferralEdge>>;

    /// Payment records of one user, oldest first.
    async fn payments_of(&self, user_id: UserId) -> Result<Vec<PaymentRecord>>;

    /// Aggregate figures.
    async fn stats(&self) -> Result<LedgerStats>;
}
