//! Core types for the answer ledger.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use answer_agent::QualityTier;

/// Prefix of referral codes and start parameters.
pub const REFERRAL_PREFIX: &str = "ref";

/// Stable external user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Referral code derived from the id (`ref<id>`).
    pub fn referral_code(&self) -> String {
        format!("{}{}", REFERRAL_PREFIX, self.0)
    }

    /// Resolve a start parameter of the form `ref<id>` to the inviter id.
    pub fn from_referral_code(code: &str) -> Option<UserId> {
        code.trim()
            .strip_prefix(REFERRAL_PREFIX)
            .and_then(|rest| rest.trim().parse::<i64>().ok())
            .map(UserId)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// Per-user ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Primary key
    pub id: UserId,
    /// Calendar day (`%Y-%m-%d`) that `daily_count` applies to
    pub day: String,
    /// Answers consumed on `day`
    pub daily_count: u32,
    /// Subscription expiry as unix seconds; 0 = never subscribed
    pub premium_until: i64,
    /// Purchased one-time credits
    pub balance: u64,
    /// Derived from `id`, stable for the account's lifetime
    pub referral_code: String,
    /// Referrals credited so far, capped by configuration
    pub referral_count: u32,
    /// Last admitted answer request as unix milliseconds; 0 = never
    pub last_request_at: i64,
}

impl UserAccount {
    /// A fresh account as created on first contact.
    pub fn new(id: UserId, today: &str) -> Self {
        Self {
            id,
            day: today.to_string(),
            daily_count: 0,
            premium_until: 0,
            balance: 0,
            referral_code: id.referral_code(),
            referral_count: 0,
            last_request_at: 0,
        }
    }

    /// Subscription active iff `premium_until > now`.
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        self.premium_until > now.timestamp()
    }

    /// Subscription expiry, if the account ever subscribed.
    pub fn premium_expiry(&self) -> Option<DateTime<Utc>> {
        if self.premium_until == 0 {
            return None;
        }
        Utc.timestamp_opt(self.premium_until, 0).single()
    }
}

/// A user's current entitlement class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Free daily allotment
    Free,
    /// Free allotment used up, paying with one-time credits
    Credits,
    /// Active subscriber
    Premium,
}

impl Tier {
    /// Model quality answers in this tier are produced with.
    pub fn quality(&self) -> QualityTier {
        match self {
            Tier::Premium => QualityTier::Premium,
            Tier::Free | Tier::Credits => QualityTier::Standard,
        }
    }
}

/// Recorded inviter → invitee relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEdge {
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    /// Unix seconds
    pub created_at: i64,
}

/// Append-only record of a confirmed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Idempotency key: the provider charge id when supplied
    pub payment_id: String,
    pub user_id: UserId,
    pub product_code: String,
    /// Amount in the provider's minor units
    pub amount: u64,
    /// Unix seconds
    pub timestamp: i64,
}

/// Why a referral was not recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidReferral {
    #[error("user {0} cannot refer themselves")]
    SelfReferral(UserId),

    #[error("inviter {0} has no account")]
    UnknownInviter(UserId),

    #[error("user {invitee} was already referred by {inviter}")]
    AlreadyReferred { invitee: UserId, inviter: UserId },

    #[error("inviter {inviter} reached the referral cap of {cap}")]
    CapReached { inviter: UserId, cap: u32 },

    #[error("start parameter {0:?} does not name an inviter")]
    MalformedStartParam(String),
}

/// Error types for the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Underlying storage failed; callers must deny rather than allow
    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    /// Referral rejected
    #[error("Invalid referral: {0}")]
    InvalidReferral(#[from] InvalidReferral),

    /// Mutation failed validation and was not applied
    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Unix milliseconds for a moment.
pub fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}
