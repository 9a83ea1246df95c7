//! Answer Ledger - entitlement and quota accounting for a metered AI bot
//!
//! Decides, per request, whether a user may receive an AI answer and what it
//! costs them:
//! - Free daily allotment with a lazy calendar-day reset
//! - One-time credit packs and time-boxed subscriptions with a fair-use cap
//! - Per-tier minimum interval between requests
//! - Capped referral bonuses with exactly-once edges
//! - Exactly-once payment application keyed by payment id
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             LedgerService               │
//! │   (event dispatch, answer flow, views)  │
//! └──────┬─────────────┬─────────────┬──────┘
//!        ▼             ▼             ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │ QuotaEngine│ │ Referral   │ │ Payment    │
//! │ + Throttle │ │ Ledger     │ │ Applier    │
//! └──────┬─────┘ └──────┬─────┘ └──────┬─────┘
//!        └──────────────┼──────────────┘
//!                       ▼
//!              ┌─────────────────┐
//!              │  LedgerStore    │
//!              │ (memory/sqlite) │
//!              └─────────────────┘
//! ```
//!
//! Every decision and the mutation that pays for it commit as one unit per
//! user. The AI call happens afterwards with no lock held.

pub mod cli;
pub mod clock;
pub mod config;
pub mod events;
pub mod mutation;
pub mod notify;
pub mod offers;
pub mod payment;
pub mod policy;
pub mod referral;
pub mod reset;
pub mod service;
pub mod store;
pub mod throttle;
pub mod types;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use events::{AnswerRequested, InboundEvent, OutboundMessage, ReferralStartSeen};
pub use mutation::AccountMutation;
pub use notify::{ChannelNotifier, LogNotifier, Notification, Notifier, NotifyError};
pub use offers::{Offer, Product, UpsellOffer};
pub use payment::{Confirmation, PaymentApplier, PaymentConfirmed, PaymentReceipt};
pub use policy::{Decision, DenyReason, QuotaEngine};
pub use referral::{ReferralLedger, ReferralOutcome};
pub use service::{AnswerDecision, LedgerService, PlanStatus, ReferralInfo};
pub use store::{LedgerStats, LedgerStore, MemoryLedger, SqliteLedger};
pub use throttle::ThrottleGuard;
pub use types::*;
