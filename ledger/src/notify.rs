//! Best-effort user notifications.
//!
//! Delivery failures are logged by the caller and never affect the ledger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::types::UserId;

/// Message pushed to a user outside the request/response flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// An invitee joined through the user's link
    ReferralBonus { bonus: u64, referral_count: u32 },
}

impl Notification {
    /// Text shown to the recipient.
    pub fn message(&self) -> String {
        match self {
            Notification::ReferralBonus { bonus, .. } => {
                format!("New friend joined via your link! +{} answers added.", bonus)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Recipient {0} unreachable")]
    Unreachable(UserId),

    #[error("Notification channel closed")]
    Closed,
}

/// Delivery capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError> {
        info!(user_id = %user_id, message = %notification.message(), "Notification");
        Ok(())
    }
}

/// A notification addressed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub user_id: UserId,
    pub notification: Notification,
}

/// Forwards notifications to a channel drained by the transport.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// A notifier and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, user_id: UserId, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(Outbound {
                user_id,
                notification,
            })
            .await
            .map_err(|_| NotifyError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_message() {
        let n = Notification::ReferralBonus {
            bonus: 2,
            referral_count: 1,
        };
        assert!(n.message().contains("+2 answers added"));
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        let n = Notification::ReferralBonus {
            bonus: 2,
            referral_count: 3,
        };
        notifier.notify(UserId(7), n.clone()).await.unwrap();

        let out = rx.recv().await.unwrap();
        assert_eq!(out.user_id, UserId(7));
        assert_eq!(out.notification, n);

        drop(rx);
        assert_eq!(notifier.notify(UserId(7), n).await, Err(NotifyError::Closed));
    }
}
