//! Notification Sink
//!
//! Notifications are staged on the transaction like any other row, stored in the
//! wallet's feed on commit, then handed to the configured `NotificationSink`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::info;

use super::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    Claim,
    Referral,
    Achievement,
    TaskComplete,
    TaskVerification,
    TaskApproved,
    TaskReward,
    StreakBonus,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Claim => "claim",
            Self::Referral => "referral",
            Self::Achievement => "achievement",
            Self::TaskComplete => "task_complete",
            Self::TaskVerification => "task_verification",
            Self::TaskApproved => "task_approved",
            Self::TaskReward => "task_reward",
            Self::StreakBonus => "streak_bonus",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "welcome" => Self::Welcome,
            "claim" => Self::Claim,
            "referral" => Self::Referral,
            "achievement" => Self::Achievement,
            "task_complete" => Self::TaskComplete,
            "task_verification" => Self::TaskVerification,
            "task_approved" => Self::TaskApproved,
            "task_reward" => Self::TaskReward,
            "streak_bonus" => Self::StreakBonus,
            other => return Err(format!("unknown notification kind: {}", other)),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub wallet: Wallet,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub total_count: usize,
}

impl NotificationFeed {
    /// Newest first, truncated to `limit`; counts cover the whole feed
    pub fn from_notifications(mut all: Vec<Notification>, limit: usize) -> Self {
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let unread_count = all.iter().filter(|n| !n.read).count();
        let total_count = all.len();
        all.truncate(limit);
        Self {
            notifications: all,
            unread_count,
            total_count,
        }
    }
}

/// Receives every committed notification
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification);
}

/// Emits notifications as tracing events
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&self, notification: &Notification) {
        info!(
            wallet = %notification.wallet,
            kind = %notification.kind,
            id = %notification.id,
            "{}",
            notification.message
        );
    }
}

/// Keeps delivered notifications in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    pub fn count_for(&self, wallet: &Wallet, kind: NotificationKind) -> usize {
        self.delivered()
            .iter()
            .filter(|n| &n.wallet == wallet && n.kind == kind)
            .count()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, notification: &Notification) {
        if let Ok(mut list) = self.delivered.lock() {
            list.push(notification.clone());
        }
    }
}
