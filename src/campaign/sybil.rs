//! Anti-Sybil Guard
//!
//! Caps how many new wallets a single network origin may create. Exceeding the
//! cap bans the origin for `ban_duration`; the ban is persisted even though the
//! request that triggered it is rejected.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::state::Txn;
use super::wallet::Wallet;

pub const DEFAULT_MAX_WALLETS_PER_ORIGIN: u32 = 5;
pub const DEFAULT_BAN_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginRestriction {
    pub origin: String,
    pub wallet_count: u32,
    pub last_wallet_created: Option<DateTime<Utc>>,
    pub banned_until: Option<DateTime<Utc>>,
}

impl OriginRestriction {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            wallet_count: 0,
            last_wallet_created: None,
            banned_until: None,
        }
    }

    pub fn ban_active_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.banned_until.filter(|until| *until > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SybilDecision {
    Allow,
    Banned { until: DateTime<Utc> },
    LimitReached { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy)]
pub struct SybilLimits {
    pub max_wallets_per_origin: u32,
    pub ban_duration: Duration,
}

impl Default for SybilLimits {
    fn default() -> Self {
        Self {
            max_wallets_per_origin: DEFAULT_MAX_WALLETS_PER_ORIGIN,
            ban_duration: Duration::hours(DEFAULT_BAN_HOURS),
        }
    }
}

pub struct AntiSybilGuard {
    limits: SybilLimits,
}

impl AntiSybilGuard {
    pub fn new(limits: SybilLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SybilLimits {
        self.limits
    }

    pub fn check_and_register(
        &self,
        txn: &mut Txn<'_>,
        origin: &str,
        wallet: &Wallet,
        is_new_wallet: bool,
    ) -> SybilDecision {
        let now = txn.now();
        let mut record = txn
            .origin(origin)
            .cloned()
            .unwrap_or_else(|| OriginRestriction::new(origin));

        if let Some(until) = record.ban_active_at(now) {
            warn!(origin = %origin, wallet = %wallet, %until, "Request from banned origin");
            return SybilDecision::Banned { until };
        }

        if !is_new_wallet {
            return SybilDecision::Allow;
        }

        if record.wallet_count >= self.limits.max_wallets_per_origin {
            let until = now + self.limits.ban_duration;
            record.banned_until = Some(until);
            txn.put_origin(record);
            warn!(
                origin = %origin,
                wallet = %wallet,
                limit = self.limits.max_wallets_per_origin,
                %until,
                "Origin wallet limit reached, banning"
            );
            return SybilDecision::LimitReached { until };
        }

        record.wallet_count += 1;
        record.last_wallet_created = Some(now);
        debug!(origin = %origin, wallet_count = record.wallet_count, "Registered wallet for origin");
        txn.put_origin(record);
        SybilDecision::Allow
    }
}
