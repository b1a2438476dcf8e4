//! Reward Ledger
//!
//! Append-only record of every token amount a wallet earned. Three provenances
//! feed one user-visible balance:
//!
//! ```text
//!   Genesis  1005 + referral_count * 121 + Σ achievement rewards   (once per wallet)
//!   Task     catalog reward of a claimed task instance
//!   Streak   check-in bonus on streak milestones
//!   ───────────────────────────────────────────────────────────────
//!   balance = genesis + Σ task + Σ streak
//! ```
//!
//! Every entry carries a globally unique `tx_id`. A collision surfaces as
//! `CampaignError::Integrity` and the engine retries with fresh randomness.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use super::achievements::AchievementEngine;
use super::notifications::NotificationKind;
use super::referral::{self, ReferralOutcome};
use super::state::Txn;
use super::wallet::Wallet;
use crate::catalog::TaskDefinition;
use crate::error::CampaignError;

pub const GENESIS_BASE_AMOUNT: u64 = 1005;
pub const REFERRAL_BONUS_PER_REFERRAL: u64 = 121;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Genesis,
    Task,
    Streak,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::Task => "task",
            Self::Streak => "streak",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "genesis" => Ok(Self::Genesis),
            "task" => Ok(Self::Task),
            "streak" => Ok(Self::Streak),
            other => Err(format!("unknown provenance: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmountBreakdown {
    pub base_amount: u64,
    pub referral_bonus: u64,
    pub achievement_rewards: u64,
}

impl AmountBreakdown {
    pub fn total(&self) -> u64 {
        self.base_amount + self.referral_bonus + self.achievement_rewards
    }
}

pub fn calculate_airdrop_amount(referral_count: u32, achievement_rewards: u64) -> AmountBreakdown {
    AmountBreakdown {
        base_amount: GENESIS_BASE_AMOUNT,
        referral_bonus: referral_count as u64 * REFERRAL_BONUS_PER_REFERRAL,
        achievement_rewards,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: u64,
    pub wallet: Wallet,
    pub amount: u64,
    pub provenance: Provenance,
    /// Genesis entries only
    pub breakdown: Option<AmountBreakdown>,
    pub referral_count: u32,
    pub referrer: Option<Wallet>,
    /// Task id or streak length the entry pays for
    pub source: Option<String>,
    pub tx_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub const ENTRY_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Balance {
    pub total: u64,
    pub airdrop: u64,
    pub task_rewards: u64,
    pub streak_bonuses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenesisReceipt {
    pub wallet: Wallet,
    pub amount: u64,
    pub breakdown: AmountBreakdown,
    pub referral_count: u32,
    pub tx_id: String,
    pub referral: Option<ReferralOutcome>,
    pub new_achievements: Vec<String>,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenesisOutcome {
    Claimed(GenesisReceipt),
    AlreadyClaimed {
        existing: LedgerEntry,
        /// What the claim would be worth with today's referrals and achievements
        current: AmountBreakdown,
    },
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn genesis_tx_id() -> String {
    format!("0x{}", random_hex(32))
}

pub fn task_tx_id(task_id: &str, wallet: &Wallet) -> String {
    format!("TASK_{}_{}_{}", task_id, &wallet.as_str()[2..10], random_hex(4))
}

pub fn streak_tx_id(streak: u32, wallet: &Wallet) -> String {
    format!("STREAK_{}_{}_{}", streak, &wallet.as_str()[2..10], random_hex(3))
}

pub struct RewardLedger {
    token_symbol: String,
}

impl RewardLedger {
    pub fn new(token_symbol: impl Into<String>) -> Self {
        Self {
            token_symbol: token_symbol.into(),
        }
    }

    fn append(&self, txn: &mut Txn<'_>, entry: LedgerEntry) -> Result<LedgerEntry, CampaignError> {
        if txn.tx_id_exists(&entry.tx_id) {
            return Err(CampaignError::Integrity(entry.tx_id));
        }
        txn.append_entry(entry.clone());
        Ok(entry)
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        txn: &Txn<'_>,
        wallet: &Wallet,
        amount: u64,
        provenance: Provenance,
        breakdown: Option<AmountBreakdown>,
        source: Option<String>,
        tx_id: String,
    ) -> LedgerEntry {
        let user = txn.user(wallet);
        LedgerEntry {
            id: txn.ids().next_ledger_id(),
            wallet: wallet.clone(),
            amount,
            provenance,
            breakdown,
            referral_count: user.map(|u| u.referral_count).unwrap_or(0),
            referrer: user.and_then(|u| u.referrer.clone()),
            source,
            tx_id,
            status: ENTRY_STATUS_COMPLETED.to_string(),
            created_at: txn.now(),
        }
    }

    /// Breakdown the wallet's genesis claim would have right now
    pub fn projected_breakdown(
        &self,
        txn: &Txn<'_>,
        wallet: &Wallet,
        achievements: &AchievementEngine,
    ) -> AmountBreakdown {
        let referral_count = txn.user(wallet).map(|u| u.referral_count).unwrap_or(0);
        calculate_airdrop_amount(referral_count, achievements.total_reward(txn, wallet))
    }

    /// Issue the one-time genesis claim; replays return the existing entry
    pub fn issue_genesis_claim(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        referral_code: Option<&str>,
        achievements: &AchievementEngine,
    ) -> Result<GenesisOutcome, CampaignError> {
        if let Some(existing) = txn.genesis_entry(wallet).cloned() {
            let current = self.projected_breakdown(txn, wallet, achievements);
            return Ok(GenesisOutcome::AlreadyClaimed { existing, current });
        }

        if txn.user(wallet).is_none() {
            return Err(CampaignError::not_found("wallet", wallet.as_str()));
        }

        let referral = referral_code
            .map(referral::normalize_code)
            .filter(|code| !code.is_empty())
            .map(|code| referral::apply_referral(txn, &code, wallet, achievements));

        let breakdown = self.projected_breakdown(txn, wallet, achievements);
        let amount = breakdown.total();

        let entry = self.entry(
            txn,
            wallet,
            amount,
            Provenance::Genesis,
            Some(breakdown),
            None,
            genesis_tx_id(),
        );
        let entry = self.append(txn, entry)?;

        let new_achievements = achievements.evaluate(txn, wallet);

        txn.notify(
            wallet,
            NotificationKind::Claim,
            format!(
                "Successfully claimed {} {} tokens!",
                amount, self.token_symbol
            ),
        );

        info!(
            wallet = %wallet,
            amount,
            referral_count = entry.referral_count,
            tx_id = %entry.tx_id,
            "Genesis airdrop claimed"
        );

        Ok(GenesisOutcome::Claimed(GenesisReceipt {
            wallet: wallet.clone(),
            amount,
            breakdown,
            referral_count: entry.referral_count,
            tx_id: entry.tx_id,
            referral,
            new_achievements,
            claimed_at: entry.created_at,
        }))
    }

    pub fn append_task_reward(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        task: &TaskDefinition,
    ) -> Result<LedgerEntry, CampaignError> {
        let entry = self.entry(
            txn,
            wallet,
            task.reward,
            Provenance::Task,
            None,
            Some(task.id.clone()),
            task_tx_id(&task.id, wallet),
        );
        let entry = self.append(txn, entry)?;
        info!(wallet = %wallet, task_id = %task.id, amount = task.reward, "Task reward issued");
        Ok(entry)
    }

    pub fn append_streak_bonus(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        streak: u32,
        amount: u64,
    ) -> Result<LedgerEntry, CampaignError> {
        let entry = self.entry(
            txn,
            wallet,
            amount,
            Provenance::Streak,
            None,
            Some(streak.to_string()),
            streak_tx_id(streak, wallet),
        );
        let entry = self.append(txn, entry)?;
        info!(wallet = %wallet, streak, amount, "Streak bonus issued");
        Ok(entry)
    }

    pub fn balance(&self, txn: &Txn<'_>, wallet: &Wallet) -> Balance {
        let mut balance = Balance::default();
        for entry in txn.ledger_entries(wallet) {
            match entry.provenance {
                Provenance::Genesis => balance.airdrop += entry.amount,
                Provenance::Task => balance.task_rewards += entry.amount,
                Provenance::Streak => balance.streak_bonuses += entry.amount,
            }
        }
        balance.total = balance.airdrop + balance.task_rewards + balance.streak_bonuses;
        balance
    }

    pub fn token_symbol(&self) -> &str {
        &self.token_symbol
    }
}
