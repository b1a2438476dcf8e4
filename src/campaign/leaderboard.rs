//! Referral leaderboard and campaign counters

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::achievements::AchievementEngine;
use super::ledger::RewardLedger;
use super::state::Txn;
use super::wallet::Wallet;

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub wallet: Wallet,
    pub display_wallet: String,
    pub referral_count: u32,
    pub projected_airdrop: u64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    /// Rank of the requesting wallet, when it has a user row
    pub wallet_rank: Option<usize>,
    pub total_users: usize,
    pub total_claims: usize,
}

/// Ordered by referral_count descending, ties broken by earliest signup
pub fn build(
    txn: &Txn<'_>,
    limit: usize,
    wallet: Option<&Wallet>,
    ledger: &RewardLedger,
    achievements: &AchievementEngine,
) -> Leaderboard {
    let state = txn.base();
    let mut users: Vec<_> = state.users().collect();
    users.sort_by(|a, b| {
        b.referral_count
            .cmp(&a.referral_count)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.wallet.cmp(&b.wallet))
    });

    let wallet_rank = wallet.and_then(|w| users.iter().position(|u| &u.wallet == w).map(|i| i + 1));

    let entries = users
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, user)| LeaderboardEntry {
            rank: i + 1,
            wallet: user.wallet.clone(),
            display_wallet: user.wallet.display_short(),
            referral_count: user.referral_count,
            projected_airdrop: ledger
                .projected_breakdown(txn, &user.wallet, achievements)
                .total(),
            joined_at: user.created_at,
        })
        .collect();

    Leaderboard {
        entries,
        wallet_rank,
        total_users: state.user_count(),
        total_claims: state.genesis_count(),
    }
}
