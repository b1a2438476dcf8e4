//! Achievement Engine
//!
//! Unlocks are monotone: once recorded for a (wallet, achievement) pair they are
//! never revoked and never recorded twice. The total achievement reward is
//! recomputed from the unlock records on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::notifications::NotificationKind;
use super::state::Txn;
use super::wallet::Wallet;
use crate::catalog::{AchievementDefinition, Catalog, UnlockRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub wallet: Wallet,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub requirement: u32,
    pub reward: u64,
    pub unlocked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementProgress {
    pub achievements: Vec<AchievementStatus>,
    pub total_unlocked: usize,
    pub total_rewards: u64,
    pub progress_percentage: f64,
}

pub struct AchievementEngine {
    catalog: Arc<Catalog>,
}

impl AchievementEngine {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    fn qualifies(&self, txn: &Txn<'_>, wallet: &Wallet, def: &AchievementDefinition) -> bool {
        match def.rule {
            UnlockRule::GenesisClaim => txn.genesis_entry(wallet).is_some(),
            UnlockRule::MinReferrals { count } => txn
                .user(wallet)
                .map(|u| u.referral_count >= count)
                .unwrap_or(false),
        }
    }

    /// Unlock everything the wallet now qualifies for; returns the new ids
    pub fn evaluate(&self, txn: &mut Txn<'_>, wallet: &Wallet) -> Vec<String> {
        if txn.user(wallet).is_none() {
            return Vec::new();
        }

        let mut unlocked = Vec::new();
        for def in self.catalog.achievements() {
            if txn.has_achievement(wallet, &def.id) || !self.qualifies(txn, wallet, def) {
                continue;
            }

            txn.record_unlock(AchievementUnlock {
                wallet: wallet.clone(),
                achievement_id: def.id.clone(),
                unlocked_at: txn.now(),
            });
            txn.notify(
                wallet,
                NotificationKind::Achievement,
                format!(
                    "Achievement unlocked: {}! +{} {}",
                    def.name,
                    def.reward,
                    self.catalog.token_symbol()
                ),
            );
            info!(wallet = %wallet, achievement = %def.id, reward = def.reward, "Achievement unlocked");
            unlocked.push(def.id.clone());
        }
        unlocked
    }

    pub fn total_reward(&self, txn: &Txn<'_>, wallet: &Wallet) -> u64 {
        txn.unlocks(wallet)
            .iter()
            .filter_map(|u| self.catalog.achievement(&u.achievement_id))
            .map(|def| def.reward)
            .sum()
    }

    pub fn progress(&self, txn: &Txn<'_>, wallet: &Wallet) -> AchievementProgress {
        let achievements: Vec<AchievementStatus> = self
            .catalog
            .achievements()
            .iter()
            .map(|def| AchievementStatus {
                id: def.id.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
                icon: def.icon.clone(),
                requirement: def.requirement(),
                reward: def.reward,
                unlocked: txn.has_achievement(wallet, &def.id),
            })
            .collect();

        let total_unlocked = achievements.iter().filter(|a| a.unlocked).count();
        let progress_percentage = if achievements.is_empty() {
            0.0
        } else {
            total_unlocked as f64 / achievements.len() as f64 * 100.0
        };

        AchievementProgress {
            total_rewards: self.total_reward(txn, wallet),
            total_unlocked,
            progress_percentage,
            achievements,
        }
    }
}
