//! Achievement definitions

use serde::{Deserialize, Serialize};

pub const FIRST_CLAIM: &str = "first_claim";

/// Condition under which an achievement unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockRule {
    /// Wallet holds a genesis ledger entry
    GenesisClaim,
    /// Wallet's referral_count reached the threshold
    MinReferrals { count: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub rule: UnlockRule,
    pub reward: u64,
}

impl AchievementDefinition {
    /// Referral threshold shown to users (0 for the claim achievement)
    pub fn requirement(&self) -> u32 {
        match self.rule {
            UnlockRule::GenesisClaim => 0,
            UnlockRule::MinReferrals { count } => count,
        }
    }
}

fn achievement(
    id: &str,
    name: &str,
    description: &str,
    icon: &str,
    rule: UnlockRule,
    reward: u64,
) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        rule,
        reward,
    }
}

pub fn builtin_achievements() -> Vec<AchievementDefinition> {
    vec![
        achievement(
            FIRST_CLAIM,
            "Airdrop Pioneer",
            "Claimed your first airdrop",
            "🚀",
            UnlockRule::GenesisClaim,
            1,
        ),
        achievement(
            "first_ref",
            "First Referral",
            "Got your first referral",
            "🥇",
            UnlockRule::MinReferrals { count: 1 },
            11,
        ),
        achievement(
            "active_network",
            "Network Builder",
            "Built an active network of 3 referrals",
            "🌐",
            UnlockRule::MinReferrals { count: 3 },
            111,
        ),
        achievement(
            "five_ref",
            "Referral Master",
            "Reached 5 referrals",
            "🏆",
            UnlockRule::MinReferrals { count: 5 },
            1111,
        ),
        achievement(
            "withdrawal_ready",
            "Ready to Cash Out",
            "Almost ready for withdrawal",
            "💰",
            UnlockRule::MinReferrals { count: 6 },
            11111,
        ),
    ]
}
