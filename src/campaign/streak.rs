//! Streak Tracker
//!
//! Calendar days are UTC dates. A check-in on the day after the previous one
//! extends the streak; any larger gap restarts it at 1; a second check-in on the
//! same date is rejected.
//!
//! | current streak      | bonus |
//! |---------------------|-------|
//! | multiple of 7       | 50    |
//! | multiple of 30 only | 200   |
//! | otherwise           | 0     |
//!
//! The weekly rule is checked first, so a streak of 210 pays 50.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ledger::RewardLedger;
use super::notifications::NotificationKind;
use super::state::Txn;
use super::tasks::TaskLifecycle;
use super::wallet::Wallet;
use crate::error::{CampaignError, Conflict};

pub const WEEKLY_STREAK_BONUS: u64 = 50;
pub const MONTHLY_STREAK_BONUS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStreak {
    pub wallet: Wallet,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_checkins: u32,
    pub last_checkin: Option<DateTime<Utc>>,
}

impl DailyStreak {
    pub fn new(wallet: Wallet) -> Self {
        Self {
            wallet,
            current_streak: 0,
            longest_streak: 0,
            total_checkins: 0,
            last_checkin: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_checkins: u32,
    pub last_checkin: Option<DateTime<Utc>>,
    pub checked_in_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckinReceipt {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_checkins: u32,
    pub bonus_earned: u64,
    pub bonus_tx_id: Option<String>,
    pub task_reward_pending: Option<u64>,
}

pub fn streak_bonus(streak: u32) -> u64 {
    if streak == 0 {
        0
    } else if streak % 7 == 0 {
        WEEKLY_STREAK_BONUS
    } else if streak % 30 == 0 {
        MONTHLY_STREAK_BONUS
    } else {
        0
    }
}

/// Next streak state for a check-in at `now`
pub fn advance(previous: &DailyStreak, now: DateTime<Utc>) -> Result<DailyStreak, Conflict> {
    let today = now.date_naive();
    let mut next = previous.clone();

    next.current_streak = match previous.last_checkin.map(|at| at.date_naive()) {
        None => 1,
        Some(last) if last == today => {
            return Err(Conflict::AlreadyCheckedInToday {
                streak: previous.clone(),
            })
        }
        Some(last) if last + Duration::days(1) == today => previous.current_streak + 1,
        Some(_) => 1,
    };
    next.longest_streak = next.longest_streak.max(next.current_streak);
    next.total_checkins += 1;
    next.last_checkin = Some(now);
    Ok(next)
}

pub fn summary(txn: &Txn<'_>, wallet: &Wallet) -> StreakSummary {
    let today = txn.now().date_naive();
    txn.streak(wallet)
        .map(|s| StreakSummary {
            current_streak: s.current_streak,
            longest_streak: s.longest_streak,
            total_checkins: s.total_checkins,
            last_checkin: s.last_checkin,
            checked_in_today: s.last_checkin.map(|at| at.date_naive()) == Some(today),
        })
        .unwrap_or_default()
}

/// Record today's check-in, pay any milestone bonus and complete the check-in task
pub fn checkin(
    txn: &mut Txn<'_>,
    wallet: &Wallet,
    tasks: &TaskLifecycle,
    ledger: &RewardLedger,
) -> Result<CheckinReceipt, CampaignError> {
    let previous = txn
        .streak(wallet)
        .cloned()
        .unwrap_or_else(|| DailyStreak::new(wallet.clone()));
    let next = advance(&previous, txn.now())?;
    txn.put_streak(next.clone());

    let bonus = streak_bonus(next.current_streak);
    let bonus_tx_id = if bonus > 0 {
        let entry = ledger.append_streak_bonus(txn, wallet, next.current_streak, bonus)?;
        txn.notify(
            wallet,
            NotificationKind::StreakBonus,
            format!(
                "{}-day streak! +{} {} bonus",
                next.current_streak,
                bonus,
                ledger.token_symbol()
            ),
        );
        info!(wallet = %wallet, streak = next.current_streak, bonus, "Streak milestone reached");
        Some(entry.tx_id)
    } else {
        None
    };

    let task_reward_pending = tasks.complete_checkin(txn, wallet);

    debug!(
        wallet = %wallet,
        current_streak = next.current_streak,
        total_checkins = next.total_checkins,
        "Daily check-in recorded"
    );

    Ok(CheckinReceipt {
        current_streak: next.current_streak,
        longest_streak: next.longest_streak,
        total_checkins: next.total_checkins,
        bonus_earned: bonus,
        bonus_tx_id,
        task_reward_pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wallet() -> Wallet {
        Wallet::parse("0x4444444444444444444444444444444444444444").unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_streak_calendar_rules() {
        let s0 = DailyStreak::new(wallet());
        let s1 = advance(&s0, at(1, 23)).unwrap();
        assert_eq!(s1.current_streak, 1);

        // next calendar day, even if less than 24h later
        let s2 = advance(&s1, at(2, 1)).unwrap();
        assert_eq!(s2.current_streak, 2);

        let dup = advance(&s2, at(2, 22)).unwrap_err();
        assert!(matches!(dup, Conflict::AlreadyCheckedInToday { .. }));

        let s3 = advance(&s2, at(5, 12)).unwrap();
        assert_eq!(s3.current_streak, 1);
        assert_eq!(s3.longest_streak, 2);
        assert_eq!(s3.total_checkins, 3);
    }

    #[test]
    fn test_bonus_precedence() {
        assert_eq!(streak_bonus(0), 0);
        assert_eq!(streak_bonus(1), 0);
        assert_eq!(streak_bonus(7), 50);
        assert_eq!(streak_bonus(14), 50);
        assert_eq!(streak_bonus(30), 200);
        assert_eq!(streak_bonus(60), 200);
        assert_eq!(streak_bonus(210), 50);
    }
}
