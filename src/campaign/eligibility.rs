//! Eligibility Evaluator
//!
//! Withdrawal opens once a wallet has `WITHDRAWAL_REFERRAL_THRESHOLD` active
//! referrals (direct referees that also claimed). Evaluation is read-only; only
//! `record_attempt` writes, and it only appends an audit row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::achievements::AchievementEngine;
use super::ledger::RewardLedger;
use super::referral;
use super::state::Txn;
use super::wallet::Wallet;

pub const WITHDRAWAL_REFERRAL_THRESHOLD: u32 = 7;

pub const ATTEMPT_STATUS_CHECKED: &str = "checked";

#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub wallet: Wallet,
    pub eligible: bool,
    pub active_referral_count: u32,
    pub required_count: u32,
    pub remaining_needed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalAttempt {
    pub wallet: Wallet,
    pub active_referral_count: u32,
    pub eligible: bool,
    pub attempted_at: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkAnalysis {
    pub wallet: Wallet,
    pub direct_referrals: u32,
    pub active_referrals: u32,
    pub inactive_referrals: u32,
    pub projected_airdrop: u64,
    pub can_withdraw: bool,
    pub withdrawable_amount: u64,
    pub remaining_needed: u32,
}

pub fn evaluate(txn: &Txn<'_>, wallet: &Wallet) -> EligibilityReport {
    let active = referral::active_referral_count(txn, wallet);
    EligibilityReport {
        wallet: wallet.clone(),
        eligible: active >= WITHDRAWAL_REFERRAL_THRESHOLD,
        active_referral_count: active,
        required_count: WITHDRAWAL_REFERRAL_THRESHOLD,
        remaining_needed: WITHDRAWAL_REFERRAL_THRESHOLD.saturating_sub(active),
    }
}

pub fn record_attempt(txn: &mut Txn<'_>, report: &EligibilityReport) -> WithdrawalAttempt {
    let notes = if report.eligible {
        None
    } else {
        Some(format!(
            "Need {} more active referrals",
            report.remaining_needed
        ))
    };

    let attempt = WithdrawalAttempt {
        wallet: report.wallet.clone(),
        active_referral_count: report.active_referral_count,
        eligible: report.eligible,
        attempted_at: txn.now(),
        status: ATTEMPT_STATUS_CHECKED.to_string(),
        notes,
    };
    debug!(
        wallet = %attempt.wallet,
        eligible = attempt.eligible,
        active_referrals = attempt.active_referral_count,
        "Withdrawal attempt recorded"
    );
    txn.record_withdrawal_attempt(attempt.clone());
    attempt
}

pub fn network_analysis(
    txn: &Txn<'_>,
    wallet: &Wallet,
    ledger: &RewardLedger,
    achievements: &AchievementEngine,
) -> NetworkAnalysis {
    let direct = txn.referees_of(wallet).len() as u32;
    let report = evaluate(txn, wallet);
    let projected = ledger.projected_breakdown(txn, wallet, achievements).total();

    NetworkAnalysis {
        wallet: wallet.clone(),
        direct_referrals: direct,
        active_referrals: report.active_referral_count,
        inactive_referrals: direct.saturating_sub(report.active_referral_count),
        projected_airdrop: projected,
        can_withdraw: report.eligible,
        withdrawable_amount: if report.eligible {
            ledger.balance(txn, wallet).total
        } else {
            0
        },
        remaining_needed: report.remaining_needed,
    }
}
