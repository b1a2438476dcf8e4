//! Referral Graph
//!
//! Every user owns one deterministic referral code. A referee is attached to at
//! most one referrer, the first applied code wins, and `referral_count` only ever
//! grows. The referrer turns `active` at two referrals and stays active.
//!
//! An *active* referral is a referee that has also claimed its genesis airdrop;
//! withdrawal eligibility counts only those.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::achievements::AchievementEngine;
use super::ledger::REFERRAL_BONUS_PER_REFERRAL;
use super::notifications::NotificationKind;
use super::state::Txn;
use super::wallet::Wallet;
use crate::error::CampaignError;

pub const REFERRAL_CODE_PREFIX: &str = "REF-";
const REFERRAL_CODE_HEX_LEN: usize = 8;

/// Referral count at which a referrer becomes active
pub const ACTIVE_REFERRER_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub wallet: Wallet,
    pub referral_code: String,
    pub referral_count: u32,
    pub link_clicks: u32,
    pub link_conversions: u32,
    pub referrer: Option<Wallet>,
    pub active: bool,
    pub origin: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    pub fn new(
        wallet: Wallet,
        referral_code: String,
        origin: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet,
            referral_code,
            referral_count: 0,
            link_clicks: 0,
            link_conversions: 0,
            referrer: None,
            active: false,
            origin,
            created_at: now,
            last_active: now,
        }
    }

    /// Clicks that converted into referrals, as a percentage with one decimal
    pub fn conversion_rate(&self) -> f64 {
        if self.link_clicks == 0 {
            return 0.0;
        }
        let rate = self.link_conversions as f64 / self.link_clicks as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub referrer: Wallet,
    pub referee: Wallet,
    pub code_used: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReferralOutcome {
    Applied { referrer: Wallet, referral_count: u32 },
    SelfReferral,
    CodeInvalid,
    AlreadyReferred { referrer: Wallet },
}

/// Trim and uppercase a user-supplied code
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Deterministic code for a wallet; the digest prefix grows only on collision
pub fn derive_referral_code(wallet: &Wallet, is_taken: impl Fn(&str) -> bool) -> String {
    let digest = hex::encode_upper(Sha256::digest(wallet.as_str().as_bytes()));
    let mut len = REFERRAL_CODE_HEX_LEN;
    loop {
        let code = format!("{}{}", REFERRAL_CODE_PREFIX, &digest[..len]);
        if !is_taken(&code) || len == digest.len() {
            return code;
        }
        len += 2;
    }
}

/// Create the user row for a wallet seen for the first time
pub fn register_user(txn: &mut Txn<'_>, wallet: &Wallet, origin: Option<&str>) -> User {
    let code = derive_referral_code(wallet, |code| txn.wallet_for_code(code).is_some());
    let user = User::new(wallet.clone(), code, origin.map(str::to_string), txn.now());
    debug!(wallet = %wallet, referral_code = %user.referral_code, "Registered new user");
    txn.put_user(user.clone());
    user
}

/// Attach `referee` to the owner of `code`
pub fn apply_referral(
    txn: &mut Txn<'_>,
    code: &str,
    referee: &Wallet,
    achievements: &AchievementEngine,
) -> ReferralOutcome {
    let code = normalize_code(code);

    let referrer_wallet = match txn.wallet_for_code(&code) {
        Some(wallet) => wallet.clone(),
        None => {
            debug!(wallet = %referee, code = %code, "Referral code does not resolve");
            return ReferralOutcome::CodeInvalid;
        }
    };

    if &referrer_wallet == referee {
        return ReferralOutcome::SelfReferral;
    }

    let Some(mut referee_user) = txn.user(referee).cloned() else {
        return ReferralOutcome::CodeInvalid;
    };

    if let Some(existing) = referee_user.referrer.clone() {
        return ReferralOutcome::AlreadyReferred { referrer: existing };
    }
    if let Some(edge) = txn.referral_of(referee) {
        return ReferralOutcome::AlreadyReferred {
            referrer: edge.referrer.clone(),
        };
    }

    let Some(mut referrer) = txn.user(&referrer_wallet).cloned() else {
        return ReferralOutcome::CodeInvalid;
    };

    referrer.referral_count += 1;
    referrer.link_conversions += 1;
    if referrer.referral_count >= ACTIVE_REFERRER_THRESHOLD {
        referrer.active = true;
    }
    let referral_count = referrer.referral_count;
    txn.put_user(referrer);

    referee_user.referrer = Some(referrer_wallet.clone());
    txn.put_user(referee_user);

    txn.record_referral(Referral {
        referrer: referrer_wallet.clone(),
        referee: referee.clone(),
        code_used: code,
        created_at: txn.now(),
    });

    achievements.evaluate(txn, &referrer_wallet);

    txn.notify(
        &referrer_wallet,
        NotificationKind::Referral,
        format!(
            "New referral! {} claimed using your code",
            referee.display_short()
        ),
    );

    info!(
        referrer = %referrer_wallet,
        referee = %referee,
        referral_count,
        "Referral applied"
    );

    ReferralOutcome::Applied {
        referrer: referrer_wallet,
        referral_count,
    }
}

/// Direct referees that hold a genesis claim
pub fn active_referral_count(txn: &Txn<'_>, wallet: &Wallet) -> u32 {
    txn.referees_of(wallet)
        .into_iter()
        .filter(|referee| txn.genesis_entry(referee).is_some())
        .count() as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
    pub wallet: Wallet,
    pub referral_code: String,
    pub referral_count: u32,
    pub active_referrals: u32,
    pub link_clicks: u32,
    pub link_conversions: u32,
    pub conversion_rate: f64,
    pub total_referral_bonus: u64,
    pub active: bool,
}

pub fn stats(txn: &Txn<'_>, wallet: &Wallet) -> Option<ReferralStats> {
    let user = txn.user(wallet)?;
    Some(ReferralStats {
        wallet: wallet.clone(),
        referral_code: user.referral_code.clone(),
        referral_count: user.referral_count,
        active_referrals: active_referral_count(txn, wallet),
        link_clicks: user.link_clicks,
        link_conversions: user.link_conversions,
        conversion_rate: user.conversion_rate(),
        total_referral_bonus: user.referral_count as u64 * REFERRAL_BONUS_PER_REFERRAL,
        active: user.active,
    })
}

/// Record a click on a referral link; returns the owner's new click count
pub fn track_link_click(txn: &mut Txn<'_>, code: &str) -> Result<u32, CampaignError> {
    let code = normalize_code(code);
    let wallet = txn
        .wallet_for_code(&code)
        .cloned()
        .ok_or_else(|| CampaignError::not_found("referral code", code.clone()))?;

    let mut user = txn
        .user(&wallet)
        .cloned()
        .ok_or_else(|| CampaignError::not_found("wallet", wallet.as_str()))?;
    user.link_clicks += 1;
    let clicks = user.link_clicks;
    txn.put_user(user);

    debug!(referral_code = %code, link_clicks = clicks, "Referral link clicked");
    Ok(clicks)
}
