//! Campaign tables and staged transactions
//!
//! ```text
//!   CampaignState (committed)          Txn (one operation)
//!   ┌──────────────────────────┐       ┌───────────────────────────┐
//!   │ users / codes            │◄─read─│ staged Changeset          │
//!   │ referrals / referees     │       │   upserts shadow base     │
//!   │ ledger / tx_ids          │       │   appends extend base     │
//!   │ achievements / tasks     │       └─────────────┬─────────────┘
//!   │ verifications / streaks  │                     │ into_changes()
//!   │ origins / notifications  │◄──────apply─────────┘ (after persistence)
//!   └──────────────────────────┘
//! ```
//!
//! Components never write to `CampaignState` directly. They stage changes on a
//! `Txn`; the engine persists the resulting `Changeset` and applies it in one
//! step, so an operation either lands completely or not at all.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use super::achievements::AchievementUnlock;
use super::eligibility::WithdrawalAttempt;
use super::ledger::{LedgerEntry, Provenance};
use super::notifications::{Notification, NotificationKind};
use super::referral::{Referral, User};
use super::streak::DailyStreak;
use super::sybil::OriginRestriction;
use super::tasks::{TaskVerification, UserTask};
use super::wallet::Wallet;

pub type TaskKey = (Wallet, String);

/// Committed campaign tables
#[derive(Debug, Default, Clone)]
pub struct CampaignState {
    pub(crate) users: HashMap<Wallet, User>,
    pub(crate) codes: HashMap<String, Wallet>,
    pub(crate) referrals: HashMap<Wallet, Referral>,
    pub(crate) referees: HashMap<Wallet, Vec<Wallet>>,
    pub(crate) ledger: Vec<LedgerEntry>,
    pub(crate) ledger_by_wallet: HashMap<Wallet, Vec<usize>>,
    pub(crate) tx_ids: HashSet<String>,
    pub(crate) achievements: HashMap<Wallet, Vec<AchievementUnlock>>,
    pub(crate) user_tasks: HashMap<TaskKey, UserTask>,
    pub(crate) verifications: BTreeMap<u64, TaskVerification>,
    pub(crate) streaks: HashMap<Wallet, DailyStreak>,
    pub(crate) origins: HashMap<String, OriginRestriction>,
    pub(crate) notifications: HashMap<Wallet, Vec<Notification>>,
    pub(crate) withdrawal_attempts: Vec<WithdrawalAttempt>,
}

impl CampaignState {
    /// First staged referral code already owned by a different wallet
    pub fn code_collision(&self, changes: &Changeset) -> Option<String> {
        changes.users.iter().find_map(|(wallet, user)| {
            self.codes
                .get(&user.referral_code)
                .filter(|owner| *owner != wallet)
                .map(|_| user.referral_code.clone())
        })
    }

    pub fn apply(&mut self, changes: Changeset) {
        for (wallet, user) in changes.users {
            self.codes
                .entry(user.referral_code.clone())
                .or_insert_with(|| wallet.clone());
            self.users.insert(wallet, user);
        }

        for referral in changes.referrals {
            self.referees
                .entry(referral.referrer.clone())
                .or_default()
                .push(referral.referee.clone());
            self.referrals.insert(referral.referee.clone(), referral);
        }

        for entry in changes.ledger {
            self.push_entry(entry);
        }

        for unlock in changes.achievements {
            self.achievements
                .entry(unlock.wallet.clone())
                .or_default()
                .push(unlock);
        }

        self.user_tasks.extend(changes.user_tasks);
        self.verifications.extend(changes.verifications);
        self.streaks.extend(changes.streaks);
        self.origins.extend(changes.origins);

        for notification in changes.notifications {
            self.notifications
                .entry(notification.wallet.clone())
                .or_default()
                .push(notification);
        }

        for (wallet, id) in changes.notification_reads {
            if let Some(feed) = self.notifications.get_mut(&wallet) {
                if let Some(n) = feed.iter_mut().find(|n| n.id == id) {
                    n.read = true;
                }
            }
        }

        self.withdrawal_attempts.extend(changes.withdrawal_attempts);
    }

    fn push_entry(&mut self, entry: LedgerEntry) {
        self.tx_ids.insert(entry.tx_id.clone());
        self.ledger_by_wallet
            .entry(entry.wallet.clone())
            .or_default()
            .push(self.ledger.len());
        self.ledger.push(entry);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn genesis_count(&self) -> usize {
        self.ledger
            .iter()
            .filter(|e| e.provenance == Provenance::Genesis)
            .count()
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn verifications(&self) -> impl Iterator<Item = &TaskVerification> {
        self.verifications.values()
    }

    /// Highest ids in use, for seeding an `IdAllocator` after hydration
    pub fn max_ids(&self) -> (u64, u64) {
        let ledger = self.ledger.iter().map(|e| e.id).max().unwrap_or(0);
        let verification = self.verifications.keys().next_back().copied().unwrap_or(0);
        (ledger, verification)
    }
}

/// Changes staged by one operation
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub users: HashMap<Wallet, User>,
    pub referrals: Vec<Referral>,
    pub ledger: Vec<LedgerEntry>,
    pub achievements: Vec<AchievementUnlock>,
    pub user_tasks: HashMap<TaskKey, UserTask>,
    pub verifications: BTreeMap<u64, TaskVerification>,
    pub streaks: HashMap<Wallet, DailyStreak>,
    pub origins: HashMap<String, OriginRestriction>,
    pub notifications: Vec<Notification>,
    pub notification_reads: Vec<(Wallet, String)>,
    pub withdrawal_attempts: Vec<WithdrawalAttempt>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.referrals.is_empty()
            && self.ledger.is_empty()
            && self.achievements.is_empty()
            && self.user_tasks.is_empty()
            && self.verifications.is_empty()
            && self.streaks.is_empty()
            && self.origins.is_empty()
            && self.notifications.is_empty()
            && self.notification_reads.is_empty()
            && self.withdrawal_attempts.is_empty()
    }
}

/// Monotonic ids for ledger entries and verifications
#[derive(Debug, Default)]
pub struct IdAllocator {
    ledger: AtomicU64,
    verification: AtomicU64,
}

impl IdAllocator {
    pub fn reset(&self, ledger_max: u64, verification_max: u64) {
        self.ledger.store(ledger_max, Ordering::SeqCst);
        self.verification.store(verification_max, Ordering::SeqCst);
    }

    pub fn next_ledger_id(&self) -> u64 {
        self.ledger.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_verification_id(&self) -> u64 {
        self.verification.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Staged view over committed state for a single operation
pub struct Txn<'a> {
    base: &'a CampaignState,
    ids: &'a IdAllocator,
    now: DateTime<Utc>,
    changes: Changeset,
}

impl<'a> Txn<'a> {
    pub fn new(base: &'a CampaignState, ids: &'a IdAllocator, now: DateTime<Utc>) -> Self {
        Self {
            base,
            ids,
            now,
            changes: Changeset::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn ids(&self) -> &IdAllocator {
        self.ids
    }

    pub fn base(&self) -> &CampaignState {
        self.base
    }

    pub fn into_changes(self) -> Changeset {
        self.changes
    }

    // Users

    pub fn user(&self, wallet: &Wallet) -> Option<&User> {
        self.changes
            .users
            .get(wallet)
            .or_else(|| self.base.users.get(wallet))
    }

    pub fn put_user(&mut self, user: User) {
        self.changes.users.insert(user.wallet.clone(), user);
    }

    pub fn wallet_for_code(&self, code: &str) -> Option<&Wallet> {
        self.base.codes.get(code).or_else(|| {
            self.changes
                .users
                .values()
                .find(|u| u.referral_code == code)
                .map(|u| &u.wallet)
        })
    }

    // Referrals

    pub fn referral_of(&self, referee: &Wallet) -> Option<&Referral> {
        self.base.referrals.get(referee).or_else(|| {
            self.changes
                .referrals
                .iter()
                .find(|r| &r.referee == referee)
        })
    }

    pub fn referees_of(&self, referrer: &Wallet) -> Vec<&Wallet> {
        let mut referees: Vec<&Wallet> = self
            .base
            .referees
            .get(referrer)
            .map(|list| list.iter().collect())
            .unwrap_or_default();
        referees.extend(
            self.changes
                .referrals
                .iter()
                .filter(|r| &r.referrer == referrer)
                .map(|r| &r.referee),
        );
        referees
    }

    pub fn record_referral(&mut self, referral: Referral) {
        self.changes.referrals.push(referral);
    }

    // Ledger

    pub fn ledger_entries(&self, wallet: &Wallet) -> impl Iterator<Item = &LedgerEntry> + '_ {
        let committed = self
            .base
            .ledger_by_wallet
            .get(wallet)
            .into_iter()
            .flatten()
            .map(|&idx| &self.base.ledger[idx]);
        let wallet = wallet.clone();
        committed.chain(
            self.changes
                .ledger
                .iter()
                .filter(move |e| e.wallet == wallet),
        )
    }

    pub fn genesis_entry(&self, wallet: &Wallet) -> Option<&LedgerEntry> {
        self.ledger_entries(wallet)
            .find(|e| e.provenance == Provenance::Genesis)
    }

    pub fn tx_id_exists(&self, tx_id: &str) -> bool {
        self.base.tx_ids.contains(tx_id) || self.changes.ledger.iter().any(|e| e.tx_id == tx_id)
    }

    pub fn append_entry(&mut self, entry: LedgerEntry) {
        self.changes.ledger.push(entry);
    }

    // Achievements

    pub fn unlocks(&self, wallet: &Wallet) -> Vec<&AchievementUnlock> {
        let mut unlocks: Vec<&AchievementUnlock> = self
            .base
            .achievements
            .get(wallet)
            .map(|list| list.iter().collect())
            .unwrap_or_default();
        unlocks.extend(self.changes.achievements.iter().filter(|a| &a.wallet == wallet));
        unlocks
    }

    pub fn has_achievement(&self, wallet: &Wallet, achievement_id: &str) -> bool {
        self.unlocks(wallet)
            .iter()
            .any(|a| a.achievement_id == achievement_id)
    }

    pub fn record_unlock(&mut self, unlock: AchievementUnlock) {
        self.changes.achievements.push(unlock);
    }

    // Tasks

    pub fn user_task(&self, wallet: &Wallet, task_id: &str) -> Option<&UserTask> {
        let key = (wallet.clone(), task_id.to_string());
        self.changes
            .user_tasks
            .get(&key)
            .or_else(|| self.base.user_tasks.get(&key))
    }

    pub fn put_user_task(&mut self, task: UserTask) {
        self.changes
            .user_tasks
            .insert((task.wallet.clone(), task.task_id.clone()), task);
    }

    pub fn verification(&self, id: u64) -> Option<&TaskVerification> {
        self.changes
            .verifications
            .get(&id)
            .or_else(|| self.base.verifications.get(&id))
    }

    /// Most recent verification for a task instance
    pub fn latest_verification(&self, wallet: &Wallet, task_id: &str) -> Option<&TaskVerification> {
        self.base
            .verifications
            .values()
            .chain(self.changes.verifications.values())
            .filter(|v| &v.wallet == wallet && v.task_id == task_id)
            .max_by_key(|v| v.id)
    }

    pub fn put_verification(&mut self, verification: TaskVerification) {
        self.changes
            .verifications
            .insert(verification.id, verification);
    }

    // Streaks

    pub fn streak(&self, wallet: &Wallet) -> Option<&DailyStreak> {
        self.changes
            .streaks
            .get(wallet)
            .or_else(|| self.base.streaks.get(wallet))
    }

    pub fn put_streak(&mut self, streak: DailyStreak) {
        self.changes.streaks.insert(streak.wallet.clone(), streak);
    }

    // Origins

    pub fn origin(&self, origin: &str) -> Option<&OriginRestriction> {
        self.changes
            .origins
            .get(origin)
            .or_else(|| self.base.origins.get(origin))
    }

    pub fn put_origin(&mut self, restriction: OriginRestriction) {
        self.changes
            .origins
            .insert(restriction.origin.clone(), restriction);
    }

    // Notifications

    pub fn notify(&mut self, wallet: &Wallet, kind: NotificationKind, message: impl Into<String>) {
        self.changes.notifications.push(Notification {
            id: format!("NOTIF_{}", Uuid::new_v4().simple()),
            wallet: wallet.clone(),
            kind,
            message: message.into(),
            timestamp: self.now,
            read: false,
        });
    }

    pub fn notifications_of(&self, wallet: &Wallet) -> Vec<Notification> {
        let mut feed: Vec<Notification> = self
            .base
            .notifications
            .get(wallet)
            .cloned()
            .unwrap_or_default();
        feed.extend(
            self.changes
                .notifications
                .iter()
                .filter(|n| &n.wallet == wallet)
                .cloned(),
        );
        for (read_wallet, id) in &self.changes.notification_reads {
            if read_wallet == wallet {
                if let Some(n) = feed.iter_mut().find(|n| &n.id == id) {
                    n.read = true;
                }
            }
        }
        feed
    }

    pub fn mark_read(&mut self, wallet: &Wallet, notification_id: &str) {
        self.changes
            .notification_reads
            .push((wallet.clone(), notification_id.to_string()));
    }

    // Withdrawals

    pub fn record_withdrawal_attempt(&mut self, attempt: WithdrawalAttempt) {
        self.changes.withdrawal_attempts.push(attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(address: &str, code: &str) -> User {
        let wallet = Wallet::parse(address).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        User::new(wallet, code.to_string(), None, now)
    }

    fn registration(user: User) -> Changeset {
        let mut changes = Changeset::default();
        changes.users.insert(user.wallet.clone(), user);
        changes
    }

    #[test]
    fn test_code_owned_by_another_wallet_collides() {
        let mut state = CampaignState::default();
        let first = user("0x1111111111111111111111111111111111111111", "REF-FDE7ABFB");
        assert_eq!(state.code_collision(&registration(first.clone())), None);
        state.apply(registration(first.clone()));

        let second = user("0x2222222222222222222222222222222222222222", "REF-FDE7ABFB");
        assert_eq!(
            state.code_collision(&registration(second)),
            Some("REF-FDE7ABFB".to_string())
        );

        // the owner re-saving its own row is not a collision
        let mut updated = first;
        updated.link_clicks = 3;
        assert_eq!(state.code_collision(&registration(updated)), None);
    }
}
