//! Campaign Engine - Main Orchestrator
//!
//! Owns the campaign tables and runs every inbound action as one staged
//! transaction:
//!
//! ```text
//!   lock keys (sorted)  ──►  Txn over read snapshot  ──►  component rules
//!        │                                                   │
//!        │                    Changeset ◄────────────────────┘
//!        │                        │
//!        │          persist (one SQL transaction, optional)
//!        │                        │
//!        │          apply to CampaignState (write lock)
//!        │                        │
//!        └── released ◄── deliver notifications to sink
//! ```
//!
//! Lock keys are `wallet:<address>` and `origin:<id>`. An operation touching two
//! wallets (a claim with a referral) holds both. Persistence runs before the
//! in-memory apply, so a failed write leaves memory untouched.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use super::achievements::{AchievementEngine, AchievementProgress};
use super::eligibility::{self, EligibilityReport, NetworkAnalysis};
use super::leaderboard::{self, Leaderboard};
use super::ledger::{AmountBreakdown, Balance, GenesisOutcome, LedgerEntry, RewardLedger};
use super::notifications::{LogSink, NotificationFeed, NotificationKind, NotificationSink};
use super::referral::{self, ReferralStats};
use super::state::{CampaignState, Changeset, IdAllocator, Txn};
use super::streak::{self, CheckinReceipt};
use super::sybil::{AntiSybilGuard, SybilDecision, SybilLimits};
use super::tasks::{
    CompletionReceipt, PendingVerification, ReviewDecision, RewardReceipt, StartReceipt,
    TaskBoard, TaskLifecycle, TaskVerification,
};
use super::wallet::{self, Wallet};
use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::database::DatabasePool;
use crate::error::{CampaignError, Conflict, PolicyViolation};

const MAX_RELOCK_ATTEMPTS: usize = 3;

fn wallet_key(wallet: &Wallet) -> String {
    format!("wallet:{}", wallet)
}

fn origin_key(origin: &str) -> String {
    format!("origin:{}", origin)
}

/// Per-key async mutexes
#[derive(Default)]
struct KeyLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    async fn acquire(&self, mut keys: Vec<String>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self
                .inner
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Result of an operation that may commit state and still be refused
enum Gate<T> {
    Proceed(T),
    Denied(PolicyViolation),
    Relock,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimSnapshot {
    pub amount: u64,
    pub breakdown: Option<AmountBreakdown>,
    pub referral_count: u32,
    pub referrer: Option<Wallet>,
    pub tx_id: String,
    pub claimed_at: chrono::DateTime<chrono::Utc>,
}

impl From<&LedgerEntry> for ClaimSnapshot {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            amount: entry.amount,
            breakdown: entry.breakdown,
            referral_count: entry.referral_count,
            referrer: entry.referrer.clone(),
            tx_id: entry.tx_id.clone(),
            claimed_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletCheck {
    pub wallet: Wallet,
    pub eligible: bool,
    pub already_claimed: bool,
    pub claim_data: Option<ClaimSnapshot>,
    pub referral_code: Option<String>,
    pub user_exists: bool,
    pub projected: AmountBreakdown,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStats {
    pub total_users: usize,
    pub total_claims: usize,
    pub ledger_entries: usize,
    pub pending_verifications: usize,
}

pub struct CampaignEngine {
    catalog: Arc<Catalog>,
    state: RwLock<CampaignState>,
    locks: KeyLocks,
    ids: IdAllocator,
    sybil: AntiSybilGuard,
    achievements: AchievementEngine,
    tasks: TaskLifecycle,
    ledger: RewardLedger,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    db: Option<Arc<DatabasePool>>,
}

impl CampaignEngine {
    pub fn new(catalog: Arc<Catalog>, limits: SybilLimits) -> Self {
        Self {
            sybil: AntiSybilGuard::new(limits),
            achievements: AchievementEngine::new(catalog.clone()),
            tasks: TaskLifecycle::new(catalog.clone()),
            ledger: RewardLedger::new(catalog.token_symbol()),
            catalog,
            state: RwLock::new(CampaignState::default()),
            locks: KeyLocks::default(),
            ids: IdAllocator::default(),
            sink: Arc::new(LogSink),
            clock: Arc::new(SystemClock),
            db: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sybil_limits(&self) -> SybilLimits {
        self.sybil.limits()
    }

    /// Load committed state from the database, replacing the in-memory tables
    pub async fn hydrate(&self) -> Result<usize, CampaignError> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let loaded = db.load_state().await?;
        let (ledger_max, verification_max) = loaded.max_ids();
        self.ids.reset(ledger_max, verification_max);

        let users = loaded.user_count();
        *self.state.write().await = loaded;
        info!(users, "Campaign state loaded from database");
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Transaction plumbing
    // ------------------------------------------------------------------

    async fn commit(&self, changes: Changeset) -> Result<(), CampaignError> {
        if changes.is_empty() {
            return Ok(());
        }

        if let Some(db) = &self.db {
            db.commit(&changes).await?;
        }

        let delivered = changes.notifications.clone();
        {
            let mut state = self.state.write().await;
            // Registrations under different wallet locks can derive the same
            // code; without a database the unique check happens here.
            if let Some(code) = state.code_collision(&changes) {
                return Err(CampaignError::Integrity(code));
            }
            state.apply(changes);
        }

        for notification in &delivered {
            self.sink.publish(notification);
        }
        Ok(())
    }

    /// Run `op` under the given keys and commit what it staged
    ///
    /// An identifier collision, whether detected in memory or by the database,
    /// reruns `op` once with fresh randomness before surfacing as a conflict.
    async fn mutate<T, F>(&self, keys: Vec<String>, op: F) -> Result<T, CampaignError>
    where
        F: Fn(&mut Txn<'_>) -> Result<T, CampaignError> + Send,
        T: Send,
    {
        let _guards = self.locks.acquire(keys).await;

        let mut retried = false;
        loop {
            let (result, changes) = {
                let state = self.state.read().await;
                let mut txn = Txn::new(&state, &self.ids, self.clock.now());
                let result = op(&mut txn);
                (result, txn.into_changes())
            };

            let outcome = match result {
                Ok(value) => self.commit(changes).await.map(|_| value),
                Err(e) => Err(e),
            };

            match outcome {
                Err(CampaignError::Integrity(identifier)) if !retried => {
                    warn!(identifier = %identifier, "Identifier collision, retrying");
                    retried = true;
                }
                Err(CampaignError::Integrity(identifier)) => {
                    return Err(Conflict::DuplicateIdentifier { identifier }.into());
                }
                other => return other,
            }
        }
    }

    async fn read<T>(&self, op: impl FnOnce(&Txn<'_>) -> T) -> T {
        let state = self.state.read().await;
        let txn = Txn::new(&state, &self.ids, self.clock.now());
        op(&txn)
    }

    fn require_user(txn: &Txn<'_>, wallet: &Wallet) -> Result<(), CampaignError> {
        if txn.user(wallet).is_none() {
            return Err(CampaignError::not_found("wallet", wallet.as_str()));
        }
        Ok(())
    }

    async fn resolve_code(&self, code: &str) -> Option<Wallet> {
        self.state.read().await.codes.get(code).cloned()
    }

    // ------------------------------------------------------------------
    // Airdrop
    // ------------------------------------------------------------------

    /// Look up (and on first sight register) a wallet
    pub async fn check_wallet(
        &self,
        address: &str,
        origin: Option<&str>,
    ) -> Result<WalletCheck, CampaignError> {
        let wallet = wallet::validate(address)?;

        let mut keys = vec![wallet_key(&wallet)];
        keys.extend(origin.map(origin_key));

        self.mutate(keys, |txn| {
            let projected = self
                .ledger
                .projected_breakdown(txn, &wallet, &self.achievements);

            if let Some(entry) = txn.genesis_entry(&wallet) {
                return Ok(WalletCheck {
                    wallet: wallet.clone(),
                    eligible: false,
                    already_claimed: true,
                    claim_data: Some(ClaimSnapshot::from(entry)),
                    referral_code: txn.user(&wallet).map(|u| u.referral_code.clone()),
                    user_exists: true,
                    projected,
                    reasons: vec!["Airdrop already claimed".to_string()],
                });
            }

            let existing = txn.user(&wallet).cloned();

            if let Some(origin) = origin {
                let denial = match self
                    .sybil
                    .check_and_register(txn, origin, &wallet, existing.is_none())
                {
                    SybilDecision::Allow => None,
                    SybilDecision::Banned { until } => {
                        Some(PolicyViolation::OriginBanned { until })
                    }
                    SybilDecision::LimitReached { until } => {
                        Some(PolicyViolation::OriginLimitReached {
                            limit: self.sybil.limits().max_wallets_per_origin,
                            until,
                        })
                    }
                };
                if let Some(violation) = denial {
                    return Ok(WalletCheck {
                        wallet: wallet.clone(),
                        eligible: false,
                        already_claimed: false,
                        claim_data: None,
                        referral_code: existing.as_ref().map(|u| u.referral_code.clone()),
                        user_exists: existing.is_some(),
                        projected,
                        reasons: vec![violation.to_string()],
                    });
                }
            }

            let user = match existing {
                Some(mut user) => {
                    user.last_active = txn.now();
                    txn.put_user(user.clone());
                    user
                }
                None => {
                    let user = referral::register_user(txn, &wallet, origin);
                    txn.notify(
                        &wallet,
                        NotificationKind::Welcome,
                        format!(
                            "Welcome! Your referral code is {}. Share it to earn bonus tokens.",
                            user.referral_code
                        ),
                    );
                    user
                }
            };

            Ok(WalletCheck {
                wallet: wallet.clone(),
                eligible: true,
                already_claimed: false,
                claim_data: None,
                referral_code: Some(user.referral_code),
                user_exists: true,
                projected,
                reasons: Vec::new(),
            })
        })
        .await
    }

    /// Issue the genesis airdrop; replays return the existing claim
    pub async fn claim_airdrop(
        &self,
        address: &str,
        referral_code: Option<&str>,
        origin: Option<&str>,
    ) -> Result<GenesisOutcome, CampaignError> {
        let wallet = wallet::validate(address)?;
        let code = referral_code
            .map(referral::normalize_code)
            .filter(|c| !c.is_empty());

        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let referrer = match &code {
                Some(code) => self.resolve_code(code).await,
                None => None,
            };

            let mut keys = vec![wallet_key(&wallet)];
            keys.extend(referrer.as_ref().map(wallet_key));
            keys.extend(origin.map(origin_key));

            let gate = self
                .mutate(keys, |txn| {
                    if txn.genesis_entry(&wallet).is_none() {
                        if let Some(code) = &code {
                            if txn.wallet_for_code(code) != referrer.as_ref() {
                                return Ok(Gate::Relock);
                            }
                        }

                        let is_new = txn.user(&wallet).is_none();
                        if let Some(origin) = origin {
                            match self.sybil.check_and_register(txn, origin, &wallet, is_new) {
                                SybilDecision::Allow => {}
                                SybilDecision::Banned { until } => {
                                    return Ok(Gate::Denied(PolicyViolation::OriginBanned {
                                        until,
                                    }))
                                }
                                SybilDecision::LimitReached { until } => {
                                    return Ok(Gate::Denied(
                                        PolicyViolation::OriginLimitReached {
                                            limit: self.sybil.limits().max_wallets_per_origin,
                                            until,
                                        },
                                    ))
                                }
                            }
                        }
                        if is_new {
                            referral::register_user(txn, &wallet, origin);
                        }
                    }

                    self.ledger
                        .issue_genesis_claim(txn, &wallet, code.as_deref(), &self.achievements)
                        .map(Gate::Proceed)
                })
                .await?;

            match gate {
                Gate::Proceed(outcome) => return Ok(outcome),
                Gate::Denied(violation) => return Err(violation.into()),
                Gate::Relock => {
                    debug!(wallet = %wallet, "Referral code owner appeared, relocking");
                }
            }
        }

        Err(Conflict::DuplicateIdentifier {
            identifier: code.unwrap_or_default(),
        }
        .into())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn start_task(
        &self,
        address: &str,
        task_id: &str,
    ) -> Result<StartReceipt, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            self.tasks.start(txn, &wallet, task_id)
        })
        .await
    }

    pub async fn complete_task(
        &self,
        address: &str,
        task_id: &str,
    ) -> Result<CompletionReceipt, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            self.tasks.complete(txn, &wallet, task_id)
        })
        .await
    }

    pub async fn submit_verification(
        &self,
        address: &str,
        task_id: &str,
        verification_kind: Option<&str>,
        proof: Vec<u8>,
    ) -> Result<TaskVerification, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            self.tasks
                .submit_verification(txn, &wallet, task_id, verification_kind, proof.clone())
        })
        .await
    }

    pub async fn claim_task_reward(
        &self,
        address: &str,
        task_id: &str,
    ) -> Result<RewardReceipt, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            self.tasks.claim_reward(txn, &wallet, task_id, &self.ledger)
        })
        .await
    }

    pub async fn review_verification(
        &self,
        verification_id: u64,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<TaskVerification, CampaignError> {
        let owner = self
            .state
            .read()
            .await
            .verifications
            .get(&verification_id)
            .map(|v| v.wallet.clone())
            .ok_or_else(|| {
                CampaignError::not_found("verification", verification_id.to_string())
            })?;

        self.mutate(vec![wallet_key(&owner)], |txn| {
            self.tasks
                .review(txn, verification_id, decision, reviewer, notes.clone())
        })
        .await
    }

    pub async fn daily_checkin(&self, address: &str) -> Result<CheckinReceipt, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            streak::checkin(txn, &wallet, &self.tasks, &self.ledger)
        })
        .await
    }

    pub async fn task_board(&self, address: &str) -> Result<TaskBoard, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            Self::require_user(txn, &wallet)?;
            Ok(self.tasks.board(txn, &wallet))
        })
        .await
    }

    pub async fn pending_verifications(&self) -> Vec<PendingVerification> {
        self.read(|txn| self.tasks.pending_verifications(txn)).await
    }

    // ------------------------------------------------------------------
    // Eligibility and balances
    // ------------------------------------------------------------------

    pub async fn check_withdrawal_eligibility(
        &self,
        address: &str,
    ) -> Result<EligibilityReport, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            Self::require_user(txn, &wallet)?;
            Ok(eligibility::evaluate(txn, &wallet))
        })
        .await
    }

    /// Evaluate eligibility and append a withdrawal audit row
    pub async fn simulate_withdrawal(
        &self,
        address: &str,
    ) -> Result<EligibilityReport, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            Self::require_user(txn, &wallet)?;
            let report = eligibility::evaluate(txn, &wallet);
            eligibility::record_attempt(txn, &report);
            Ok(report)
        })
        .await
    }

    pub async fn total_balance(&self, address: &str) -> Result<Balance, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            Self::require_user(txn, &wallet)?;
            Ok(self.ledger.balance(txn, &wallet))
        })
        .await
    }

    pub async fn referral_stats(&self, address: &str) -> Result<ReferralStats, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            referral::stats(txn, &wallet)
                .ok_or_else(|| CampaignError::not_found("wallet", wallet.as_str()))
        })
        .await
    }

    pub async fn network_analysis(&self, address: &str) -> Result<NetworkAnalysis, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            Self::require_user(txn, &wallet)?;
            Ok(eligibility::network_analysis(
                txn,
                &wallet,
                &self.ledger,
                &self.achievements,
            ))
        })
        .await
    }

    pub async fn achievements(&self, address: &str) -> Result<AchievementProgress, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.read(|txn| {
            Self::require_user(txn, &wallet)?;
            Ok(self.achievements.progress(txn, &wallet))
        })
        .await
    }

    pub async fn leaderboard(
        &self,
        limit: usize,
        address: Option<&str>,
    ) -> Result<Leaderboard, CampaignError> {
        let wallet = address.map(wallet::validate).transpose()?;
        Ok(self
            .read(|txn| {
                leaderboard::build(txn, limit, wallet.as_ref(), &self.ledger, &self.achievements)
            })
            .await)
    }

    pub async fn stats(&self) -> CampaignStats {
        let state = self.state.read().await;
        CampaignStats {
            total_users: state.user_count(),
            total_claims: state.genesis_count(),
            ledger_entries: state.ledger().len(),
            pending_verifications: state
                .verifications()
                .filter(|v| v.status == super::tasks::VerificationStatus::Pending)
                .count(),
        }
    }

    // ------------------------------------------------------------------
    // Referral links and notifications
    // ------------------------------------------------------------------

    pub async fn track_link_click(&self, code: &str) -> Result<u32, CampaignError> {
        let code = referral::normalize_code(code);
        let owner = self
            .resolve_code(&code)
            .await
            .ok_or_else(|| CampaignError::not_found("referral code", code.clone()))?;

        self.mutate(vec![wallet_key(&owner)], |txn| {
            referral::track_link_click(txn, &code)
        })
        .await
    }

    pub async fn notifications(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<NotificationFeed, CampaignError> {
        let wallet = wallet::validate(address)?;
        Ok(self
            .read(|txn| NotificationFeed::from_notifications(txn.notifications_of(&wallet), limit))
            .await)
    }

    /// Mark one of the wallet's notifications read; returns the remaining unread count
    pub async fn mark_notification_read(
        &self,
        address: &str,
        notification_id: &str,
    ) -> Result<usize, CampaignError> {
        let wallet = wallet::validate(address)?;
        self.mutate(vec![wallet_key(&wallet)], |txn| {
            let feed = txn.notifications_of(&wallet);
            let target = feed
                .iter()
                .find(|n| n.id == notification_id)
                .ok_or_else(|| CampaignError::not_found("notification", notification_id))?;

            let unread = feed.iter().filter(|n| !n.read).count();
            if target.read {
                return Ok(unread);
            }
            txn.mark_read(&wallet, notification_id);
            Ok(unread - 1)
        })
        .await
    }
}
