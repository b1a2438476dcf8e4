//! Task Lifecycle
//!
//! ```text
//!            start             submit_verification         review(approved)
//!   (none) ───────► pending ───────────────────► pending_verification ─────────┐
//!                     │                              ▲        │ review(rejected)│
//!                     │ complete (no verification)   └────────┘ resubmit        │
//!                     ▼                                                        ▼
//!                 completed ◄───────────────────────────────────────────────────┘
//!                     │ claim_reward (one Task ledger entry)
//!                     ▼
//!                  claimed ── start after next_available (recurring) ──► pending
//! ```
//!
//! One-time tasks stop at their completion cap. Recurring tasks open again once
//! `next_available` (1 day or 7 days after the last completion) has passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ledger::RewardLedger;
use super::notifications::NotificationKind;
use super::state::Txn;
use super::streak::{self, StreakSummary};
use super::wallet::Wallet;
use crate::catalog::{Catalog, TaskCategory, TaskDefinition, TaskRequirement, DAILY_CHECKIN};
use crate::error::{CampaignError, Conflict, PolicyViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    PendingVerification,
    Completed,
    Claimed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingVerification => "pending_verification",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_verification" => Ok(Self::PendingVerification),
            "completed" => Ok(Self::Completed),
            "claimed" => Ok(Self::Claimed),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown verification status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTask {
    pub wallet: Wallet,
    pub task_id: String,
    pub status: TaskStatus,
    pub completions: u32,
    pub last_completed: Option<DateTime<Utc>>,
    pub next_available: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub verification_payload: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl UserTask {
    fn new(wallet: &Wallet, task_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.clone(),
            task_id: task_id.to_string(),
            status: TaskStatus::Pending,
            completions: 0,
            last_completed: None,
            next_available: None,
            verification_payload: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskVerification {
    pub id: u64,
    pub wallet: Wallet,
    pub task_id: String,
    pub verification_kind: String,
    #[serde(skip)]
    pub proof: Vec<u8>,
    pub status: VerificationStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub task_id: String,
    pub status: TaskStatus,
    pub requires_verification: bool,
    pub completions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReceipt {
    pub task_id: String,
    pub reward: u64,
    pub completions: u32,
    pub next_available: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewardReceipt {
    pub task_id: String,
    pub reward: u64,
    pub tx_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskBoardEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TaskCategory,
    pub recurrence: crate::catalog::Recurrence,
    pub reward: u64,
    pub requires_verification: bool,
    pub verification_kind: Option<String>,
    pub status: Option<TaskStatus>,
    pub completions: u32,
    pub next_available: Option<DateTime<Utc>>,
    pub can_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskBoard {
    pub tasks: Vec<TaskBoardEntry>,
    pub streak: StreakSummary,
    pub pending_rewards: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingVerification {
    pub verification_id: u64,
    pub wallet: Wallet,
    pub task_id: String,
    pub task_title: String,
    pub reward: u64,
    pub verification_kind: String,
    pub proof: String,
    pub created_at: DateTime<Utc>,
}

pub struct TaskLifecycle {
    catalog: Arc<Catalog>,
}

impl TaskLifecycle {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn definition(&self, task_id: &str) -> Result<&TaskDefinition, CampaignError> {
        self.catalog
            .task(task_id)
            .ok_or_else(|| CampaignError::not_found("task", task_id))
    }

    fn active_definition(&self, task_id: &str) -> Result<&TaskDefinition, CampaignError> {
        let def = self.definition(task_id)?;
        if !def.active {
            return Err(PolicyViolation::TaskInactive {
                task_id: task_id.to_string(),
            }
            .into());
        }
        Ok(def)
    }

    /// Cap and cooldown checks shared by start, complete and submit
    fn ensure_available(
        def: &TaskDefinition,
        instance: Option<&UserTask>,
        now: DateTime<Utc>,
    ) -> Result<(), CampaignError> {
        let Some(instance) = instance else {
            return Ok(());
        };

        if let Some(cap) = def.completion_cap() {
            if instance.completions >= cap {
                return Err(Conflict::AlreadyCompleted {
                    task_id: def.id.clone(),
                    completions: instance.completions,
                }
                .into());
            }
        }

        if def.recurrence.is_recurring() {
            if let Some(available_at) = instance.next_available {
                if now < available_at {
                    return Err(PolicyViolation::NotYetAvailable {
                        task_id: def.id.clone(),
                        available_at,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    fn ensure_requirement(
        def: &TaskDefinition,
        txn: &Txn<'_>,
        wallet: &Wallet,
    ) -> Result<(), CampaignError> {
        match def.requirement {
            Some(TaskRequirement::MinReferrals { count }) => {
                let current = txn.user(wallet).map(|u| u.referral_count).unwrap_or(0);
                if current < count {
                    return Err(PolicyViolation::InsufficientReferrals {
                        required: count,
                        current,
                        needed: count - current,
                    }
                    .into());
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn can_complete(def: &TaskDefinition, instance: Option<&UserTask>, now: DateTime<Utc>) -> bool {
        if !def.active || Self::ensure_available(def, instance, now).is_err() {
            return false;
        }
        !matches!(
            instance.map(|t| t.status),
            Some(TaskStatus::PendingVerification) | Some(TaskStatus::Completed)
        )
    }

    pub fn start(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        task_id: &str,
    ) -> Result<StartReceipt, CampaignError> {
        let def = self.active_definition(task_id)?;
        let now = txn.now();

        let instance = match txn.user_task(wallet, task_id).cloned() {
            None => {
                let created = UserTask::new(wallet, task_id, now);
                debug!(wallet = %wallet, task_id = %task_id, "Task started");
                txn.put_user_task(created.clone());
                created
            }
            Some(mut existing) => {
                Self::ensure_available(def, Some(&existing), now)?;
                if existing.status == TaskStatus::Claimed && def.recurrence.is_recurring() {
                    existing.status = TaskStatus::Pending;
                    debug!(wallet = %wallet, task_id = %task_id, "Recurring task reopened");
                    txn.put_user_task(existing.clone());
                }
                existing
            }
        };

        Ok(StartReceipt {
            task_id: task_id.to_string(),
            status: instance.status,
            requires_verification: def.requires_verification,
            completions: instance.completions,
        })
    }

    /// Completion bookkeeping shared by direct completion, approval and check-in
    fn record_completion(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        def: &TaskDefinition,
    ) -> UserTask {
        let now = txn.now();
        let mut instance = txn
            .user_task(wallet, &def.id)
            .cloned()
            .unwrap_or_else(|| UserTask::new(wallet, &def.id, now));

        instance.completions += 1;
        instance.status = TaskStatus::Completed;
        instance.last_completed = Some(now);
        instance.next_available = def.recurrence.cooldown().map(|cooldown| now + cooldown);

        txn.put_user_task(instance.clone());
        instance
    }

    fn notify_completed(&self, txn: &mut Txn<'_>, wallet: &Wallet, def: &TaskDefinition) {
        txn.notify(
            wallet,
            NotificationKind::TaskComplete,
            format!("Task completed: {}! Claim your {} {}", def.title, def.reward, self.catalog.token_symbol()),
        );
    }

    /// Complete the daily check-in task as part of a check-in.
    ///
    /// The cooldown is not re-checked. A previous completion whose reward is
    /// still unclaimed is left as it is. Returns the reward waiting to be
    /// claimed, or `None` when the task is missing or inactive.
    pub(crate) fn complete_checkin(&self, txn: &mut Txn<'_>, wallet: &Wallet) -> Option<u64> {
        let def = self.definition(DAILY_CHECKIN).ok().filter(|def| def.active)?;
        let unclaimed = txn
            .user_task(wallet, DAILY_CHECKIN)
            .is_some_and(|t| t.status == TaskStatus::Completed);
        if !unclaimed {
            self.record_completion(txn, wallet, def);
            self.notify_completed(txn, wallet, def);
        }
        Some(def.reward)
    }

    pub fn complete(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        task_id: &str,
    ) -> Result<CompletionReceipt, CampaignError> {
        let def = self.active_definition(task_id)?;
        if def.requires_verification {
            return Err(PolicyViolation::VerificationRequired {
                task_id: task_id.to_string(),
            }
            .into());
        }

        Self::ensure_requirement(def, txn, wallet)?;
        let existing = txn.user_task(wallet, task_id);
        Self::ensure_available(def, existing, txn.now())?;
        if existing.map(|t| t.status) == Some(TaskStatus::Completed) {
            return Err(Conflict::RewardUnclaimed {
                task_id: task_id.to_string(),
            }
            .into());
        }

        let instance = self.record_completion(txn, wallet, def);
        self.notify_completed(txn, wallet, def);
        info!(wallet = %wallet, task_id = %task_id, completions = instance.completions, "Task completed");

        Ok(CompletionReceipt {
            task_id: task_id.to_string(),
            reward: def.reward,
            completions: instance.completions,
            next_available: instance.next_available,
        })
    }

    pub fn submit_verification(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        task_id: &str,
        verification_kind: Option<&str>,
        proof: Vec<u8>,
    ) -> Result<TaskVerification, CampaignError> {
        let def = self.active_definition(task_id)?;
        if !def.requires_verification {
            return Err(PolicyViolation::VerificationNotRequired {
                task_id: task_id.to_string(),
            }
            .into());
        }
        if proof.is_empty() {
            return Err(CampaignError::Validation(
                "verification proof is required".to_string(),
            ));
        }

        let mut instance = txn
            .user_task(wallet, task_id)
            .cloned()
            .ok_or_else(|| CampaignError::not_found("started task", task_id))?;

        match instance.status {
            TaskStatus::Completed => {
                return Err(Conflict::RewardUnclaimed {
                    task_id: task_id.to_string(),
                }
                .into())
            }
            TaskStatus::PendingVerification => {
                if let Some(previous) = txn.latest_verification(wallet, task_id) {
                    if previous.status == VerificationStatus::Pending {
                        return Err(Conflict::VerificationPending {
                            task_id: task_id.to_string(),
                            verification_id: previous.id,
                        }
                        .into());
                    }
                }
            }
            TaskStatus::Pending | TaskStatus::Claimed => {}
        }
        Self::ensure_available(def, Some(&instance), txn.now())?;

        let kind = verification_kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| def.verification_kind.clone())
            .unwrap_or_default();

        let verification = TaskVerification {
            id: txn.ids().next_verification_id(),
            wallet: wallet.clone(),
            task_id: task_id.to_string(),
            verification_kind: kind,
            proof: proof.clone(),
            status: VerificationStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            notes: None,
            created_at: txn.now(),
        };
        txn.put_verification(verification.clone());

        instance.status = TaskStatus::PendingVerification;
        instance.verification_payload = Some(proof);
        txn.put_user_task(instance);

        txn.notify(
            wallet,
            NotificationKind::TaskVerification,
            format!("Verification submitted for task: {}", def.title),
        );
        debug!(wallet = %wallet, task_id = %task_id, verification_id = verification.id, "Verification submitted");

        Ok(verification)
    }

    pub fn review(
        &self,
        txn: &mut Txn<'_>,
        verification_id: u64,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
    ) -> Result<TaskVerification, CampaignError> {
        let mut verification = txn
            .verification(verification_id)
            .cloned()
            .ok_or_else(|| CampaignError::not_found("verification", verification_id.to_string()))?;

        if verification.status != VerificationStatus::Pending {
            return Err(Conflict::AlreadyReviewed {
                verification_id,
                status: verification.status,
            }
            .into());
        }

        verification.status = match decision {
            ReviewDecision::Approved => VerificationStatus::Approved,
            ReviewDecision::Rejected => VerificationStatus::Rejected,
        };
        verification.reviewed_by = Some(reviewer.to_string());
        verification.reviewed_at = Some(txn.now());
        verification.notes = notes;
        txn.put_verification(verification.clone());

        let wallet = verification.wallet.clone();
        match decision {
            ReviewDecision::Approved => {
                let def = self.definition(&verification.task_id)?;
                self.record_completion(txn, &wallet, def);
                txn.notify(
                    &wallet,
                    NotificationKind::TaskApproved,
                    format!(
                        "Task verified: {}! Claim your {} {}",
                        def.title,
                        def.reward,
                        self.catalog.token_symbol()
                    ),
                );
                info!(verification_id, wallet = %wallet, reviewer = %reviewer, "Verification approved");
            }
            ReviewDecision::Rejected => {
                warn!(verification_id, wallet = %wallet, reviewer = %reviewer, "Verification rejected");
            }
        }

        Ok(verification)
    }

    pub fn claim_reward(
        &self,
        txn: &mut Txn<'_>,
        wallet: &Wallet,
        task_id: &str,
        ledger: &RewardLedger,
    ) -> Result<RewardReceipt, CampaignError> {
        let def = self.definition(task_id)?;
        let mut instance = txn
            .user_task(wallet, task_id)
            .cloned()
            .ok_or_else(|| CampaignError::not_found("started task", task_id))?;

        if instance.status != TaskStatus::Completed {
            return Err(Conflict::NotClaimable {
                task_id: task_id.to_string(),
                status: instance.status,
            }
            .into());
        }

        let entry = ledger.append_task_reward(txn, wallet, def)?;
        instance.status = TaskStatus::Claimed;
        txn.put_user_task(instance);

        txn.notify(
            wallet,
            NotificationKind::TaskReward,
            format!(
                "Claimed {} {} for completing: {}",
                def.reward,
                self.catalog.token_symbol(),
                def.title
            ),
        );

        Ok(RewardReceipt {
            task_id: task_id.to_string(),
            reward: def.reward,
            tx_id: entry.tx_id,
        })
    }

    pub fn board(&self, txn: &Txn<'_>, wallet: &Wallet) -> TaskBoard {
        let now = txn.now();
        let mut pending_rewards = 0;

        let tasks = self
            .catalog
            .tasks()
            .iter()
            .filter(|def| def.active)
            .map(|def| {
                let instance = txn.user_task(wallet, &def.id);
                if instance.map(|t| t.status) == Some(TaskStatus::Completed) {
                    pending_rewards += def.reward;
                }
                TaskBoardEntry {
                    id: def.id.clone(),
                    title: def.title.clone(),
                    description: def.description.clone(),
                    category: def.category,
                    recurrence: def.recurrence,
                    reward: def.reward,
                    requires_verification: def.requires_verification,
                    verification_kind: def.verification_kind.clone(),
                    status: instance.map(|t| t.status),
                    completions: instance.map(|t| t.completions).unwrap_or(0),
                    next_available: instance.and_then(|t| t.next_available),
                    can_complete: Self::can_complete(def, instance, now),
                }
            })
            .collect();

        TaskBoard {
            tasks,
            streak: streak::summary(txn, wallet),
            pending_rewards,
        }
    }

    /// Admin review queue, oldest first
    pub fn pending_verifications(&self, txn: &Txn<'_>) -> Vec<PendingVerification> {
        let mut pending: Vec<PendingVerification> = txn
            .base()
            .verifications()
            .filter(|v| v.status == VerificationStatus::Pending)
            .map(|v| {
                let def = self.catalog.task(&v.task_id);
                PendingVerification {
                    verification_id: v.id,
                    wallet: v.wallet.clone(),
                    task_id: v.task_id.clone(),
                    task_title: def.map(|d| d.title.clone()).unwrap_or_default(),
                    reward: def.map(|d| d.reward).unwrap_or(0),
                    verification_kind: v.verification_kind.clone(),
                    proof: String::from_utf8_lossy(&v.proof).into_owned(),
                    created_at: v.created_at,
                }
            })
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.verification_id.cmp(&b.verification_id))
        });
        pending
    }
}
