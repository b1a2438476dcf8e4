//! Campaign error taxonomy
//!
//! Every engine operation returns `Result<_, CampaignError>`. Variants map to the
//! error classes callers reconcile against:
//!
//! | Variant          | Meaning                                   | State mutated |
//! |------------------|-------------------------------------------|---------------|
//! | `InvalidWallet`  | malformed wallet address                  | never         |
//! | `Validation`     | missing or malformed request fields       | never         |
//! | `NotFound`       | unknown wallet / task / verification      | never         |
//! | `Conflict`       | action already applied, carries state     | never         |
//! | `Policy`         | threshold not met, carries the numbers    | origin bans only |
//! | `Integrity`      | identifier collision (retried internally) | never         |
//! | `Storage`        | persistence failure                       | never         |

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::campaign::streak::DailyStreak;
use crate::campaign::tasks::{TaskStatus, VerificationStatus};
use crate::campaign::wallet::WalletError;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("{0}")]
    InvalidWallet(#[from] WalletError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    Conflict(Conflict),

    #[error("{0}")]
    Policy(PolicyViolation),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CampaignError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable, machine-readable class name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidWallet(_) | Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Policy(_) => "policy",
            Self::Integrity(_) => "integrity",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<Conflict> for CampaignError {
    fn from(conflict: Conflict) -> Self {
        Self::Conflict(conflict)
    }
}

impl From<PolicyViolation> for CampaignError {
    fn from(violation: PolicyViolation) -> Self {
        Self::Policy(violation)
    }
}

/// The action was already applied; the payload is the current state
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum Conflict {
    #[error("already checked in today")]
    AlreadyCheckedInToday { streak: DailyStreak },

    #[error("task {task_id} already completed ({completions} completions)")]
    AlreadyCompleted { task_id: String, completions: u32 },

    #[error("task {task_id} is not claimable (status: {status})")]
    NotClaimable { task_id: String, status: TaskStatus },

    #[error("task {task_id} has a completed reward waiting to be claimed")]
    RewardUnclaimed { task_id: String },

    #[error("verification {verification_id} for task {task_id} is awaiting review")]
    VerificationPending { task_id: String, verification_id: u64 },

    #[error("verification {verification_id} was already reviewed ({status})")]
    AlreadyReviewed {
        verification_id: u64,
        status: VerificationStatus,
    },

    #[error("identifier collision: {identifier}")]
    DuplicateIdentifier { identifier: String },
}

/// A campaign rule blocks the action; the payload carries the threshold
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyViolation {
    #[error("need {needed} more referrals to complete this task")]
    InsufficientReferrals {
        required: u32,
        current: u32,
        needed: u32,
    },

    #[error("task {task_id} available again at {available_at}")]
    NotYetAvailable {
        task_id: String,
        available_at: DateTime<Utc>,
    },

    #[error("origin temporarily restricted until {until}")]
    OriginBanned { until: DateTime<Utc> },

    #[error("maximum wallet limit ({limit}) reached from this origin, restricted until {until}")]
    OriginLimitReached { limit: u32, until: DateTime<Utc> },

    #[error("task {task_id} is not active")]
    TaskInactive { task_id: String },

    #[error("task {task_id} requires verification")]
    VerificationRequired { task_id: String },

    #[error("task {task_id} does not require verification")]
    VerificationNotRequired { task_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = CampaignError::not_found("task", "unknown_task");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.to_string(), "task not found: unknown_task");

        let err: CampaignError = PolicyViolation::InsufficientReferrals {
            required: 3,
            current: 1,
            needed: 2,
        }
        .into();
        assert_eq!(err.kind(), "policy");
        assert!(err.to_string().contains("2 more referrals"));
    }

    #[test]
    fn test_wallet_error_is_validation() {
        let err: CampaignError = WalletError::MissingPrefix.into();
        assert_eq!(err.kind(), "validation");
    }
}
