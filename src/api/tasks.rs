//! Task endpoints and the admin review queue
//!
//! Endpoints:
//!   GET  /tasks/get-all?wallet=<w> -> task board with streak summary
//!   POST /tasks/start
//!   POST /tasks/complete
//!   POST /tasks/submit-verification -> proof payload queued for review
//!   POST /tasks/claim-reward
//!   POST /tasks/daily-checkin
//!   GET  /admin/tasks/pending -> verification queue (API key required)
//!   POST /admin/tasks/verify -> approve or reject (API key required)

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ok, ApiError, ApiResult, AppState, Reviewer};
use crate::campaign::tasks::{
    CompletionReceipt, PendingVerification, RewardReceipt, StartReceipt, TaskBoard,
};
use crate::campaign::{CheckinReceipt, ReviewDecision, TaskVerification};

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    #[serde(default)]
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    #[serde(default)]
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitVerificationRequest {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub task_id: String,
    /// Opaque proof document, stored as its JSON bytes
    #[serde(default)]
    pub proof: serde_json::Value,
    pub verification_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub verification_id: u64,
    pub status: ReviewDecision,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingQueue {
    pub verifications: Vec<PendingVerification>,
    pub count: usize,
}

impl TaskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.wallet.trim().is_empty() || self.task_id.trim().is_empty() {
            return Err(ApiError::validation("wallet and task_id are required"));
        }
        Ok(())
    }
}

pub async fn get_all(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<TaskBoard> {
    if query.wallet.trim().is_empty() {
        return Err(ApiError::validation("wallet is required"));
    }
    Ok(ok(state.engine.task_board(&query.wallet).await?))
}

pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<StartReceipt> {
    request.validate()?;
    Ok(ok(state
        .engine
        .start_task(&request.wallet, request.task_id.trim())
        .await?))
}

pub async fn complete(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<CompletionReceipt> {
    request.validate()?;
    Ok(ok(state
        .engine
        .complete_task(&request.wallet, request.task_id.trim())
        .await?))
}

pub async fn submit_verification(
    State(state): State<AppState>,
    Json(request): Json<SubmitVerificationRequest>,
) -> ApiResult<TaskVerification> {
    if request.wallet.trim().is_empty() || request.task_id.trim().is_empty() {
        return Err(ApiError::validation("wallet and task_id are required"));
    }
    let empty_proof = match &request.proof {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if empty_proof {
        return Err(ApiError::validation("proof is required"));
    }

    let proof = serde_json::to_vec(&request.proof)
        .map_err(|e| ApiError::validation(format!("unreadable proof: {}", e)))?;

    let verification = state
        .engine
        .submit_verification(
            &request.wallet,
            request.task_id.trim(),
            request.verification_type.as_deref(),
            proof,
        )
        .await?;
    Ok(ok(verification))
}

pub async fn claim_reward(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> ApiResult<RewardReceipt> {
    request.validate()?;
    Ok(ok(state
        .engine
        .claim_task_reward(&request.wallet, request.task_id.trim())
        .await?))
}

pub async fn daily_checkin(
    State(state): State<AppState>,
    Json(request): Json<CheckinRequest>,
) -> ApiResult<CheckinReceipt> {
    if request.wallet.trim().is_empty() {
        return Err(ApiError::validation("wallet is required"));
    }
    Ok(ok(state.engine.daily_checkin(&request.wallet).await?))
}

pub async fn pending(State(state): State<AppState>) -> ApiResult<PendingQueue> {
    let verifications = state.engine.pending_verifications().await;
    Ok(ok(PendingQueue {
        count: verifications.len(),
        verifications,
    }))
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(Reviewer(reviewer)): Extension<Reviewer>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<TaskVerification> {
    let verification = state
        .engine
        .review_verification(
            request.verification_id,
            request.status,
            &reviewer,
            request.notes.filter(|n| !n.trim().is_empty()),
        )
        .await?;

    info!(
        verification_id = verification.id,
        reviewer = %reviewer,
        status = %verification.status,
        "Verification reviewed"
    );
    Ok(ok(verification))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/get-all", get(get_all))
        .route("/start", post(start))
        .route("/complete", post(complete))
        .route("/submit-verification", post(submit_verification))
        .route("/claim-reward", post(claim_reward))
        .route("/daily-checkin", post(daily_checkin))
}

/// Admin routes; callers layer `admin_auth_middleware` on top
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/tasks/pending", get(pending))
        .route("/tasks/verify", post(verify))
}
