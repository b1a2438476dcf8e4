//! Airdrop, referral and account endpoints
//!
//! Endpoints:
//!   POST /check-wallet -> validate and register a wallet, report eligibility
//!   POST /claim-airdrop -> issue the genesis claim (idempotent)
//!   GET  /check-withdrawal-eligibility?wallet=<w>
//!   POST /simulate-withdrawal -> eligibility plus an audit row
//!   GET  /get-total-balance?wallet=<w>
//!   GET  /get-referral-stats?wallet=<w>
//!   GET  /get-network-analysis?wallet=<w>
//!   GET  /get-achievements?wallet=<w>
//!   POST /track-link-click
//!   GET  /get-notifications?wallet=<w>&limit=<n>
//!   POST /mark-notification-read
//!   GET  /leaderboard?limit=<n>&wallet=<w>

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ok, ApiError, ApiResult, AppState, ClientOrigin};
use crate::campaign::leaderboard::DEFAULT_LEADERBOARD_LIMIT;
use crate::campaign::{
    AchievementProgress, Balance, EligibilityReport, GenesisOutcome, Leaderboard,
    NetworkAnalysis, NotificationFeed, ReferralStats, WalletCheck,
};

const DEFAULT_NOTIFICATION_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CheckWalletRequest {
    #[serde(default)]
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct ClaimAirdropRequest {
    #[serde(default)]
    pub wallet_address: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    #[serde(default)]
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct WalletRequest {
    #[serde(default)]
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackClickRequest {
    #[serde(default)]
    pub referral_code: String,
}

#[derive(Debug, Serialize)]
pub struct TrackClickResponse {
    pub referral_code: String,
    pub link_clicks: u32,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub wallet: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub wallet: String,
    #[serde(default)]
    pub notification_id: String,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub notification_id: String,
    pub unread_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
    pub wallet: Option<String>,
}

fn page_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_PAGE_LIMIT)
}

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    Ok(())
}

pub async fn check_wallet(
    State(state): State<AppState>,
    origin: ClientOrigin,
    Json(request): Json<CheckWalletRequest>,
) -> ApiResult<WalletCheck> {
    require(&request.wallet_address, "wallet_address")?;
    let origin = state.origin_for(&request.wallet_address, &origin);

    let check = state
        .engine
        .check_wallet(&request.wallet_address, origin)
        .await?;
    debug!(wallet = %check.wallet, eligible = check.eligible, "Wallet checked");
    Ok(ok(check))
}

pub async fn claim_airdrop(
    State(state): State<AppState>,
    origin: ClientOrigin,
    Json(request): Json<ClaimAirdropRequest>,
) -> ApiResult<GenesisOutcome> {
    require(&request.wallet_address, "wallet_address")?;
    let origin = state.origin_for(&request.wallet_address, &origin);

    let outcome = state
        .engine
        .claim_airdrop(
            &request.wallet_address,
            request.referral_code.as_deref(),
            origin,
        )
        .await?;

    if let GenesisOutcome::Claimed(receipt) = &outcome {
        info!(wallet = %receipt.wallet, amount = receipt.amount, "Airdrop claim issued");
    }
    Ok(ok(outcome))
}

pub async fn check_withdrawal_eligibility(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<EligibilityReport> {
    require(&query.wallet, "wallet")?;
    Ok(ok(state
        .engine
        .check_withdrawal_eligibility(&query.wallet)
        .await?))
}

pub async fn simulate_withdrawal(
    State(state): State<AppState>,
    Json(request): Json<WalletRequest>,
) -> ApiResult<EligibilityReport> {
    require(&request.wallet, "wallet")?;
    Ok(ok(state.engine.simulate_withdrawal(&request.wallet).await?))
}

pub async fn total_balance(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Balance> {
    require(&query.wallet, "wallet")?;
    Ok(ok(state.engine.total_balance(&query.wallet).await?))
}

pub async fn referral_stats(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<ReferralStats> {
    require(&query.wallet, "wallet")?;
    Ok(ok(state.engine.referral_stats(&query.wallet).await?))
}

pub async fn network_analysis(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<NetworkAnalysis> {
    require(&query.wallet, "wallet")?;
    Ok(ok(state.engine.network_analysis(&query.wallet).await?))
}

pub async fn achievements(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<AchievementProgress> {
    require(&query.wallet, "wallet")?;
    Ok(ok(state.engine.achievements(&query.wallet).await?))
}

pub async fn track_link_click(
    State(state): State<AppState>,
    Json(request): Json<TrackClickRequest>,
) -> ApiResult<TrackClickResponse> {
    require(&request.referral_code, "referral_code")?;
    let link_clicks = state.engine.track_link_click(&request.referral_code).await?;
    Ok(ok(TrackClickResponse {
        referral_code: request.referral_code.trim().to_uppercase(),
        link_clicks,
    }))
}

pub async fn notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<NotificationFeed> {
    require(&query.wallet, "wallet")?;
    let limit = page_limit(query.limit, DEFAULT_NOTIFICATION_LIMIT);
    Ok(ok(state.engine.notifications(&query.wallet, limit).await?))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Json(request): Json<MarkReadRequest>,
) -> ApiResult<MarkReadResponse> {
    require(&request.wallet, "wallet")?;
    require(&request.notification_id, "notification_id")?;

    let unread_count = state
        .engine
        .mark_notification_read(&request.wallet, &request.notification_id)
        .await?;
    Ok(ok(MarkReadResponse {
        notification_id: request.notification_id,
        unread_count,
    }))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Leaderboard> {
    let limit = page_limit(query.limit, DEFAULT_LEADERBOARD_LIMIT);
    let wallet = query
        .wallet
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty());
    Ok(ok(state.engine.leaderboard(limit, wallet).await?))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/check-wallet", post(check_wallet))
        .route("/claim-airdrop", post(claim_airdrop))
        .route(
            "/check-withdrawal-eligibility",
            get(check_withdrawal_eligibility),
        )
        .route("/simulate-withdrawal", post(simulate_withdrawal))
        .route("/get-total-balance", get(total_balance))
        .route("/get-referral-stats", get(referral_stats))
        .route("/get-network-analysis", get(network_analysis))
        .route("/get-achievements", get(achievements))
        .route("/track-link-click", post(track_link_click))
        .route("/get-notifications", get(notifications))
        .route("/mark-notification-read", post(mark_notification_read))
        .route("/leaderboard", get(leaderboard))
}
