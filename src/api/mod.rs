//! HTTP API for the airdrop campaign
//!
//! Routes, all under `/api`:
//!
//! | Route                                   | Method | Handler module |
//! |-----------------------------------------|--------|----------------|
//! | `/check-wallet`, `/claim-airdrop`       | POST   | `airdrop`      |
//! | `/check-withdrawal-eligibility`         | GET    | `airdrop`      |
//! | `/simulate-withdrawal`                  | POST   | `airdrop`      |
//! | `/get-total-balance`                    | GET    | `airdrop`      |
//! | `/get-referral-stats`                   | GET    | `airdrop`      |
//! | `/get-network-analysis`                 | GET    | `airdrop`      |
//! | `/get-achievements`                     | GET    | `airdrop`      |
//! | `/track-link-click`                     | POST   | `airdrop`      |
//! | `/get-notifications`                    | GET    | `airdrop`      |
//! | `/mark-notification-read`               | POST   | `airdrop`      |
//! | `/leaderboard`                          | GET    | `airdrop`      |
//! | `/tasks/*`                              | both   | `tasks`        |
//! | `/admin/tasks/{pending,verify}`         | both   | `tasks`        |
//! | `/health`                               | GET    | here           |
//!
//! Errors come back as `{ "success": false, "error": <class>, "message", "details" }`
//! with the status code chosen by `ApiError`.

pub mod airdrop;
pub mod middleware;
pub mod tasks;

use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::campaign::{CampaignEngine, CampaignStats};
use crate::config::AdminConfig;
use crate::database::DatabasePool;
use crate::error::{CampaignError, PolicyViolation};

pub use middleware::{
    admin_auth_middleware, body_size_middleware, logging_middleware, rate_limit_middleware,
    ClientOrigin, RateLimiter, Reviewer, SecurityMiddlewareConfig, SecurityState,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CampaignEngine>,
    pub admin: Arc<AdminConfig>,
    pub security: SecurityState,
    pub db: Option<Arc<DatabasePool>>,
}

impl AppState {
    pub fn new(engine: Arc<CampaignEngine>, admin: AdminConfig, security: SecurityState) -> Self {
        Self {
            engine,
            admin: Arc::new(admin),
            security,
            db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<DatabasePool>) -> Self {
        self.db = Some(db);
        self
    }

    /// Origin the sybil guard should see; exempt wallets are not counted
    pub fn origin_for<'a>(&self, wallet_address: &str, origin: &'a ClientOrigin) -> Option<&'a str> {
        let exempt = crate::campaign::Wallet::parse(wallet_address)
            .map(|w| self.admin.is_exempt(&w))
            .unwrap_or(false);
        if exempt {
            None
        } else {
            Some(origin.0.as_str())
        }
    }
}

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

/// Campaign error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub CampaignError);

impl From<CampaignError> for ApiError {
    fn from(err: CampaignError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self(CampaignError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CampaignError::InvalidWallet(_) | CampaignError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            CampaignError::NotFound { .. } => StatusCode::NOT_FOUND,
            CampaignError::Conflict(_) | CampaignError::Integrity(_) => StatusCode::CONFLICT,
            CampaignError::Policy(
                PolicyViolation::OriginBanned { .. } | PolicyViolation::OriginLimitReached { .. },
            ) => StatusCode::TOO_MANY_REQUESTS,
            CampaignError::Policy(_) => StatusCode::FORBIDDEN,
            CampaignError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self.0 {
            CampaignError::Conflict(conflict) => serde_json::to_value(conflict).ok(),
            CampaignError::Policy(violation) => serde_json::to_value(violation).ok(),
            _ => None,
        };

        let message = match &self.0 {
            CampaignError::Storage(e) => {
                error!(error = %e, "Storage failure while handling request");
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            success: false,
            error: self.0.kind(),
            message,
            details,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub stats: CampaignStats,
}

async fn health(State(state): State<AppState>) -> Response {
    let database = match &state.db {
        None => Ok("disabled"),
        Some(db) => db.ping().await.map(|_| "connected"),
    };

    let stats = state.engine.stats().await;
    let timestamp = chrono::Utc::now().to_rfc3339();

    match database {
        Ok(database) => ok(HealthResponse {
            status: "healthy",
            database,
            timestamp,
            version: env!("CARGO_PKG_VERSION"),
            stats,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse {
                    success: false,
                    data: HealthResponse {
                        status: "unhealthy",
                        database: "unreachable",
                        timestamp,
                        version: env!("CARGO_PKG_VERSION"),
                        stats,
                    },
                }),
            )
                .into_response()
        }
    }
}

/// Build the full `/api` router with its middleware stack
pub fn create_router(state: AppState) -> Router {
    let admin = tasks::create_admin_router().layer(
        axum_middleware::from_fn_with_state(state.admin.clone(), admin_auth_middleware),
    );

    let api = Router::new()
        .merge(airdrop::create_router())
        .nest("/tasks", tasks::create_router())
        .nest("/admin", admin)
        .route("/health", get(health))
        .with_state(state.clone());

    Router::new()
        .nest("/api", api)
        .layer(axum_middleware::from_fn_with_state(
            state.security.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.security.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.security.clone(),
            logging_middleware,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Conflict;
    use chrono::Utc;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (CampaignError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CampaignError::not_found("task", "t"), StatusCode::NOT_FOUND),
            (
                Conflict::RewardUnclaimed {
                    task_id: "t".into(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                PolicyViolation::OriginBanned { until: Utc::now() }.into(),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                PolicyViolation::TaskInactive {
                    task_id: "t".into(),
                }
                .into(),
                StatusCode::FORBIDDEN,
            ),
            (
                CampaignError::Storage("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
