//! Request guards for the campaign API
//!
//! Everything here runs before a handler touches the engine:
//! - per-origin fixed-window rate limiting
//! - declared body size cap
//! - admin key allow-list that attaches the reviewer name
//! - one access-log line per request
//!
//! `ClientOrigin` is also an extractor so handlers can hand the same origin to
//! the anti-sybil guard.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{AdminConfig, CampaignConfig};

const RATE_WINDOW: Duration = Duration::from_secs(60);
const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    pub rate_limit_per_minute: u32,
    pub max_request_size: usize,
    pub log_requests: bool,
    /// Mask the host part of client origins in access logs
    pub sanitize_logs: bool,
}

impl SecurityMiddlewareConfig {
    pub fn from_config(config: &CampaignConfig) -> Self {
        Self {
            rate_limit_per_minute: config.security.rate_limit_per_minute,
            max_request_size: config.security.max_request_size,
            sanitize_logs: config.logging.sanitize_logs,
            ..Self::default()
        }
    }
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 60,
            max_request_size: 64 * 1024,
            log_requests: true,
            sanitize_logs: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: u32,
}

/// Verdict for one request against its origin's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the window reopens
    pub reset_after: u64,
}

/// Fixed one-minute window per client origin
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            windows: DashMap::new(),
            limit: limit_per_minute,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn check(&self, origin: &str) -> RateDecision {
        let now = Instant::now();
        let mut window = self.windows.entry(origin.to_string()).or_insert(Window {
            opened: now,
            hits: 0,
        });

        if now.duration_since(window.opened) >= RATE_WINDOW {
            *window = Window {
                opened: now,
                hits: 0,
            };
        }

        let reset_after = RATE_WINDOW
            .saturating_sub(now.duration_since(window.opened))
            .as_secs();

        if window.hits >= self.limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_after,
            };
        }

        window.hits += 1;
        RateDecision {
            allowed: true,
            remaining: self.limit - window.hits,
            reset_after,
        }
    }

    /// Forget origins whose window closed at least one full window ago
    pub fn cleanup(&self) {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| w.opened.elapsed() < RATE_WINDOW * 2);
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            debug!(dropped, tracked = self.windows.len(), "Rate limit windows pruned");
        }
    }

    pub fn tracked_origins(&self) -> usize {
        self.windows.len()
    }
}

#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
    pub rate_limiter: Arc<RateLimiter>,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_per_minute)),
            config,
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the origin a request counts against.
///
/// Precedence: first `X-Forwarded-For` hop, `X-Real-IP`, the socket peer, then
/// the literal `"unknown"`.
pub fn resolve_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = header_value(headers, "x-forwarded-for")
        .and_then(|chain| chain.split(',').map(str::trim).find(|hop| !hop.is_empty()));

    forwarded
        .or_else(|| header_value(headers, "x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Hide the host part of an IPv4/IPv6 origin
pub fn mask_origin(origin: &str) -> String {
    if let Some((network, _)) = origin.rsplit_once('.') {
        return format!("{}.x", network);
    }
    if let Some((network, _)) = origin.rsplit_once(':') {
        return format!("{}:x", network);
    }
    origin.to_string()
}

/// Client origin as seen by the anti-sybil guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve_origin(&parts.headers, peer_addr(&parts.extensions))))
    }
}

/// Reviewer name attached by `admin_auth_middleware`
#[derive(Debug, Clone)]
pub struct Reviewer(pub String);

fn stamp_rate_headers(headers: &mut HeaderMap, limit: u32, decision: RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_after));
}

pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    ClientOrigin(origin): ClientOrigin,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    let decision = limiter.check(&origin);

    if !decision.allowed {
        warn!(
            origin = %mask_origin(&origin),
            path = %request.uri().path(),
            retry_after = decision.reset_after,
            "Origin over request budget"
        );
        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        stamp_rate_headers(response.headers_mut(), limiter.limit(), decision);
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_after));
        return response;
    }

    let mut response = next.run(request).await;
    stamp_rate_headers(response.headers_mut(), limiter.limit(), decision);
    response
}

/// Reject bodies whose declared length exceeds the configured cap
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let declared = header_value(request.headers(), header::CONTENT_LENGTH.as_str())
        .and_then(|v| v.parse::<usize>().ok());

    match declared {
        Some(length) if length > state.config.max_request_size => {
            warn!(
                length,
                max = state.config.max_request_size,
                path = %request.uri().path(),
                "Request body over limit"
            );
            Err(StatusCode::PAYLOAD_TOO_LARGE)
        }
        _ => Ok(next.run(request).await),
    }
}

fn presented_admin_key(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, "x-api-key").or_else(|| {
        header_value(headers, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    })
}

/// Admin allow-list; the matching reviewer name rides along as an extension
pub async fn admin_auth_middleware(
    State(admin): State<Arc<AdminConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let reviewer = match presented_admin_key(request.headers()) {
        None => {
            warn!(path = %request.uri().path(), "Admin route called without a key");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Some(key) => match admin.reviewer_for(key) {
            Some(reviewer) => reviewer.to_string(),
            None => {
                let hint: String = key.chars().take(4).collect();
                warn!(key_prefix = %hint, path = %request.uri().path(), "Unknown admin key");
                return Err(StatusCode::UNAUTHORIZED);
            }
        },
    };

    debug!(reviewer = %reviewer, path = %request.uri().path(), "Admin request authorized");
    request.extensions_mut().insert(Reviewer(reviewer));
    Ok(next.run(request).await)
}

/// One access-log line per request, level chosen by status class
pub async fn logging_middleware(
    State(state): State<SecurityState>,
    ClientOrigin(origin): ClientOrigin,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let origin = if state.config.sanitize_logs {
        mask_origin(&origin)
    } else {
        origin
    };

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match status {
        500..=u16::MAX => error!(%method, %path, status, elapsed_ms, %origin, "Request failed"),
        400..=499 => warn!(%method, %path, status, elapsed_ms, %origin, "Request rejected"),
        _ => info!(%method, %path, status, elapsed_ms, %origin, "Request served"),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_window_per_origin() {
        let limiter = RateLimiter::new(2);

        let first = limiter.check("203.0.113.1");
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check("203.0.113.1").allowed);

        let blocked = limiter.check("203.0.113.1");
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert!(blocked.reset_after <= 60);

        assert!(limiter.check("198.51.100.7").allowed);
        assert_eq!(limiter.tracked_origins(), 2);

        // Fresh windows survive a prune
        limiter.cleanup();
        assert_eq!(limiter.tracked_origins(), 2);
    }

    #[test]
    fn test_mask_origin() {
        assert_eq!(mask_origin("192.168.1.100"), "192.168.1.x");
        assert_eq!(mask_origin("2001:db8::1"), "2001:db8::x");
        assert_eq!(mask_origin("unknown"), "unknown");
    }

    #[test]
    fn test_origin_precedence() {
        let peer: SocketAddr = "10.0.0.9:4000".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(resolve_origin(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(resolve_origin(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(resolve_origin(&headers, Some(peer)), "198.51.100.4");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" , 203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(resolve_origin(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_admin_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_admin_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_admin_key(&headers), Some("abc"));

        headers.insert("x-api-key", HeaderValue::from_static("direct"));
        assert_eq!(presented_admin_key(&headers), Some("direct"));
    }
}
