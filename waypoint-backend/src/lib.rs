pub mod address;
pub mod auth;
pub mod config;
pub mod directory;
pub mod helpers;
pub mod mailer;
pub mod pending;
pub mod session;
pub mod stats;

mod error;
mod routes;
mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::{CredentialVerifier, DiscordOAuth};
use crate::directory::Directory;
use crate::mailer::Mailer;
use crate::pending::PendingAuthStore;
use crate::session::SessionTicketIssuer;
use crate::stats::StatsSampler;

pub struct AppState {
    pub db: waypoint_db::Database,
    pub directory: Directory,
    pub stats: StatsSampler,
    pub pending: PendingAuthStore,
    pub verifier: CredentialVerifier,
    pub sessions: SessionTicketIssuer,
    pub discord: Arc<dyn DiscordOAuth>,
    pub mailer: Arc<dyn Mailer>,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for the heartbeat endpoint (many servers, each
    /// posting every few seconds)
    pub heartbeat_per_sec: u64,
    /// Burst size for the heartbeat endpoint
    pub heartbeat_burst: u32,
    /// Requests per minute for credential endpoints (login, register, resets)
    pub auth_per_min: u64,
    /// Burst size for credential endpoints
    pub auth_burst: u32,
    /// Requests per second for general endpoints
    pub general_per_sec: u64,
    /// Burst size for general endpoints
    pub general_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            heartbeat_per_sec: 50,
            heartbeat_burst: 100,
            auth_per_min: 10,
            auth_burst: 5,
            general_per_sec: 10,
            general_burst: 20,
        }
    }
}

/// Create the application router with the given state and configuration.
///
/// `rate_limit: None` drops the governor layers entirely; the in-process
/// test harness has no connect info for the key extractor to work with.
pub fn create_app(
    state: Arc<AppState>,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: Option<RateLimitConfig>,
) -> Router {
    // Lenient rate limit for heartbeats - every live server posts one
    // every few seconds
    let mut heartbeat_routes = Router::new().route("/servers/{address}", post(routes::heartbeat));

    // Strict rate limit for credential endpoints
    let mut auth_routes = Router::new()
        .route("/users", post(routes::register))
        .route("/users/{id}/verify", post(routes::verify))
        .route("/users/reset-pin", post(routes::reset_pin))
        .route("/users/reset-password", post(routes::reset_password))
        .route("/users/login", post(routes::login))
        .route("/users/login-discord", get(routes::login_discord))
        .route(
            "/users/login-discord/callback",
            get(routes::login_discord_callback),
        )
        .route(
            "/users/login-discord/status",
            get(routes::login_discord_status),
        );

    // General rate limit for the rest
    let mut general_routes = Router::new()
        .route("/servers", get(routes::list_servers))
        .route(
            "/servers/{address}/sessions/{session}",
            get(routes::session_user),
        )
        .route("/stats", get(routes::stats))
        .route("/latest_version", get(routes::latest_version))
        .route("/client_link/{version}", get(routes::client_link))
        .route("/runtime_link/{version}", get(routes::runtime_link))
        .route("/users/me", get(routes::me))
        .route("/users/me/play/{address}", post(routes::play))
        .route("/users/{id}", get(routes::user_info));

    if let Some(rate_limit) = rate_limit {
        let heartbeat_governor = GovernorConfigBuilder::default()
            .per_second(rate_limit.heartbeat_per_sec)
            .burst_size(rate_limit.heartbeat_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap();

        let auth_governor = GovernorConfigBuilder::default()
            .per_second(rate_limit.auth_per_min / 60 + 1) // Convert per-min to per-sec, min 1
            .burst_size(rate_limit.auth_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap();

        let general_governor = GovernorConfigBuilder::default()
            .per_second(rate_limit.general_per_sec)
            .burst_size(rate_limit.general_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap();

        heartbeat_routes = heartbeat_routes.layer(GovernorLayer::new(heartbeat_governor));
        auth_routes = auth_routes.layer(GovernorLayer::new(auth_governor));
        general_routes = general_routes.layer(GovernorLayer::new(general_governor));
    }

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(heartbeat_routes)
        .merge(auth_routes)
        .merge(general_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}
