use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use waypoint_backend::auth::{CredentialVerifier, DiscordClient, TokenSigner};
use waypoint_backend::directory::Directory;
use waypoint_backend::mailer::LogMailer;
use waypoint_backend::pending::PendingAuthStore;
use waypoint_backend::session::SessionTicketIssuer;
use waypoint_backend::stats::StatsSampler;
use waypoint_backend::{AppState, RateLimitConfig, create_app};
use waypoint_db::Database;

#[tokio::main]
async fn main() {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting Waypoint master server...");

    // Load configuration from environment variables or use defaults
    let config = waypoint_backend::config::Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, public_url={}",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.public_url
    );
    tracing::info!(
        "Directory: server_timeout={}ms, stats_sample_interval={}ms, stats_csv={}",
        config.server_timeout_ms,
        config.stats_sample_interval_ms,
        config.stats_csv_path
    );
    tracing::info!(
        "Rate limits: heartbeat={}/sec (burst {}), auth={}/min (burst {}), general={}/sec (burst {})",
        config.rate_limit_heartbeat_per_sec,
        config.rate_limit_heartbeat_burst,
        config.rate_limit_auth_per_min,
        config.rate_limit_auth_burst,
        config.rate_limit_general_per_sec,
        config.rate_limit_general_burst
    );

    let db = Database::open(&config.database_path).await.unwrap();
    let historical = StatsSampler::load_archive(Path::new(&config.stats_csv_path));
    tracing::info!(samples = historical.len(), "loaded stats archive");

    let discord = DiscordClient::new(
        config.discord_client_id,
        config.discord_client_secret,
        format!("{}/users/login-discord/callback", config.public_url),
    );

    let state = Arc::new(AppState {
        db: db.clone(),
        directory: Directory::with_timeout(config.server_timeout_ms),
        stats: StatsSampler::with_archive(config.stats_sample_interval_ms, historical),
        pending: PendingAuthStore::new(),
        verifier: CredentialVerifier::new(db.clone(), TokenSigner::new(&config.jwt_secret)),
        sessions: SessionTicketIssuer::new(db),
        discord: Arc::new(discord),
        mailer: Arc::new(LogMailer),
    });

    let rate_limit = RateLimitConfig {
        heartbeat_per_sec: config.rate_limit_heartbeat_per_sec,
        heartbeat_burst: config.rate_limit_heartbeat_burst,
        auth_per_min: config.rate_limit_auth_per_min,
        auth_burst: config.rate_limit_auth_burst,
        general_per_sec: config.rate_limit_general_per_sec,
        general_burst: config.rate_limit_general_burst,
    };
    let app = create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        Some(rate_limit),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.unwrap();
    tracing::info!("Server listening on {}", addr);

    if let Err(e) =
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
    {
        tracing::error!("Axum server error: {}", e);
    }
}
