use std::env::var;
use std::time::Duration;

use crate::directory::DEFAULT_SERVER_TIMEOUT_MS;
use crate::stats::DEFAULT_SAMPLE_INTERVAL_MS;
use dotenvy::dotenv;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 65536 = 64KB; heartbeats are tiny)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "waypoint.db")
    pub database_path: String,

    /// Secret for signing bearer tokens
    /// Env: JWT_SECRET (required)
    pub jwt_secret: String,

    /// Historical population stats archive (CSV)
    /// Env: STATS_CSV_PATH (default: "data/stats.csv")
    pub stats_csv_path: String,

    /// Externally visible base URL, used to build the OAuth redirect URI
    /// Env: PUBLIC_URL (default: "http://localhost:3000")
    pub public_url: String,

    /// Discord OAuth application id
    /// Env: DISCORD_CLIENT_ID (required)
    pub discord_client_id: String,

    /// Discord OAuth application secret
    /// Env: DISCORD_CLIENT_SECRET (required)
    pub discord_client_secret: String,

    /// Directory entry staleness timeout in milliseconds
    /// Env: SERVER_TIMEOUT_MS (default: 10000)
    pub server_timeout_ms: i64,

    /// Minimum interval between population samples in milliseconds
    /// Env: STATS_SAMPLE_INTERVAL_MS (default: 60000)
    pub stats_sample_interval_ms: i64,

    /// Rate limit for heartbeats (requests per second)
    /// Env: RATE_LIMIT_HEARTBEAT_PER_SEC (default: 50)
    /// Lenient: every registered server posts one every few seconds
    pub rate_limit_heartbeat_per_sec: u64,

    /// Burst size for heartbeats
    /// Env: RATE_LIMIT_HEARTBEAT_BURST (default: 100)
    pub rate_limit_heartbeat_burst: u32,

    /// Rate limit for credential endpoints (requests per minute)
    /// Env: RATE_LIMIT_AUTH_PER_MIN (default: 10)
    /// Strict: these carry passwords and PINs
    pub rate_limit_auth_per_min: u64,

    /// Burst size for credential endpoints
    /// Env: RATE_LIMIT_AUTH_BURST (default: 5)
    pub rate_limit_auth_burst: u32,

    /// Rate limit for general endpoints (requests per second)
    /// Env: RATE_LIMIT_GENERAL_PER_SEC (default: 10)
    pub rate_limit_general_per_sec: u64,

    /// Burst size for general endpoints
    /// Env: RATE_LIMIT_GENERAL_BURST (default: 20)
    pub rate_limit_general_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", 64 * 1024),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", 3000),
            database_path: env_or_default_string("DATABASE_PATH", "waypoint.db"),
            jwt_secret: var("JWT_SECRET").expect("JWT_SECRET environment variable is required"),
            stats_csv_path: env_or_default_string("STATS_CSV_PATH", "data/stats.csv"),
            public_url: env_or_default_string("PUBLIC_URL", "http://localhost:3000"),
            discord_client_id: var("DISCORD_CLIENT_ID")
                .expect("DISCORD_CLIENT_ID environment variable is required"),
            discord_client_secret: var("DISCORD_CLIENT_SECRET")
                .expect("DISCORD_CLIENT_SECRET environment variable is required"),
            server_timeout_ms: env_or_default("SERVER_TIMEOUT_MS", DEFAULT_SERVER_TIMEOUT_MS),
            stats_sample_interval_ms: env_or_default(
                "STATS_SAMPLE_INTERVAL_MS",
                DEFAULT_SAMPLE_INTERVAL_MS,
            ),
            rate_limit_heartbeat_per_sec: env_or_default("RATE_LIMIT_HEARTBEAT_PER_SEC", 50),
            rate_limit_heartbeat_burst: env_or_default("RATE_LIMIT_HEARTBEAT_BURST", 100),
            rate_limit_auth_per_min: env_or_default("RATE_LIMIT_AUTH_PER_MIN", 10),
            rate_limit_auth_burst: env_or_default("RATE_LIMIT_AUTH_BURST", 5),
            rate_limit_general_per_sec: env_or_default("RATE_LIMIT_GENERAL_PER_SEC", 10),
            rate_limit_general_burst: env_or_default("RATE_LIMIT_GENERAL_BURST", 20),
        }
    }

    /// Create configuration with all default values (tests, mostly)
    pub fn default() -> Self {
        Self {
            request_body_limit: 64 * 1024,
            request_timeout: Duration::from_secs(30),
            port: 3000,
            database_path: "waypoint.db".to_string(),
            jwt_secret: "waypoint-insecure-test-secret".to_string(),
            stats_csv_path: "data/stats.csv".to_string(),
            public_url: "http://localhost:3000".to_string(),
            discord_client_id: String::new(),
            discord_client_secret: String::new(),
            server_timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
            stats_sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            rate_limit_heartbeat_per_sec: 50,
            rate_limit_heartbeat_burst: 100,
            rate_limit_auth_per_min: 10,
            rate_limit_auth_burst: 5,
            rate_limit_general_per_sec: 10,
            rate_limit_general_burst: 20,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.request_body_limit, 64 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_path, "waypoint.db");
        assert_eq!(config.server_timeout_ms, DEFAULT_SERVER_TIMEOUT_MS);
        assert_eq!(config.server_timeout_ms, 10_000);
        assert_eq!(config.stats_sample_interval_ms, DEFAULT_SAMPLE_INTERVAL_MS);
        assert_eq!(config.stats_sample_interval_ms, 60_000);
        assert_eq!(config.rate_limit_heartbeat_per_sec, 50);
        assert_eq!(config.rate_limit_auth_per_min, 10);
        assert_eq!(config.rate_limit_general_per_sec, 10);
    }
}
