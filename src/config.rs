//! Process-wide configuration, fixed at startup.
//!
//! The signing secret, token TTL and cookie carrier name are read once from the
//! environment and handed to component constructors. Nothing here is mutable at
//! runtime and no module reads the environment after startup.

use anyhow::{anyhow, Result};
use tracing::warn;

/// Default development secret. Real deployments must set EVENTLINE_JWT_SECRET.
const DEV_SECRET: &str = "eventline-dev-secret";

/// Token and carrier settings consumed by the identity components.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC signing secret for session tokens.
    pub secret: String,
    /// Seconds a token stays valid after issuance.
    pub ttl_secs: i64,
    /// Name of the cookie that carries the token.
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { secret: DEV_SECRET.to_string(), ttl_secs: 1800, cookie_name: "JWT".to_string() }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Root folder for the Parquet-backed stores.
    pub db_root: String,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self { http_port: 8000, db_root: "data".to_string(), auth: AuthConfig::default() }
    }
}

impl Config {
    /// Load configuration from EVENTLINE_* environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        if let Ok(port) = std::env::var("EVENTLINE_HTTP_PORT") {
            cfg.http_port = port
                .parse()
                .map_err(|_| anyhow!("EVENTLINE_HTTP_PORT is not a valid port: {}", port))?;
        }
        if let Ok(root) = std::env::var("EVENTLINE_DB_FOLDER") {
            cfg.db_root = root;
        }
        match std::env::var("EVENTLINE_JWT_SECRET") {
            Ok(s) if !s.trim().is_empty() => cfg.auth.secret = s,
            _ => warn!(target: "eventline::config", "EVENTLINE_JWT_SECRET unset, using development secret"),
        }
        if let Ok(ttl) = std::env::var("EVENTLINE_JWT_TTL_SECS") {
            let secs: i64 = ttl
                .parse()
                .map_err(|_| anyhow!("EVENTLINE_JWT_TTL_SECS is not a number: {}", ttl))?;
            if secs <= 0 {
                return Err(anyhow!("EVENTLINE_JWT_TTL_SECS must be positive"));
            }
            cfg.auth.ttl_secs = secs;
        }
        if let Ok(name) = std::env::var("EVENTLINE_JWT_COOKIE") {
            if !name.trim().is_empty() {
                cfg.auth.cookie_name = name;
            }
        }
        Ok(cfg)
    }
}
