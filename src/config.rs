use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// Upper bound on a single profile fetch.
    pub profile_fetch_timeout: Duration,
    /// How long an untouched auth machine stays in the registry.
    pub auth_idle: Duration,
    /// How often the registry is swept.
    pub auth_sweep_interval: Duration,
    /// Where signed-out users are sent.
    pub sign_in_path: String,
    /// Where users without the required role are sent.
    pub landing_path: String,
    /// Whether cookies are marked `Secure`.
    pub production: bool,
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let session_duration_days: i64 = parse_var("SESSION_DURATION_DAYS", "7")?;
        if session_duration_days <= 0 {
            anyhow::bail!("SESSION_DURATION_DAYS must be positive");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: parse_var("BIND_ADDR", "127.0.0.1:3000")?,
            session_duration_days,
            profile_fetch_timeout: Duration::from_secs(parse_var("PROFILE_FETCH_TIMEOUT_SECS", "10")?),
            auth_idle: Duration::from_secs(parse_var("AUTH_IDLE_SECS", "1800")?),
            auth_sweep_interval: Duration::from_secs(parse_var("AUTH_SWEEP_INTERVAL_SECS", "60")?),
            sign_in_path: env::var("SIGN_IN_PATH").unwrap_or_else(|_| "/sign-in".to_string()),
            landing_path: env::var("LANDING_PATH").unwrap_or_else(|_| "/".to_string()),
            production: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()) == "production",
        })
    }

    /// Session lifetime in seconds, as used for Redis TTLs and cookie max-age.
    pub fn session_ttl_secs(&self) -> u64 {
        (self.session_duration_days * 86400) as u64
    }
}
