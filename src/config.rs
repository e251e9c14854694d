use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;
use crate::remote::RemoteConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// `None` runs offline-only.
    pub remote: Option<RemoteConfig>,
    pub poll_interval: Duration,
    pub push_timeout: Duration,
    /// `None` disables the reachability probe.
    pub probe_interval: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://school_sync.db?mode=rwc".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR: {}", e)))?;

        let probe_secs = secs_from_env("CONNECTIVITY_PROBE_SECS", 10)?;

        Ok(Self {
            database_url,
            bind_addr,
            remote: RemoteConfig::new_from_env(),
            poll_interval: Duration::from_secs(secs_from_env("SYNC_POLL_INTERVAL_SECS", 30)?.max(1)),
            push_timeout: Duration::from_secs(secs_from_env("PUSH_TIMEOUT_SECS", 15)?.max(1)),
            probe_interval: (probe_secs > 0).then(|| Duration::from_secs(probe_secs)),
        })
    }
}

fn secs_from_env(key: &str, default: u64) -> Result<u64, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::Config(format!("{} must be a whole number of seconds, got {:?}", key, raw))),
        Err(_) => Ok(default),
    }
}
