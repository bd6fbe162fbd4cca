use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::limits::{DEFAULT_SLOT_STEP_MINUTES, DEFAULT_TOKEN_TTL_MINUTES};

/// Process configuration, read from `CHAIRBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub token_secret: String,
    pub token_ttl_minutes: u32,
    pub slot_step_minutes: u32,
    pub sweep_interval: Duration,
    pub cleanup_interval: Duration,
    pub compact_threshold: u64,
    /// Base URL used in confirmation links.
    pub public_url: String,
    pub metrics_port: Option<u16>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_or("CHAIRBOOK_PORT", 8080u16);
        let token_secret = std::env::var("CHAIRBOOK_TOKEN_SECRET").unwrap_or_else(|_| {
            tracing::warn!("CHAIRBOOK_TOKEN_SECRET not set, using an insecure development secret");
            "chairbook-dev-secret".into()
        });
        Self {
            bind: std::env::var("CHAIRBOOK_BIND").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            data_dir: PathBuf::from(
                std::env::var("CHAIRBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            ),
            token_secret,
            token_ttl_minutes: env_or("CHAIRBOOK_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES).max(1),
            slot_step_minutes: env_or("CHAIRBOOK_SLOT_STEP_MINUTES", DEFAULT_SLOT_STEP_MINUTES).max(1),
            sweep_interval: Duration::from_secs(env_or("CHAIRBOOK_SWEEP_INTERVAL_SECS", 60u64).max(1)),
            cleanup_interval: Duration::from_secs(
                env_or("CHAIRBOOK_CLEANUP_INTERVAL_SECS", 3600u64).max(1),
            ),
            compact_threshold: env_or("CHAIRBOOK_COMPACT_THRESHOLD", 1000u64),
            public_url: std::env::var("CHAIRBOOK_PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            metrics_port: std::env::var("CHAIRBOOK_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("chairbook.wal")
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            slot_step_minutes: self.slot_step_minutes,
            token_secret: self.token_secret.clone().into_bytes(),
            token_ttl_minutes: self.token_ttl_minutes,
            compact_threshold: self.compact_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparseable_values_fall_back() {
        assert_eq!(env_or("CHAIRBOOK_TEST_UNSET_VARIABLE", 42u32), 42);
    }

    #[test]
    fn engine_settings_carry_secret_and_step() {
        let config = Config {
            bind: "127.0.0.1".into(),
            port: 8080,
            data_dir: PathBuf::from("/tmp/chairbook"),
            token_secret: "abc".into(),
            token_ttl_minutes: 60,
            slot_step_minutes: 10,
            sweep_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(3600),
            compact_threshold: 10,
            public_url: "http://localhost:8080".into(),
            metrics_port: None,
        };
        let settings = config.engine_settings();
        assert_eq!(settings.token_secret, b"abc");
        assert_eq!(settings.slot_step_minutes, 10);
        assert_eq!(config.wal_path(), PathBuf::from("/tmp/chairbook/chairbook.wal"));
    }
}
