// src/config.rs

use std::env;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dotenvy::dotenv;

#[derive(Debug, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub log_dir: String,
    pub bind_addr: String,
    /// Directory of raw post documents to ingest at startup.
    pub ingest_dir: Option<PathBuf>,
    /// Scrape time applied to every document of the startup batch.
    /// When unset, each file's modification time is used.
    pub ingest_observed_at: Option<DateTime<Utc>>,
    pub ingest_concurrency: usize,
    pub store_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://postledger.db?mode=rwc".to_string(),
            rust_log: "info".to_string(),
            log_dir: "logs".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            ingest_dir: None,
            ingest_observed_at: None,
            ingest_concurrency: 4,
            store_max_connections: 1,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let defaults = Self::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);
        let rust_log = env::var("RUST_LOG").unwrap_or(defaults.rust_log);
        let log_dir = env::var("LOG_DIR").unwrap_or(defaults.log_dir);
        let bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);

        let ingest_dir = env::var("INGEST_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        let ingest_observed_at = match env::var("INGEST_OBSERVED_AT") {
            Ok(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| ConfigError {
                        key: "INGEST_OBSERVED_AT",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?
                    .with_timezone(&Utc),
            ),
            Err(_) => None,
        };

        let ingest_concurrency =
            parse_positive("INGEST_CONCURRENCY", defaults.ingest_concurrency)?;
        let store_max_connections =
            parse_positive("STORE_MAX_CONNECTIONS", defaults.store_max_connections)?;

        Ok(Self {
            database_url,
            rust_log,
            log_dir,
            bind_addr,
            ingest_dir,
            ingest_observed_at,
            ingest_concurrency,
            store_max_connections,
        })
    }
}

fn parse_positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };

    let value = raw.trim().parse::<T>().map_err(|e| ConfigError {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;

    if value < T::from(1) {
        return Err(ConfigError {
            key,
            value: raw,
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(value)
}
