// src/config.rs

use std::env;

use chrono::{FixedOffset, Offset, Utc};
use dotenvy::dotenv;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres document store. The in-memory store is used when absent.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    /// Offset that defines "calendar day" and "time of day" for release
    /// times and daily auto-tests.
    pub utc_offset: FixedOffset,
    /// Tick of the background auto-submit sweep.
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let jwt_expiration = parse_var("JWT_EXPIRATION", 3600)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let port = parse_var("PORT", 3000)?;

        let offset_minutes: i32 = parse_var("UTC_OFFSET_MINUTES", 0)?;
        let utc_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::Invalid {
                name: "UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let sweep_interval_secs: u64 = parse_var("SWEEP_INTERVAL_SECS", 30)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            utc_offset,
            sweep_interval_secs,
        })
    }

    /// Configuration used by tests and local tooling: in-memory store, UTC.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            port: 0,
            utc_offset: Utc.fix(),
            sweep_interval_secs: 30,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}
