//! Configuration loading and representation.
//!
//! Environment variables:
//! - `DEEDBANK_BIND_ADDR`: HTTP listen address (default `0.0.0.0:8080`)
//! - `DATABASE_URL`: Postgres connection string; unset means the in-memory store
//! - `DEEDBANK_REDEMPTION_ATTEMPTS`: optimistic redemption attempts (default 5, >= 1)
//! - `DEEDBANK_STORE_TIMEOUT_MS`: per store call timeout (default 5000, > 0)
//! - `DEEDBANK_DEFAULT_DOLLAR_PER_POINT`: rate for children created without one (default 1.00)

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use deedbank_ledger::DollarRate;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDEMPTION_ATTEMPTS: u32 = 5;
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
}

impl ConfigError {
    fn invalid(var: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            message: message.into(),
        }
    }
}

/// Tuning for [`crate::engine::LedgerEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Read-decide-append rounds a redemption gets before it reports `Conflict`.
    pub max_redemption_attempts: u32,
    /// Upper bound on every individual store call.
    pub store_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_redemption_attempts: DEFAULT_REDEMPTION_ATTEMPTS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub ledger: LedgerConfig,
    pub default_dollar_per_point: DollarRate,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = parse_or(get("DEEDBANK_BIND_ADDR"), "DEEDBANK_BIND_ADDR", || {
            SocketAddr::from_str(DEFAULT_BIND_ADDR)
                .map_err(|e| ConfigError::invalid("DEEDBANK_BIND_ADDR", e.to_string()))
        })?;

        let max_redemption_attempts: u32 = parse_or(
            get("DEEDBANK_REDEMPTION_ATTEMPTS"),
            "DEEDBANK_REDEMPTION_ATTEMPTS",
            || Ok(DEFAULT_REDEMPTION_ATTEMPTS),
        )?;
        if max_redemption_attempts == 0 {
            return Err(ConfigError::invalid(
                "DEEDBANK_REDEMPTION_ATTEMPTS",
                "must be at least 1",
            ));
        }

        let timeout_ms: u64 = parse_or(
            get("DEEDBANK_STORE_TIMEOUT_MS"),
            "DEEDBANK_STORE_TIMEOUT_MS",
            || Ok(DEFAULT_STORE_TIMEOUT.as_millis() as u64),
        )?;
        if timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "DEEDBANK_STORE_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }

        let rate: Decimal = parse_or(
            get("DEEDBANK_DEFAULT_DOLLAR_PER_POINT"),
            "DEEDBANK_DEFAULT_DOLLAR_PER_POINT",
            || Ok(DollarRate::one().value()),
        )?;
        let default_dollar_per_point = DollarRate::new(rate)
            .map_err(|e| ConfigError::invalid("DEEDBANK_DEFAULT_DOLLAR_PER_POINT", e.to_string()))?;

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            ledger: LedgerConfig {
                max_redemption_attempts,
                store_timeout: Duration::from_millis(timeout_ms),
            },
            default_dollar_per_point,
        })
    }
}

fn parse_or<T, D>(raw: Option<String>, var: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, ConfigError>,
{
    match raw {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, format!("'{value}': {e}"))),
        None => default(),
    }
}
