//! Application configuration loaded from environment variables.

use std::str::FromStr;

use contract_ledger::{LedgerPolicy, OverrunPolicy};

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) to refresh the current month's allocation; 0 disables it
    pub allocation_interval_secs: u64,
    /// Overrun handling applied to every contract ledger
    pub policy: LedgerPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./contract_ledger.db".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 3001)?,
            allocation_interval_secs: parse_or(&lookup, "ALLOCATION_INTERVAL_SECS", 3600)?,
            policy: LedgerPolicy {
                reduction_overrun: parse_or(&lookup, "REDUCTION_OVERRUN", OverrunPolicy::Reject)?,
                estimate_overrun: parse_or(&lookup, "ESTIMATE_OVERRUN", OverrunPolicy::Reject)?,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ServiceError::Config(format!("Invalid {key}: `{raw}`"))),
    }
}
