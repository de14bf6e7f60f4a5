use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::scope::TxOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub force_rollback: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = parse_or(&lookup, "PG_TX_MAX_CONNECTIONS", 5)?;
        let acquire_timeout_secs = parse_or(&lookup, "PG_TX_ACQUIRE_TIMEOUT_SECS", 30)?;
        let force_rollback = parse_or(&lookup, "PG_TX_FORCE_ROLLBACK", false)?;

        Ok(Config {
            database_url,
            max_connections,
            acquire_timeout_secs,
            force_rollback,
        })
    }

    /// Scope options implied by this configuration.
    pub fn tx_options(&self) -> TxOptions {
        TxOptions {
            force_rollback: self.force_rollback,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw)),
    }
}
