//! Server configuration read from the environment (and `.env`, if present).

use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:10000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://stewdy.db?mode=rwc";
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    /// Messages replayed to a connection when it joins a room.
    pub history_limit: u32,
    /// Frames buffered per connection before new ones are dropped.
    pub outbox_capacity: usize,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let history_limit: u32 = parse_or(&lookup, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        if history_limit == 0 {
            anyhow::bail!("HISTORY_LIMIT must be at least 1");
        }

        let outbox_capacity: usize = parse_or(&lookup, "OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY)?;
        if outbox_capacity == 0 {
            anyhow::bail!("OUTBOX_CAPACITY must be at least 1");
        }

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_owned());
        EnvFilter::try_new(&log_level).with_context(|| format!("invalid LOG_LEVEL: {log_level:?}"))?;

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_owned())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(Config {
            bind_addr: parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>()?)?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            history_limit,
            outbox_capacity,
            allowed_origins,
            log_level,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
