use std::env;

use anyhow::{anyhow, Context};
use chrono::{FixedOffset, Offset, Utc};

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub clinic_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => 10,
        };
        let clinic_offset = match lookup("CLINIC_UTC_OFFSET") {
            Some(raw) => parse_utc_offset(&raw)?,
            None => utc(),
        };

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            clinic_offset,
        })
    }
}

const MAX_OFFSET_SECS: i32 = 14 * 3600;

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Accepts `Z`, `+HH:MM`, `-HH:MM` and `+HHMM`, at most 14 hours from UTC.
pub fn parse_utc_offset(raw: &str) -> anyhow::Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") {
        return Ok(utc());
    }

    let offset = raw
        .parse::<FixedOffset>()
        .map_err(|e| anyhow!("CLINIC_UTC_OFFSET must look like +02:00, got {raw:?}: {e}"))?;
    if offset.local_minus_utc().abs() > MAX_OFFSET_SECS {
        return Err(anyhow!("CLINIC_UTC_OFFSET is more than 14 hours from UTC: {raw:?}"));
    }
    Ok(offset)
}
