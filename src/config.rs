use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use chrono::Duration;
use rand::{thread_rng, Rng};

pub struct Config {
    pub addr: SocketAddr,
    /// Unset selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub seed_file: Option<PathBuf>,
    pub department: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            addr: try_load("ATTENDANCE_ADDR", "127.0.0.1:3000")?,
            database_url: var("DATABASE_URL"),
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            token_secret: token_secret(),
            token_ttl: token_ttl("TOKEN_TTL_HOURS")?,
            seed_file: var("SEED_FILE").map(PathBuf::from),
            department: try_load("DEPARTMENT", "AIML")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        log::info!("{} not set, using default: {}", key, default);
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| format!("invalid {} value `{}`", key, raw))
}

/// One hour up to one year.
const TOKEN_TTL_HOURS: RangeInclusive<i64> = 1..=8760;

fn token_ttl(key: &str) -> anyhow::Result<Duration> {
    let hours: i64 = try_load(key, "24")?;
    if !TOKEN_TTL_HOURS.contains(&hours) {
        bail!(
            "invalid {} value `{}`: must be between {} and {} hours",
            key,
            hours,
            TOKEN_TTL_HOURS.start(),
            TOKEN_TTL_HOURS.end()
        );
    }
    Ok(Duration::hours(hours))
}

fn token_secret() -> Vec<u8> {
    match var("TOKEN_SECRET") {
        Some(secret) => secret.into_bytes(),
        None => {
            log::warn!("TOKEN_SECRET not set; tokens will not survive a restart");
            thread_rng().gen::<[u8; 32]>().to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_values_name_the_variable() {
        env::set_var("ATTENDANCE_TEST_PORT_BAD", "not-a-number");
        let err = try_load::<u16>("ATTENDANCE_TEST_PORT_BAD", "3000").unwrap_err();
        assert!(err.to_string().contains("ATTENDANCE_TEST_PORT_BAD"));
        assert_eq!(
            try_load::<u16>("ATTENDANCE_TEST_PORT_UNSET", "3000").unwrap(),
            3000
        );
    }

    #[test]
    fn token_lifetime_must_be_between_an_hour_and_a_year() {
        env::set_var("ATTENDANCE_TEST_TTL_ZERO", "0");
        let err = token_ttl("ATTENDANCE_TEST_TTL_ZERO").unwrap_err();
        assert!(err.to_string().contains("ATTENDANCE_TEST_TTL_ZERO"));

        env::set_var("ATTENDANCE_TEST_TTL_HUGE", "9223372036854775807");
        assert!(token_ttl("ATTENDANCE_TEST_TTL_HUGE").is_err());

        env::set_var("ATTENDANCE_TEST_TTL_WEEK", "168");
        assert_eq!(
            token_ttl("ATTENDANCE_TEST_TTL_WEEK").unwrap(),
            Duration::hours(168)
        );
        assert_eq!(
            token_ttl("ATTENDANCE_TEST_TTL_UNSET").unwrap(),
            Duration::hours(24)
        );
    }
}
