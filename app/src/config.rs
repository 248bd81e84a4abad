use crate::error::ConfigError;
use crate::sensor::{IngestPolicy, QueryPolicy};
use chrono::Duration;
use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Largest configurable window or age, in days
const MAX_DURATION_DAYS: i64 = 100 * 365;
/// Largest configurable batch, page, bucket or sensor count
const MAX_COUNT: i64 = 1_000_000;

pub struct Config {
    database_url: String,
    server_addr: SocketAddr,
    db_max_connections: u32,
    db_acquire_timeout_ms: u64,
    ingest: IngestPolicy,
    query: QueryPolicy,
}

impl Config {
    /// Reads the process environment, `.env` is loaded by the caller
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => match env::var("DATABASE_CREDENTIALS") {
                Ok(credentials) => format!("postgres://{}", credentials),
                Err(_) => return Err(ConfigError::Missing("DATABASE_URL")),
            },
        };

        let ingest_defaults = IngestPolicy::default();
        let ingest = IngestPolicy {
            max_batch_size: env_or("INGEST_MAX_BATCH_SIZE", ingest_defaults.max_batch_size)?,
            clock_skew: env_duration(
                "INGEST_CLOCK_SKEW_MS",
                Duration::try_milliseconds,
                ingest_defaults.clock_skew.num_milliseconds(),
                Duration::zero()..=Duration::days(1),
            )?,
            max_age: match env_opt::<i64>("INGEST_MAX_AGE_SECS")? {
                Some(secs) => Some(bounded_duration(
                    "INGEST_MAX_AGE_SECS",
                    Duration::try_seconds,
                    secs,
                    Duration::seconds(1)..=Duration::days(MAX_DURATION_DAYS),
                )?),
                None => None,
            },
        };

        let query_defaults = QueryPolicy::default();
        let query = QueryPolicy {
            default_limit: env_or("QUERY_DEFAULT_LIMIT", query_defaults.default_limit)?,
            max_limit: env_or("QUERY_MAX_LIMIT", query_defaults.max_limit)?,
            max_buckets: env_or("QUERY_MAX_BUCKETS", query_defaults.max_buckets)?,
            max_sensors: env_or("QUERY_MAX_SENSORS", query_defaults.max_sensors)?,
            default_window: env_duration(
                "QUERY_DEFAULT_WINDOW_SECS",
                Duration::try_seconds,
                query_defaults.default_window.num_seconds(),
                Duration::seconds(1)..=Duration::days(MAX_DURATION_DAYS),
            )?,
        };
        check_policies(&ingest, &query)?;

        Ok(Config {
            database_url,
            server_addr: env_or("SERVER_ADDR", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            db_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            db_acquire_timeout_ms: env_or("DATABASE_ACQUIRE_TIMEOUT_MS", 5000)?,
            ingest,
            query,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
    }

    pub fn db_acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.db_acquire_timeout_ms)
    }

    pub fn ingest_policy(&self) -> IngestPolicy {
        self.ingest.clone()
    }

    pub fn query_policy(&self) -> QueryPolicy {
        self.query.clone()
    }
}

/// Rejects limits the request paths cannot work with
fn check_policies(ingest: &IngestPolicy, query: &QueryPolicy) -> Result<(), ConfigError> {
    if ingest.max_batch_size == 0 || ingest.max_batch_size > MAX_COUNT as usize {
        return Err(ConfigError::Invalid(
            "INGEST_MAX_BATCH_SIZE",
            ingest.max_batch_size.to_string(),
        ));
    }
    if query.max_limit < 1 || query.max_limit > MAX_COUNT {
        return Err(ConfigError::Invalid("QUERY_MAX_LIMIT", query.max_limit.to_string()));
    }
    if query.default_limit < 1 || query.default_limit > query.max_limit {
        return Err(ConfigError::Invalid(
            "QUERY_DEFAULT_LIMIT",
            query.default_limit.to_string(),
        ));
    }
    if query.max_buckets < 1 || query.max_buckets > MAX_COUNT {
        return Err(ConfigError::Invalid(
            "QUERY_MAX_BUCKETS",
            query.max_buckets.to_string(),
        ));
    }
    if query.max_sensors == 0 || query.max_sensors > MAX_COUNT as usize {
        return Err(ConfigError::Invalid(
            "QUERY_MAX_SENSORS",
            query.max_sensors.to_string(),
        ));
    }
    Ok(())
}

fn bounded_duration(
    key: &'static str,
    to_duration: fn(i64) -> Option<Duration>,
    raw: i64,
    bounds: RangeInclusive<Duration>,
) -> Result<Duration, ConfigError> {
    match to_duration(raw) {
        Some(duration) if bounds.contains(&duration) => Ok(duration),
        _ => Err(ConfigError::Invalid(key, raw.to_string())),
    }
}

fn env_duration(
    key: &'static str,
    to_duration: fn(i64) -> Option<Duration>,
    default: i64,
    bounds: RangeInclusive<Duration>,
) -> Result<Duration, ConfigError> {
    bounded_duration(key, to_duration, env_or(key, default)?, bounds)
}

fn env_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(None),
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(env_opt(key)?.unwrap_or(default))
}
