use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Largest accepted bucket width, one century
const MAX_BUCKET_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Longest look back of the statistics
const MAX_DAYS: i64 = 31;

/// Query string of the reading list
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

/// Query string of the aggregation
#[derive(Debug, Default, Deserialize)]
pub struct AggregateQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub bucket: Option<String>,
    #[serde(rename = "fn")]
    pub function: Option<String>,
}

/// Years a wire timestamp may fall into, the four digit years of RFC 3339
const WIRE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Query string of the per sensor statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub sensors: Option<String>,
    pub stat: Option<String>,
    pub days: Option<String>,
}

/// Comma separated ids, trimmed, in order of first appearance.
/// Empty means all sensors.
pub fn parse_sensor_list(raw: Option<&str>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.unwrap_or_default().split(',').map(str::trim) {
        if !id.is_empty() && !ids.iter().any(|known| known == id) {
            ids.push(id.to_owned());
        }
    }
    ids
}

/// Days back from now, one if absent
pub fn parse_days(raw: Option<&str>) -> Result<Duration, String> {
    let days = match raw {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("Invalid 'days': '{}'", raw))?,
        None => 1,
    };
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(format!("'days' must be between 1 and {}", MAX_DAYS));
    }
    Ok(Duration::days(days))
}

/// Either integer Unix seconds or an RFC 3339 string
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return from_unix_secs(secs);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| format!("'{}' is neither Unix seconds nor RFC 3339", raw))
        .and_then(within_wire_years)
}

pub fn from_unix_secs(secs: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("Unix timestamp {} is out of range", secs))
        .and_then(within_wire_years)
}

fn within_wire_years(timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    if !WIRE_YEARS.contains(&timestamp.year()) {
        return Err(format!(
            "{} is outside of the years {} to {}",
            timestamp.to_rfc3339(),
            WIRE_YEARS.start(),
            WIRE_YEARS.end()
        ));
    }
    Ok(timestamp)
}

pub fn parse_optional_timestamp(
    field: &str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(|raw| parse_timestamp(raw).map_err(|e| format!("Invalid '{}': {}", field, e)))
        .transpose()
}

/// Integer seconds, optionally suffixed by `s`, `m`, `h` or `d`
pub fn parse_bucket(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (number, unit_secs) = match raw.char_indices().last() {
        Some((idx, 's')) => (&raw[..idx], 1),
        Some((idx, 'm')) => (&raw[..idx], 60),
        Some((idx, 'h')) => (&raw[..idx], 60 * 60),
        Some((idx, 'd')) => (&raw[..idx], 24 * 60 * 60),
        _ => (raw, 1),
    };
    let count: i64 = number
        .parse()
        .map_err(|_| format!("Invalid 'bucket': '{}'", raw))?;
    match count.checked_mul(unit_secs) {
        Some(secs) if secs <= 0 => Err("'bucket' must be positive".to_owned()),
        Some(secs) if secs <= MAX_BUCKET_SECS => Ok(Duration::seconds(secs)),
        _ => Err(format!("'bucket' is larger than {} seconds", MAX_BUCKET_SECS)),
    }
}

pub fn parse_limit(raw: Option<&str>) -> Result<Option<i64>, String> {
    raw.map(|raw| {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| format!("Invalid 'limit': '{}'", raw))
    })
    .transpose()
}
