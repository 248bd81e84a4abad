use crate::error::CoreError;
use crate::range::TimeRange;
use crate::reading::{from_micros, Reading};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Min,
    Max,
    Avg,
    Count,
    Sum,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
        }
    }
}

impl std::str::FromStr for AggregateFunction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "avg" | "average" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            other => Err(CoreError::InvalidFunction(format!(
                "'{}', use one of min, max, avg, count, sum",
                other
            ))),
        }
    }
}

/// Streaming state of one bucket
#[derive(Debug, Clone)]
pub struct Aggregator {
    function: AggregateFunction,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Aggregator {
    pub fn new(function: AggregateFunction) -> Self {
        Aggregator {
            function,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` while nothing was added
    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        Some(match self.function {
            AggregateFunction::Min => self.min,
            AggregateFunction::Max => self.max,
            AggregateFunction::Avg => self.sum / self.count as f64,
            AggregateFunction::Count => self.count as f64,
            AggregateFunction::Sum => self.sum,
        })
    }
}

/// Width of an aggregation bucket, always positive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSize {
    micros: i64,
}

impl BucketSize {
    pub fn new(width: Duration) -> Result<Self, CoreError> {
        match width.num_microseconds() {
            Some(micros) if micros > 0 => Ok(BucketSize { micros }),
            _ => Err(CoreError::InvalidBucket(format!(
                "{} seconds, the bucket must be positive",
                width.num_seconds()
            ))),
        }
    }

    pub fn width(&self) -> Duration {
        Duration::microseconds(self.micros)
    }

    /// Bucket boundaries are multiples of the width counted from the epoch,
    /// independent of any query window
    pub fn start_of(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        from_micros(self.start_micros(timestamp)).unwrap_or(timestamp)
    }

    fn start_micros(&self, timestamp: DateTime<Utc>) -> i64 {
        let micros = timestamp.timestamp_micros();
        micros.div_euclid(self.micros) * self.micros
    }

    pub fn micros(&self) -> i64 {
        self.micros
    }

    /// Number of aligned buckets the range touches, saturating at `i64::MAX`
    pub fn count_within(&self, range: &TimeRange) -> i64 {
        if range.is_empty() {
            return 0;
        }
        let first = self.start_micros(range.from()) as i128;
        let last = self.start_micros(range.until() - Duration::microseconds(1)) as i128;
        let count = (last - first) / self.micros as i128 + 1;
        i64::try_from(count).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub value: f64,
}

/// One statistic over all readings of a sensor within a range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorStatistic {
    pub sensor_id: String,
    pub value: f64,
    /// Readings the value was computed from
    pub count: i64,
}

/// Groups readings into epoch aligned buckets
///
/// Only buckets holding at least one reading are returned, ascending by start.
pub fn downsample<'a, I>(readings: I, size: BucketSize, function: AggregateFunction) -> Vec<Bucket>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut buckets: BTreeMap<i64, Aggregator> = BTreeMap::new();
    for reading in readings {
        buckets
            .entry(size.start_micros(reading.timestamp))
            .or_insert_with(|| Aggregator::new(function))
            .add(reading.value);
    }

    buckets
        .into_iter()
        .filter_map(|(start, aggregator)| {
            Some(Bucket {
                start: from_micros(start)?,
                value: aggregator.value()?,
            })
        })
        .collect()
}
