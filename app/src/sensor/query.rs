use super::cursor::Cursor;
use crate::error::ServiceError;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use super::ingest::validate_sensor_id;
use sensor_core::{AggregateFunction, Bucket, BucketSize, Reading, SensorStatistic, TimeRange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
pub struct QueryPolicy {
    pub default_limit: i64,
    pub max_limit: i64,
    pub max_buckets: i64,
    /// Most sensors one statistics request may name
    pub max_sensors: usize,
    /// Width of the range if the caller omits `from`
    pub default_window: Duration,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        QueryPolicy {
            default_limit: 100,
            max_limit: 1000,
            max_buckets: 10_000,
            max_sensors: 100,
            default_window: Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReadingPage {
    pub readings: Vec<Reading>,
    /// Pass as `cursor` to fetch the following page, absent on the last one
    pub next_cursor: Option<String>,
}

pub struct QueryEngine {
    store: Arc<dyn Store>,
    policy: QueryPolicy,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Store>, policy: QueryPolicy) -> Self {
        QueryEngine { store, policy }
    }

    /// Fills in the open ends of a requested range
    pub fn range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<TimeRange, ServiceError> {
        let until = to.unwrap_or(now);
        let from = match from {
            Some(from) => from,
            None => until
                .checked_sub_signed(self.policy.default_window)
                .ok_or_else(|| ServiceError::Validation("'to' is out of range".to_owned()))?,
        };
        Ok(TimeRange::new(from, until)?)
    }

    #[tracing::instrument(skip(self, cursor))]
    pub async fn readings(
        &self,
        sensor_id: &str,
        range: TimeRange,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> Result<ReadingPage, ServiceError> {
        let limit = limit.unwrap_or(self.policy.default_limit);
        if limit < 1 || limit > self.policy.max_limit {
            return Err(ServiceError::Validation(format!(
                "limit must be between 1 and {}",
                self.policy.max_limit
            )));
        }
        let after = match cursor {
            Some(token) => Some(Cursor::decode(token)?.position_for(sensor_id)?),
            None => None,
        };

        let mut tx = self.store.begin().await?;
        let mut readings = tx
            .query_readings(sensor_id, &range, after, Some(limit.saturating_add(1)))
            .await?;
        tx.rollback().await?;

        let next_cursor = if readings.len() as i64 > limit {
            readings.truncate(limit as usize);
            readings
                .last()
                .map(|last| Cursor::new(sensor_id, last.timestamp).encode())
                .transpose()?
        } else {
            None
        };
        debug!(count = readings.len(), more = next_cursor.is_some(), "Read page");
        Ok(ReadingPage {
            readings,
            next_cursor,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn aggregate(
        &self,
        sensor_id: &str,
        range: TimeRange,
        bucket: Duration,
        function: AggregateFunction,
    ) -> Result<Vec<Bucket>, ServiceError> {
        let size = BucketSize::new(bucket)?;
        let bucket_count = size.count_within(&range);
        if bucket_count > self.policy.max_buckets {
            return Err(ServiceError::Validation(format!(
                "Range spans {} buckets, at most {} are allowed",
                bucket_count, self.policy.max_buckets
            )));
        }

        let mut tx = self.store.begin().await?;
        let buckets = tx
            .aggregate_readings(sensor_id, &range, size, function)
            .await?;
        tx.rollback().await?;

        debug!(buckets = buckets.len(), "Aggregated");
        Ok(buckets)
    }

    /// One statistic per sensor over the whole range
    ///
    /// Results follow the order of `sensor_ids`, all sensors ordered by id if
    /// it is empty. Sensors without readings in the range are left out.
    #[tracing::instrument(skip(self))]
    pub async fn statistics(
        &self,
        sensor_ids: &[String],
        range: TimeRange,
        function: AggregateFunction,
    ) -> Result<Vec<SensorStatistic>, ServiceError> {
        if sensor_ids.len() > self.policy.max_sensors {
            return Err(ServiceError::Validation(format!(
                "At most {} sensors may be requested at once",
                self.policy.max_sensors
            )));
        }
        for sensor_id in sensor_ids {
            validate_sensor_id(sensor_id).map_err(ServiceError::Validation)?;
        }

        let mut tx = self.store.begin().await?;
        let mut statistics = tx.summarize_readings(sensor_ids, &range, function).await?;
        tx.rollback().await?;

        if !sensor_ids.is_empty() {
            statistics.sort_by_key(|statistic| {
                sensor_ids
                    .iter()
                    .position(|id| *id == statistic.sensor_id)
                    .unwrap_or(usize::MAX)
            });
        }
        debug!(sensors = statistics.len(), "Summarized");
        Ok(statistics)
    }

    /// Statistic of a single sensor, `None` without readings in the range
    #[tracing::instrument(skip(self))]
    pub async fn statistic(
        &self,
        sensor_id: &str,
        range: TimeRange,
        function: AggregateFunction,
    ) -> Result<Option<SensorStatistic>, ServiceError> {
        validate_sensor_id(sensor_id).map_err(ServiceError::Validation)?;
        let ids = [sensor_id.to_owned()];

        let mut tx = self.store.begin().await?;
        tx.sensor(sensor_id).await?;
        let statistics = tx.summarize_readings(&ids, &range, function).await?;
        tx.rollback().await?;

        Ok(statistics.into_iter().next())
    }
}
