use crate::error::DBError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensor_core::{
    AggregateFunction, Bucket, BucketSize, Reading, Sensor, SensorSpec, SensorStatistic,
    TimeRange, Upserted,
};

#[cfg(test)]
pub mod mock;
pub mod postgres;

pub use postgres::PgStore;

/// Transactional access to sensors and readings
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a transaction, it rolls back when dropped without `commit`
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DBError>;

    async fn ping(&self) -> Result<(), DBError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn upsert_sensor(&mut self, spec: &SensorSpec) -> Result<Upserted<Sensor>, DBError>;

    async fn sensor(&mut self, sensor_id: &str) -> Result<Sensor, DBError>;

    async fn sensors(&mut self) -> Result<Vec<Sensor>, DBError>;

    /// Idempotent, false if the (sensor, timestamp) pair already exists
    async fn insert_reading(&mut self, reading: &Reading) -> Result<bool, DBError>;

    /// Ascending by timestamp, fails for unknown sensors
    async fn query_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        after: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Reading>, DBError>;

    /// Epoch aligned buckets of `range` without empty ones, fails for unknown sensors
    async fn aggregate_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        size: BucketSize,
        function: AggregateFunction,
    ) -> Result<Vec<Bucket>, DBError>;

    /// One statistic per sensor holding readings in `range`, ordered by id.
    /// An empty `sensor_ids` selects all sensors.
    async fn summarize_readings(
        &mut self,
        sensor_ids: &[String],
        range: &TimeRange,
        function: AggregateFunction,
    ) -> Result<Vec<SensorStatistic>, DBError>;

    async fn commit(self: Box<Self>) -> Result<(), DBError>;

    async fn rollback(self: Box<Self>) -> Result<(), DBError>;
}
