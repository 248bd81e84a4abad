use super::{Store, StoreTx};
use crate::error::DBError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensor_core::aggregate::downsample;
use sensor_core::{
    AggregateFunction, Aggregator, Bucket, BucketSize, Reading, Sensor, SensorSpec,
    SensorStatistic, TimeRange, Upserted,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
struct MockState {
    sensors: BTreeMap<String, Sensor>,
    readings: BTreeMap<(String, DateTime<Utc>), Reading>,
}

/// In-memory store with the uniqueness and rollback behaviour of the
/// postgres one, transactions are serialized
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
    failing: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MockStore::default())
    }

    /// Every following `begin` fails like an unreachable database
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn reading_count(&self) -> usize {
        self.state.lock().await.readings.len()
    }

    pub async fn sensor_count(&self) -> usize {
        self.state.lock().await.sensors.len()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DBError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DBError::SQLError(sqlx::Error::PoolTimedOut));
        }
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MockStoreTx { guard, working }))
    }

    async fn ping(&self) -> Result<(), DBError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DBError::SQLError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

struct MockStoreTx {
    guard: OwnedMutexGuard<MockState>,
    working: MockState,
}

fn apply(target: &mut Option<String>, requested: &Option<String>) {
    if requested.is_some() {
        *target = requested.clone();
    }
}

#[async_trait]
impl StoreTx for MockStoreTx {
    async fn upsert_sensor(&mut self, spec: &SensorSpec) -> Result<Upserted<Sensor>, DBError> {
        match self.working.sensors.get_mut(&spec.id) {
            None => {
                let sensor = Sensor {
                    id: spec.id.clone(),
                    name: spec.name.clone(),
                    unit: spec.unit.clone(),
                    location: spec.location.clone(),
                    created_at: Utc::now(),
                };
                self.working
                    .sensors
                    .insert(spec.id.clone(), sensor.clone());
                Ok(Upserted::Created(sensor))
            }
            Some(sensor) => {
                if let (Some(stored), Some(requested)) = (&sensor.unit, &spec.unit) {
                    if stored != requested {
                        return Err(DBError::UnitConflict {
                            id: spec.id.clone(),
                            stored: stored.clone(),
                            requested: requested.clone(),
                        });
                    }
                }
                apply(&mut sensor.name, &spec.name);
                apply(&mut sensor.unit, &spec.unit);
                apply(&mut sensor.location, &spec.location);
                Ok(Upserted::Existing(sensor.clone()))
            }
        }
    }

    async fn sensor(&mut self, sensor_id: &str) -> Result<Sensor, DBError> {
        self.working
            .sensors
            .get(sensor_id)
            .cloned()
            .ok_or_else(|| DBError::SensorNotFound(sensor_id.to_owned()))
    }

    async fn sensors(&mut self) -> Result<Vec<Sensor>, DBError> {
        Ok(self.working.sensors.values().cloned().collect())
    }

    async fn insert_reading(&mut self, reading: &Reading) -> Result<bool, DBError> {
        if !self.working.sensors.contains_key(&reading.sensor_id) {
            // mirrors the foreign key violation
            return Err(DBError::SQLError(sqlx::Error::RowNotFound));
        }
        let key = (reading.sensor_id.clone(), reading.timestamp);
        if self.working.readings.contains_key(&key) {
            return Ok(false);
        }
        self.working.readings.insert(key, reading.clone());
        Ok(true)
    }

    async fn query_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        after: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Reading>, DBError> {
        if !self.working.sensors.contains_key(sensor_id) {
            return Err(DBError::SensorNotFound(sensor_id.to_owned()));
        }
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        let from = (sensor_id.to_owned(), range.from());
        let until = (sensor_id.to_owned(), range.until());
        Ok(self
            .working
            .readings
            .range(from..until)
            .map(|(_, reading)| reading)
            .filter(|reading| after.map_or(true, |after| reading.timestamp > after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn aggregate_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        size: BucketSize,
        function: AggregateFunction,
    ) -> Result<Vec<Bucket>, DBError> {
        let readings = self.query_readings(sensor_id, range, None, None).await?;
        Ok(downsample(&readings, size, function))
    }

    async fn summarize_readings(
        &mut self,
        sensor_ids: &[String],
        range: &TimeRange,
        function: AggregateFunction,
    ) -> Result<Vec<SensorStatistic>, DBError> {
        let mut statistics: BTreeMap<&str, Aggregator> = BTreeMap::new();
        let selected = self
            .working
            .readings
            .values()
            .filter(|reading| sensor_ids.is_empty() || sensor_ids.contains(&reading.sensor_id))
            .filter(|reading| range.contains(reading.timestamp));
        for reading in selected {
            statistics
                .entry(reading.sensor_id.as_str())
                .or_insert_with(|| Aggregator::new(function))
                .add(reading.value);
        }

        Ok(statistics
            .into_iter()
            .filter_map(|(sensor_id, aggregator)| {
                Some(SensorStatistic {
                    sensor_id: sensor_id.to_owned(),
                    value: aggregator.value()?,
                    count: aggregator.count() as i64,
                })
            })
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), DBError> {
        let MockStoreTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DBError> {
        Ok(())
    }
}
