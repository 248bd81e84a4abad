use super::{Store, StoreTx};
use crate::error::DBError;
use crate::models::{self, reading as reading_model, sensor as sensor_model};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensor_core::{
    AggregateFunction, Bucket, BucketSize, Reading, Sensor, SensorSpec, SensorStatistic,
    TimeRange, Upserted,
};
use sqlx::{PgPool, Postgres, Transaction};

pub struct PgStore {
    db_conn: PgPool,
}

impl PgStore {
    pub fn new(db_conn: PgPool) -> Self {
        PgStore { db_conn }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, DBError> {
        let tx = self.db_conn.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn ping(&self) -> Result<(), DBError> {
        models::check_schema(&self.db_conn).await
    }
}

/// sqlx rolls the transaction back once it is dropped uncommitted
struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn upsert_sensor(&mut self, spec: &SensorSpec) -> Result<Upserted<Sensor>, DBError> {
        Ok(match sensor_model::upsert(&mut self.tx, spec).await? {
            Upserted::Created(dao) => Upserted::Created(dao.into()),
            Upserted::Existing(dao) => Upserted::Existing(dao.into()),
        })
    }

    async fn sensor(&mut self, sensor_id: &str) -> Result<Sensor, DBError> {
        Ok(sensor_model::get(&mut self.tx, sensor_id).await?.into())
    }

    async fn sensors(&mut self) -> Result<Vec<Sensor>, DBError> {
        let mut daos = sensor_model::read(&mut self.tx).await?;
        Ok(daos.drain(..).map(Sensor::from).collect())
    }

    async fn insert_reading(&mut self, reading: &Reading) -> Result<bool, DBError> {
        reading_model::insert(&mut self.tx, reading).await
    }

    async fn query_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        after: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> Result<Vec<Reading>, DBError> {
        if !sensor_model::exists(&mut self.tx, sensor_id).await? {
            return Err(DBError::SensorNotFound(sensor_id.to_owned()));
        }
        let mut daos = reading_model::get(&mut self.tx, sensor_id, range, after, limit).await?;
        Ok(daos.drain(..).map(Reading::from).collect())
    }

    async fn aggregate_readings(
        &mut self,
        sensor_id: &str,
        range: &TimeRange,
        size: BucketSize,
        function: AggregateFunction,
    ) -> Result<Vec<Bucket>, DBError> {
        if !sensor_model::exists(&mut self.tx, sensor_id).await? {
            return Err(DBError::SensorNotFound(sensor_id.to_owned()));
        }
        let daos = reading_model::aggregate(&mut self.tx, sensor_id, range, size, function).await?;
        Ok(daos.into_iter().filter_map(|dao| dao.into_bucket()).collect())
    }

    async fn summarize_readings(
        &mut self,
        sensor_ids: &[String],
        range: &TimeRange,
        function: AggregateFunction,
    ) -> Result<Vec<SensorStatistic>, DBError> {
        let daos = reading_model::summarize(&mut self.tx, sensor_ids, range, function).await?;
        Ok(daos.into_iter().filter_map(|dao| dao.into_statistic()).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), DBError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DBError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
