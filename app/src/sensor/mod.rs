pub mod cursor;
mod ingest;
mod query;
#[cfg(test)]
mod test;

pub use ingest::{IngestPipeline, IngestPolicy, IngestReading, IngestSummary, RejectedReading};
pub use query::{QueryEngine, QueryPolicy, ReadingPage};

use crate::error::ServiceError;
use crate::store::Store;
use sensor_core::{Sensor, SensorSpec, Upserted};
use std::sync::Arc;
use tracing::{error, info};

/// Entry point of the request handlers, owns the pipelines over one store
pub struct SensorService {
    store: Arc<dyn Store>,
    ingest: IngestPipeline,
    query: QueryEngine,
}

impl SensorService {
    pub fn new(
        store: Arc<dyn Store>,
        ingest_policy: IngestPolicy,
        query_policy: QueryPolicy,
    ) -> Arc<Self> {
        Arc::new(SensorService {
            ingest: IngestPipeline::new(store.clone(), ingest_policy),
            query: QueryEngine::new(store.clone(), query_policy),
            store,
        })
    }

    pub fn ingest(&self) -> &IngestPipeline {
        &self.ingest
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    /// Creates the sensor or updates the metadata of an existing one
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, spec: SensorSpec) -> Result<Upserted<Sensor>, ServiceError> {
        let spec = ingest::validate_spec(spec).map_err(ServiceError::Validation)?;

        let mut tx = self.store.begin().await?;
        let upserted = tx.upsert_sensor(&spec).await?;
        tx.commit().await?;

        if upserted.is_created() {
            info!(sensor_id = %spec.id, "Registered new sensor");
        }
        Ok(upserted)
    }

    pub async fn sensor(&self, sensor_id: &str) -> Result<Sensor, ServiceError> {
        ingest::validate_sensor_id(sensor_id).map_err(ServiceError::Validation)?;
        let mut tx = self.store.begin().await?;
        let sensor = tx.sensor(sensor_id).await?;
        tx.rollback().await?;
        Ok(sensor)
    }

    pub async fn sensors(&self) -> Result<Vec<Sensor>, ServiceError> {
        let mut tx = self.store.begin().await?;
        let sensors = tx.sensors().await?;
        tx.rollback().await?;
        Ok(sensors)
    }

    pub async fn check_db(&self) -> String {
        match self.store.ping().await {
            Ok(()) => "healthy".to_owned(),
            Err(err) => {
                error!(error = %err, "Database is unreachable");
                "unreachable".to_owned()
            }
        }
    }
}
