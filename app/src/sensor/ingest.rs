use crate::error::ServiceError;
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use sensor_core::reading::store_precision;
use sensor_core::{Quality, Reading, SensorSpec, Upserted};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

const MAX_SENSOR_ID_LEN: usize = 128;
const MAX_METADATA_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub max_batch_size: usize,
    /// How far a reading may lie ahead of the server clock
    pub clock_skew: Duration,
    /// Oldest acceptable reading, unbounded if `None`
    pub max_age: Option<Duration>,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        IngestPolicy {
            max_batch_size: 1000,
            clock_skew: Duration::seconds(5),
            max_age: None,
        }
    }
}

/// A reading as submitted, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReading {
    pub sensor: SensorSpec,
    /// Server time if absent
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
    pub quality: Option<Quality>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RejectedReading {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestSummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: Vec<RejectedReading>,
}

pub struct IngestPipeline {
    store: Arc<dyn Store>,
    policy: IngestPolicy,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn Store>, policy: IngestPolicy) -> Self {
        IngestPipeline { store, policy }
    }

    /// Validates and persists a batch in one transaction
    ///
    /// All or nothing: a single invalid reading rejects the batch and
    /// nothing is written.
    #[tracing::instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn ingest(&self, batch: Vec<IngestReading>) -> Result<IngestSummary, ServiceError> {
        self.ingest_at(batch, Utc::now()).await
    }

    pub(crate) async fn ingest_at(
        &self,
        batch: Vec<IngestReading>,
        now: DateTime<Utc>,
    ) -> Result<IngestSummary, ServiceError> {
        if batch.is_empty() {
            return Err(ServiceError::Validation(
                "At least one reading is required".to_owned(),
            ));
        }
        if batch.len() > self.policy.max_batch_size {
            return Err(ServiceError::Validation(format!(
                "Batch of {} readings exceeds the limit of {}",
                batch.len(),
                self.policy.max_batch_size
            )));
        }

        let (readings, sensors) = self.validate_batch(batch, now)?;

        let mut tx = self.store.begin().await?;
        // ascending ids keep the row lock order equal across transactions
        for spec in sensors.values() {
            if let Upserted::Created(sensor) = tx.upsert_sensor(spec).await? {
                info!(sensor_id = %sensor.id, "Registered new sensor");
            }
        }

        let mut summary = IngestSummary::default();
        for reading in readings.iter() {
            if tx.insert_reading(reading).await? {
                summary.accepted += 1;
            } else {
                debug!(sensor_id = %reading.sensor_id, timestamp = %reading.timestamp, "Duplicate reading");
                summary.duplicates += 1;
            }
        }
        tx.commit().await?;

        info!(
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            "Ingested batch"
        );
        Ok(summary)
    }

    fn validate_batch(
        &self,
        batch: Vec<IngestReading>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Reading>, BTreeMap<String, SensorSpec>), ServiceError> {
        let mut rejected = Vec::new();
        let mut readings = Vec::with_capacity(batch.len());
        let mut sensors: BTreeMap<String, SensorSpec> = BTreeMap::new();

        for (index, input) in batch.into_iter().enumerate() {
            let (reading, spec) = match self.validate(input, now) {
                Ok(valid) => valid,
                Err(reason) => {
                    rejected.push(RejectedReading { index, reason });
                    continue;
                }
            };

            match sensors.entry(spec.id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(spec);
                }
                Entry::Occupied(mut entry) => {
                    if let Err(field) = entry.get_mut().merge(&spec) {
                        rejected.push(RejectedReading {
                            index,
                            reason: format!(
                                "Conflicting {} for sensor {} within the batch",
                                field, spec.id
                            ),
                        });
                        continue;
                    }
                }
            }
            readings.push(reading);
        }

        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Rejected batch");
            return Err(ServiceError::Rejected(rejected));
        }
        Ok((readings, sensors))
    }

    fn validate(
        &self,
        input: IngestReading,
        now: DateTime<Utc>,
    ) -> Result<(Reading, SensorSpec), String> {
        let spec = validate_spec(input.sensor)?;
        if !input.value.is_finite() {
            return Err("Value must be a finite number".to_owned());
        }

        let timestamp = store_precision(input.timestamp.unwrap_or(now));
        let latest = now
            .checked_add_signed(self.policy.clock_skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if timestamp > latest {
            return Err(format!(
                "Timestamp {} is more than {} ms ahead of server time",
                timestamp.to_rfc3339(),
                self.policy.clock_skew.num_milliseconds()
            ));
        }
        if let Some(max_age) = self.policy.max_age {
            let earliest = now
                .checked_sub_signed(max_age)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if timestamp < earliest {
                return Err(format!(
                    "Timestamp {} is older than {} seconds",
                    timestamp.to_rfc3339(),
                    max_age.num_seconds()
                ));
            }
        }

        let reading = Reading {
            sensor_id: spec.id.clone(),
            timestamp,
            value: input.value,
            quality: input.quality,
        };
        Ok((reading, spec))
    }
}

pub(crate) fn validate_sensor_id(sensor_id: &str) -> Result<(), String> {
    if sensor_id.is_empty() {
        return Err("Sensor id cannot be empty".to_owned());
    }
    if sensor_id.len() > MAX_SENSOR_ID_LEN {
        return Err(format!(
            "Sensor id is longer than {} characters",
            MAX_SENSOR_ID_LEN
        ));
    }
    let valid = sensor_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !valid {
        return Err(format!(
            "Sensor id '{}' may only contain ASCII letters, digits, '_', '-', '.', ':'",
            sensor_id
        ));
    }
    Ok(())
}

/// Checks the id and trims the metadata
pub(crate) fn validate_spec(spec: SensorSpec) -> Result<SensorSpec, String> {
    validate_sensor_id(&spec.id)?;
    Ok(SensorSpec {
        name: validate_metadata("name", spec.name)?,
        unit: validate_metadata("unit", spec.unit)?,
        location: validate_metadata("location", spec.location)?,
        id: spec.id,
    })
}

fn validate_metadata(field: &str, value: Option<String>) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                Err(format!("'{}' must be a non-empty string", field))
            } else if trimmed.chars().count() > MAX_METADATA_LEN {
                Err(format!(
                    "'{}' is longer than {} characters",
                    field, MAX_METADATA_LEN
                ))
            } else {
                Ok(Some(trimmed.to_owned()))
            }
        }
    }
}
