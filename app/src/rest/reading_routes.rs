use super::query::{self, AggregateQuery, PageQuery};
use super::{build_response, build_response_with_status, json_body, SensorIdParam};
use crate::error::ServiceError;
use crate::sensor::{IngestReading, IngestSummary, ReadingPage, RejectedReading, SensorService};
use chrono::Utc;
use sensor_core::{AggregateFunction, SensorSpec};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

pub fn routes(
    service: &Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    ingest_sensor_readings(service.clone())
        .or(ingest_readings(service.clone()))
        .or(get_readings(service.clone()))
        .or(aggregate_readings(service.clone()))
}

/// POST api/v1/sensors/:id/readings
///
/// Stores a single reading or an array of readings of one sensor.
/// Unknown sensors are registered on the fly.
///
/// Returns 201 if at least one reading was new, 200 if all were duplicates
#[utoipa::path(
    post,
    path = "/api/v1/sensors/{id}/readings",
    tag = "readings",
    params(("id" = String, Path, description = "Sensor id")),
    request_body = dto::ReadingBatchDto,
    responses(
        (status = 201, body = crate::sensor::IngestSummary),
        (status = 200, description = "Only duplicates", body = crate::sensor::IngestSummary),
        (status = 400, description = "Batch rejected, nothing stored", body = crate::sensor::IngestSummary),
        (status = 409, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn ingest_sensor_readings(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / SensorIdParam / "readings"))
        .and(warp::post())
        .and(json_body())
        .and_then(
            |service: Arc<SensorService>, sensor_id: SensorIdParam, body: dto::ReadingBatchDto| async move {
                let resp = match to_batch(body.into_vec(), Some(sensor_id.0.as_str())) {
                    Ok(batch) => service.ingest().ingest(batch).await,
                    Err(err) => Err(err),
                };
                ingest_response(resp)
            },
        )
        .boxed()
}

/// POST api/v1/readings
///
/// Stores readings of several sensors, each one names its `sensor`
#[utoipa::path(
    post,
    path = "/api/v1/readings",
    tag = "readings",
    request_body = [dto::ReadingDto],
    responses(
        (status = 201, body = crate::sensor::IngestSummary),
        (status = 200, description = "Only duplicates", body = crate::sensor::IngestSummary),
        (status = 400, description = "Batch rejected, nothing stored", body = crate::sensor::IngestSummary),
    )
)]
fn ingest_readings(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "readings"))
        .and(warp::post())
        .and(json_body())
        .and_then(
            |service: Arc<SensorService>, body: dto::ReadingBatchDto| async move {
                let resp = match to_batch(body.into_vec(), None) {
                    Ok(batch) => service.ingest().ingest(batch).await,
                    Err(err) => Err(err),
                };
                ingest_response(resp)
            },
        )
        .boxed()
}

/// GET api/v1/sensors/:id/readings
///
/// Readings in `[from, to)` ascending by timestamp, one page at a time
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{id}/readings",
    tag = "readings",
    params(
        ("id" = String, Path, description = "Sensor id"),
        ("from" = Option<String>, Query, description = "Unix seconds or RFC 3339, defaults to one window before `to`"),
        ("to" = Option<String>, Query, description = "Unix seconds or RFC 3339, exclusive, defaults to now"),
        ("limit" = Option<i64>, Query, description = "Page size"),
        ("cursor" = Option<String>, Query, description = "`next_cursor` of the previous page"),
    ),
    responses(
        (status = 200, body = crate::sensor::ReadingPage),
        (status = 400, body = crate::rest::dto::ErrorResponseDto),
        (status = 404, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn get_readings(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / SensorIdParam / "readings"))
        .and(warp::get())
        .and(warp::query::<PageQuery>())
        .and_then(
            |service: Arc<SensorService>, sensor_id: SensorIdParam, query: PageQuery| async move {
                let resp = read_page(&service, &sensor_id.0, query).await;
                build_response(resp)
            },
        )
        .boxed()
}

/// GET api/v1/sensors/:id/readings/aggregate
///
/// Aggregates the readings in `[from, to)` into epoch aligned buckets,
/// buckets without readings are left out
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{id}/readings/aggregate",
    tag = "readings",
    params(
        ("id" = String, Path, description = "Sensor id"),
        ("from" = Option<String>, Query, description = "Unix seconds or RFC 3339"),
        ("to" = Option<String>, Query, description = "Unix seconds or RFC 3339, exclusive"),
        ("bucket" = String, Query, description = "Seconds, or a number suffixed by s, m, h or d"),
        ("fn" = Option<String>, Query, description = "min, max, avg, count or sum, defaults to avg"),
    ),
    responses(
        (status = 200, body = dto::AggregateDto),
        (status = 400, body = crate::rest::dto::ErrorResponseDto),
        (status = 404, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn aggregate_readings(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!(
            "api" / "v1" / "sensors" / SensorIdParam / "readings" / "aggregate"
        ))
        .and(warp::get())
        .and(warp::query::<AggregateQuery>())
        .and_then(
            |service: Arc<SensorService>, sensor_id: SensorIdParam, query: AggregateQuery| async move {
                let resp = aggregate(&service, sensor_id.0, query).await;
                build_response(resp)
            },
        )
        .boxed()
}

fn ingest_response(resp: Result<IngestSummary, ServiceError>) -> Result<Response, Rejection> {
    let status = match &resp {
        Ok(summary) if summary.accepted > 0 => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    build_response_with_status(resp, status)
}

/// Resolves the sensor of every reading, against the path if there is one
fn to_batch(
    readings: Vec<dto::ReadingDto>,
    path_sensor: Option<&str>,
) -> Result<Vec<IngestReading>, ServiceError> {
    let mut rejected = Vec::new();
    let mut batch = Vec::with_capacity(readings.len());

    for (index, reading) in readings.into_iter().enumerate() {
        let sensor_id = match (path_sensor, reading.sensor) {
            (Some(path), Some(body)) if path != body => {
                rejected.push(RejectedReading {
                    index,
                    reason: format!("Reading of sensor {} posted to sensor {}", body, path),
                });
                continue;
            }
            (Some(path), _) => path.to_owned(),
            (None, Some(body)) => body,
            (None, None) => {
                rejected.push(RejectedReading {
                    index,
                    reason: "Missing 'sensor'".to_owned(),
                });
                continue;
            }
        };
        batch.push(IngestReading {
            sensor: SensorSpec {
                id: sensor_id,
                name: reading.name,
                unit: reading.unit,
                location: reading.location,
            },
            timestamp: reading.ts.map(|ts| ts.0),
            value: reading.value,
            quality: reading.quality,
        });
    }

    if !rejected.is_empty() {
        return Err(ServiceError::Rejected(rejected));
    }
    Ok(batch)
}

async fn read_page(
    service: &SensorService,
    sensor_id: &str,
    query: PageQuery,
) -> Result<ReadingPage, ServiceError> {
    let from = query::parse_optional_timestamp("from", query.from.as_deref())
        .map_err(ServiceError::Validation)?;
    let to = query::parse_optional_timestamp("to", query.to.as_deref())
        .map_err(ServiceError::Validation)?;
    let limit = query::parse_limit(query.limit.as_deref()).map_err(ServiceError::Validation)?;

    let range = service.query().range(from, to, Utc::now())?;
    service
        .query()
        .readings(sensor_id, range, limit, query.cursor.as_deref())
        .await
}

async fn aggregate(
    service: &SensorService,
    sensor_id: String,
    query: AggregateQuery,
) -> Result<dto::AggregateDto, ServiceError> {
    let from = query::parse_optional_timestamp("from", query.from.as_deref())
        .map_err(ServiceError::Validation)?;
    let to = query::parse_optional_timestamp("to", query.to.as_deref())
        .map_err(ServiceError::Validation)?;
    let bucket = match query.bucket.as_deref() {
        Some(raw) => query::parse_bucket(raw).map_err(ServiceError::Validation)?,
        None => return Err(ServiceError::Validation("'bucket' is required".to_owned())),
    };
    let function = match query.function.as_deref() {
        Some(raw) => raw.parse::<AggregateFunction>()?,
        None => AggregateFunction::Avg,
    };

    let range = service.query().range(from, to, Utc::now())?;
    let buckets = service
        .query()
        .aggregate(&sensor_id, range, bucket, function)
        .await?;
    Ok(dto::AggregateDto {
        sensor_id,
        function,
        bucket_secs: bucket.num_seconds(),
        from: range.from(),
        to: range.until(),
        buckets,
    })
}

pub mod dto {
    use super::query;
    use chrono::{DateTime, Utc};
    use sensor_core::{AggregateFunction, Bucket, Quality};
    use serde::{Deserialize, Serialize};
    use utoipa::ToSchema;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Seconds(i64),
        Text(String),
    }

    /// Unix seconds or an RFC 3339 string
    #[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
    #[serde(try_from = "RawTimestamp")]
    pub struct WireTimestamp(pub DateTime<Utc>);

    impl TryFrom<RawTimestamp> for WireTimestamp {
        type Error = String;

        fn try_from(raw: RawTimestamp) -> Result<Self, Self::Error> {
            match raw {
                RawTimestamp::Seconds(secs) => query::from_unix_secs(secs).map(WireTimestamp),
                RawTimestamp::Text(text) => query::parse_timestamp(&text).map(WireTimestamp),
            }
        }
    }

    #[derive(Debug, Deserialize, ToSchema)]
    #[serde(deny_unknown_fields)]
    pub struct ReadingDto {
        /// Required unless posted to a sensor path
        pub sensor: Option<String>,
        /// Server time if absent
        #[serde(alias = "timestamp")]
        #[schema(value_type = Option<String>, example = "2024-05-01T12:00:00Z")]
        pub ts: Option<WireTimestamp>,
        pub value: f64,
        pub quality: Option<Quality>,
        pub name: Option<String>,
        pub unit: Option<String>,
        pub location: Option<String>,
    }

    #[derive(Debug, Deserialize, ToSchema)]
    #[serde(untagged)]
    pub enum ReadingBatchDto {
        Batch(Vec<ReadingDto>),
        Single(ReadingDto),
    }

    impl ReadingBatchDto {
        pub fn into_vec(self) -> Vec<ReadingDto> {
            match self {
                ReadingBatchDto::Batch(readings) => readings,
                ReadingBatchDto::Single(reading) => vec![reading],
            }
        }
    }

    #[derive(Debug, Serialize, Deserialize, ToSchema)]
    pub struct AggregateDto {
        pub sensor_id: String,
        pub function: AggregateFunction,
        pub bucket_secs: i64,
        pub from: DateTime<Utc>,
        pub to: DateTime<Utc>,
        pub buckets: Vec<Bucket>,
    }
}
