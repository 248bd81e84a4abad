use super::query::{self, StatisticsQuery};
use super::{build_response, SensorIdParam};
use crate::error::ServiceError;
use crate::sensor::SensorService;
use chrono::Utc;
use sensor_core::{AggregateFunction, SensorStatistic, TimeRange};
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    service: &Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_statistics(service.clone()).or(get_sensor_statistic(service.clone()))
}

/// GET api/v1/sensors/data
///
/// One statistic per sensor over the last `days`, sensors without readings
/// in that window are left out
#[utoipa::path(
    get,
    path = "/api/v1/sensors/data",
    tag = "statistics",
    params(
        ("sensors" = Option<String>, Query, description = "Comma separated sensor ids, all sensors if absent"),
        ("stat" = Option<String>, Query, description = "average, min, max, sum or count, defaults to average"),
        ("days" = Option<i64>, Query, description = "Days back from now, 1 to 31, defaults to 1"),
    ),
    responses(
        (status = 200, body = dto::StatisticsDto),
        (status = 400, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn get_statistics(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / "data"))
        .and(warp::get())
        .and(warp::query::<StatisticsQuery>())
        .and_then(
            |service: Arc<SensorService>, query: StatisticsQuery| async move {
                let resp = statistics(&service, None, query).await;
                build_response(resp)
            },
        )
        .boxed()
}

/// GET api/v1/sensors/:id/data
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{id}/data",
    tag = "statistics",
    params(
        ("id" = String, Path, description = "Sensor id"),
        ("stat" = Option<String>, Query, description = "average, min, max, sum or count, defaults to average"),
        ("days" = Option<i64>, Query, description = "Days back from now, 1 to 31, defaults to 1"),
    ),
    responses(
        (status = 200, body = dto::StatisticsDto),
        (status = 400, body = crate::rest::dto::ErrorResponseDto),
        (status = 404, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn get_sensor_statistic(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / SensorIdParam / "data"))
        .and(warp::get())
        .and(warp::query::<StatisticsQuery>())
        .and_then(
            |service: Arc<SensorService>, sensor_id: SensorIdParam, query: StatisticsQuery| async move {
                let resp = statistics(&service, Some(sensor_id.0), query).await;
                build_response(resp)
            },
        )
        .boxed()
}

async fn statistics(
    service: &SensorService,
    sensor_id: Option<String>,
    query: StatisticsQuery,
) -> Result<dto::StatisticsDto, ServiceError> {
    let days = query::parse_days(query.days.as_deref()).map_err(ServiceError::Validation)?;
    let function = match query.stat.as_deref() {
        Some(raw) => raw.parse::<AggregateFunction>()?,
        None => AggregateFunction::Avg,
    };
    let now = Utc::now();
    let range = TimeRange::new(now - days, now)?;

    let results: Vec<SensorStatistic> = match sensor_id {
        Some(sensor_id) => service
            .query()
            .statistic(&sensor_id, range, function)
            .await?
            .into_iter()
            .collect(),
        None => {
            let sensor_ids = query::parse_sensor_list(query.sensors.as_deref());
            service
                .query()
                .statistics(&sensor_ids, range, function)
                .await?
        }
    };
    Ok(dto::StatisticsDto {
        function,
        from: range.from(),
        to: range.until(),
        results,
    })
}

pub mod dto {
    use chrono::{DateTime, Utc};
    use sensor_core::{AggregateFunction, SensorStatistic};
    use serde::{Deserialize, Serialize};
    use utoipa::ToSchema;

    #[derive(Debug, Serialize, Deserialize, ToSchema)]
    pub struct StatisticsDto {
        pub function: AggregateFunction,
        pub from: DateTime<Utc>,
        pub to: DateTime<Utc>,
        pub results: Vec<SensorStatistic>,
    }
}
