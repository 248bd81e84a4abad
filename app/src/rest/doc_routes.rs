use super::{metric_routes, reading_routes, sensor_routes, statistic_routes};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::Config;
use warp::Filter;
use warp::{
    http::Uri,
    hyper::{Response, StatusCode},
    path::{FullPath, Tail},
    Rejection, Reply,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "Sensor Data API", description = "Ingestion and range queries of sensor telemetry"),
    paths(
        metric_routes::health,
        sensor_routes::get_sensors,
        sensor_routes::register_sensor,
        sensor_routes::get_sensor,
        reading_routes::ingest_sensor_readings,
        reading_routes::ingest_readings,
        reading_routes::get_readings,
        reading_routes::aggregate_readings,
        statistic_routes::get_statistics,
        statistic_routes::get_sensor_statistic,
    ),
    components(schemas(
        sensor_core::Sensor,
        sensor_core::Reading,
        sensor_core::Quality,
        sensor_core::Bucket,
        sensor_core::AggregateFunction,
        sensor_core::SensorStatistic,
        crate::sensor::IngestSummary,
        crate::sensor::RejectedReading,
        crate::sensor::ReadingPage,
        super::dto::ErrorResponseDto,
        metric_routes::dto::HealthyDto,
        sensor_routes::dto::SensorMetadataDto,
        reading_routes::dto::ReadingDto,
        reading_routes::dto::ReadingBatchDto,
        reading_routes::dto::AggregateDto,
        statistic_routes::dto::StatisticsDto,
    )),
    tags(
        (name = "health"),
        (name = "sensors", description = "Sensor registry"),
        (name = "readings", description = "Ingestion and queries"),
        (name = "statistics", description = "One value per sensor over recent days"),
    )
)]
pub struct ApiDoc;

pub fn swagger() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let api = ApiDoc::openapi();
    let config = Arc::new(Config::from("/api/doc/api.json"));

    warp::path!("api" / "doc" / "api.json")
        .and(warp::get())
        .map(move || warp::reply::json(&api))
        .or(warp::path("api")
            .and(warp::path("doc"))
            .and(warp::get())
            .and(warp::path::full())
            .and(warp::path::tail())
            .and(warp::any().map(move || config.clone()))
            .and_then(serve_swagger))
}

async fn serve_swagger(
    full_path: FullPath,
    tail: Tail,
    config: Arc<Config<'static>>,
) -> Result<Box<dyn Reply + 'static>, Rejection> {
    if full_path.as_str() == "/api/doc" {
        return Ok(Box::new(warp::redirect::found(Uri::from_static(
            "/api/doc/",
        ))));
    }

    let path = tail.as_str();
    match utoipa_swagger_ui::serve(path, config) {
        Ok(file) => {
            if let Some(file) = file {
                Ok(Box::new(
                    Response::builder()
                        .header("Content-Type", file.content_type)
                        .body(file.bytes),
                ))
            } else {
                Ok(Box::new(StatusCode::NOT_FOUND))
            }
        }
        Err(error) => Ok(Box::new(
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(error.to_string()),
        )),
    }
}
