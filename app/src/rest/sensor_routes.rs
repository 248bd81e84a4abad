use super::{build_response, build_response_with_status, json_body, SensorIdParam};
use crate::sensor::SensorService;
use sensor_core::{SensorSpec, Upserted};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

pub fn routes(
    service: &Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_sensors(service.clone())
        .or(register_sensor(service.clone()))
        .or(get_sensor(service.clone()))
}

/// GET api/v1/sensors
///
/// Lists all registered sensors, ordered by id
#[utoipa::path(
    get,
    path = "/api/v1/sensors",
    tag = "sensors",
    responses((status = 200, body = [sensor_core::Sensor]))
)]
fn get_sensors(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors"))
        .and(warp::get())
        .and_then(|service: Arc<SensorService>| async move {
            let resp = service.sensors().await;
            build_response(resp)
        })
        .boxed()
}

/// PUT api/v1/sensors/:id
///
/// Registers a sensor or updates its metadata
///
/// Returns 201 for a new sensor, 200 if it existed already
#[utoipa::path(
    put,
    path = "/api/v1/sensors/{id}",
    tag = "sensors",
    params(("id" = String, Path, description = "Sensor id")),
    request_body = dto::SensorMetadataDto,
    responses(
        (status = 201, description = "Created", body = sensor_core::Sensor),
        (status = 200, description = "Updated", body = sensor_core::Sensor),
        (status = 400, body = crate::rest::dto::ErrorResponseDto),
        (status = 409, description = "Unit differs from the stored one", body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn register_sensor(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / SensorIdParam))
        .and(warp::put())
        .and(json_body())
        .and_then(
            |service: Arc<SensorService>, sensor_id: SensorIdParam, body: dto::SensorMetadataDto| async move {
                let spec = SensorSpec {
                    id: sensor_id.0,
                    name: body.name,
                    unit: body.unit,
                    location: body.location,
                };
                match service.register(spec).await {
                    Ok(Upserted::Created(sensor)) => {
                        build_response_with_status(Ok(sensor), StatusCode::CREATED)
                    }
                    Ok(Upserted::Existing(sensor)) => build_response(Ok(sensor)),
                    Err(err) => build_response::<()>(Err(err)),
                }
            },
        )
        .boxed()
}

/// GET api/v1/sensors/:id
#[utoipa::path(
    get,
    path = "/api/v1/sensors/{id}",
    tag = "sensors",
    params(("id" = String, Path, description = "Sensor id")),
    responses(
        (status = 200, body = sensor_core::Sensor),
        (status = 404, body = crate::rest::dto::ErrorResponseDto),
    )
)]
fn get_sensor(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "sensors" / SensorIdParam))
        .and(warp::get())
        .and_then(|service: Arc<SensorService>, sensor_id: SensorIdParam| async move {
            let resp = service.sensor(&sensor_id.0).await;
            build_response(resp)
        })
        .boxed()
}

pub mod dto {
    use serde::{Deserialize, Serialize};
    use utoipa::ToSchema;

    #[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
    #[serde(deny_unknown_fields)]
    pub struct SensorMetadataDto {
        pub name: Option<String>,
        pub unit: Option<String>,
        pub location: Option<String>,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rest::test::build_mocked_service;
    use sensor_core::Sensor;

    #[tokio::test]
    async fn test_rest_register_sensor() {
        // Prepare
        let (service, _) = build_mocked_service();
        let routes = routes(&service);
        let dto = dto::SensorMetadataDto {
            name: Some("Greenhouse".to_owned()),
            unit: Some("C".to_owned()),
            location: None,
        };

        // Execute
        let created = warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/s1")
            .json(&dto)
            .reply(&routes)
            .await;
        let existing = warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/s1")
            .json(&dto)
            .reply(&routes)
            .await;

        // Validate
        assert_eq!(201, created.status());
        assert_eq!(200, existing.status());
        let sensor: Sensor = serde_json::from_slice(created.body()).unwrap();
        assert_eq!("s1", sensor.id);
        assert_eq!(Some("C".to_owned()), sensor.unit);
    }

    #[tokio::test]
    async fn test_rest_unit_conflict() {
        // Prepare
        let (service, _) = build_mocked_service();
        let routes = routes(&service);
        let celsius = dto::SensorMetadataDto {
            unit: Some("C".to_owned()),
            ..Default::default()
        };
        let fahrenheit = dto::SensorMetadataDto {
            unit: Some("F".to_owned()),
            ..Default::default()
        };

        // Execute
        warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/s1")
            .json(&celsius)
            .reply(&routes)
            .await;
        let res = warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/s1")
            .json(&fahrenheit)
            .reply(&routes)
            .await;

        // Validate
        assert_eq!(409, res.status());
    }

    #[tokio::test]
    async fn test_rest_invalid_sensor_id() {
        // Prepare
        let (service, _) = build_mocked_service();
        let routes = routes(&service);

        // Execute
        let res = warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/no%20spaces")
            .json(&dto::SensorMetadataDto::default())
            .reply(&routes)
            .await;

        // Validate
        assert_eq!(400, res.status());
    }

    #[tokio::test]
    async fn test_rest_sensor_id_is_percent_decoded() {
        // Prepare
        let (service, _) = build_mocked_service();
        let routes = routes(&service);

        // Execute
        let created = warp::test::request()
            .method("PUT")
            .path("/api/v1/sensors/room%3A1")
            .json(&dto::SensorMetadataDto::default())
            .reply(&routes)
            .await;
        let encoded = warp::test::request()
            .path("/api/v1/sensors/room%3a1")
            .reply(&routes)
            .await;
        let plain = warp::test::request()
            .path("/api/v1/sensors/room:1")
            .reply(&routes)
            .await;

        // Validate
        assert_eq!(201, created.status());
        let sensor: Sensor = serde_json::from_slice(created.body()).unwrap();
        assert_eq!("room:1", sensor.id);
        assert_eq!(200, encoded.status());
        assert_eq!(200, plain.status());
    }

    #[tokio::test]
    async fn test_rest_sensor_lookup() {
        // Prepare
        let (service, _) = build_mocked_service();
        service.register(SensorSpec::new("b")).await.unwrap();
        service.register(SensorSpec::new("a")).await.unwrap();
        let routes = routes(&service);

        // Execute
        let list = warp::test::request()
            .path("/api/v1/sensors")
            .reply(&routes)
            .await;
        let found = warp::test::request()
            .path("/api/v1/sensors/a")
            .reply(&routes)
            .await;
        let missing = warp::test::request()
            .path("/api/v1/sensors/c")
            .reply(&routes)
            .await;

        // Validate
        assert_eq!(200, list.status());
        let sensors: Vec<Sensor> = serde_json::from_slice(list.body()).unwrap();
        let ids: Vec<&str> = sensors.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(vec!["a", "b"], ids);
        assert_eq!(200, found.status());
        assert_eq!(404, missing.status());
    }
}
