use super::build_response;
use crate::sensor::SensorService;
use std::sync::Arc;
use warp::Filter;

pub fn routes(
    service: &Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    health(service.clone())
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses((status = 200, body = dto::HealthyDto))
)]
fn health(
    service: Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::any()
        .map(move || service.clone())
        .and(warp::path!("api" / "v1" / "health"))
        .and(warp::get())
        .and_then(|service: Arc<SensorService>| async move {
            let database_state = service.check_db().await;
            let ret = dto::HealthyDto {
                healthy: database_state == "healthy",
                service: env!("CARGO_PKG_NAME").to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                database_state,
            };
            build_response(Ok(ret))
        })
        .boxed()
}

pub mod dto {
    use serde::{Deserialize, Serialize};
    use utoipa::ToSchema;

    #[derive(Debug, Serialize, Deserialize, ToSchema)]
    pub struct HealthyDto {
        pub healthy: bool,
        pub service: String,
        pub version: String,
        pub database_state: String,
    }
}
