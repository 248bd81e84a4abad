use crate::error::{ErrorKind, ServiceError};
use crate::sensor::{IngestSummary, SensorService};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

mod doc_routes;
mod metric_routes;
mod query;
mod reading_routes;
mod sensor_routes;
mod statistic_routes;

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

/// Every route, with json errors and request spans
pub fn routes(
    service: &Arc<SensorService>,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    metric_routes::routes(service)
        .or(statistic_routes::routes(service))
        .or(sensor_routes::routes(service))
        .or(reading_routes::routes(service))
        .or(doc_routes::swagger())
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// Binds the listener and serves until `shutdown` resolves
pub fn dispatch_server_daemon(
    service: Arc<SensorService>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    let (bound, server) =
        warp::serve(routes(&service)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(addr = %bound, "Serving REST API");
    Ok((bound, server))
}

fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn build_response<T: Serialize>(resp: Result<T, ServiceError>) -> Result<Response, Rejection> {
    build_response_with_status(resp, StatusCode::OK)
}

pub fn build_response_with_status<T: Serialize>(
    resp: Result<T, ServiceError>,
    status: StatusCode,
) -> Result<Response, Rejection> {
    match resp {
        Ok(data) => Ok(warp::reply::with_status(warp::reply::json(&data), status).into_response()),
        Err(err) => Ok(error_response(err)),
    }
}

fn error_response(err: ServiceError) -> Response {
    let status = status_of(err.kind());
    match err {
        ServiceError::Rejected(rejected) => {
            warn!(rejected = rejected.len(), "Rejected batch");
            let summary = IngestSummary {
                accepted: 0,
                duplicates: 0,
                rejected,
            };
            warp::reply::with_status(warp::reply::json(&summary), status).into_response()
        }
        ServiceError::Storage(err) => {
            error!(error = %err, "Storage failure");
            error_reply("Internal storage error", status)
        }
        ServiceError::Internal(msg) => {
            error!(error = %msg, "Internal failure");
            error_reply("Internal server error", status)
        }
        err => {
            warn!(error = %err, "Invalid request");
            error_reply(&err.to_string(), status)
        }
    }
}

fn error_reply(msg: &str, status: StatusCode) -> Response {
    let body = dto::ErrorResponseDto {
        error: msg.to_owned(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Maps warp's own rejections onto the json error body
async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, msg) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_owned())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Malformed body: {}", e))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Malformed query: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_owned())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_owned(),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_owned())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_owned())
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_owned(),
        )
    };
    Ok(error_reply(&msg, status))
}

/// Sensor id path segment, percent decoded
#[derive(Debug, Clone, PartialEq)]
pub struct SensorIdParam(pub String);

impl FromStr for SensorIdParam {
    type Err = std::str::Utf8Error;

    fn from_str(segment: &str) -> Result<Self, Self::Err> {
        let decoded = percent_decode_str(segment).decode_utf8()?;
        Ok(SensorIdParam(decoded.into_owned()))
    }
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

pub mod dto {
    use serde::{Deserialize, Serialize};
    use utoipa::ToSchema;

    #[derive(Debug, Serialize, Deserialize, ToSchema)]
    pub struct ErrorResponseDto {
        pub error: String,
    }
}
