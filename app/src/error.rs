use crate::sensor::RejectedReading;
use sensor_core::error::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DBError {
    #[error(transparent)]
    SQLError(#[from] sqlx::Error),
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),
    #[error("Sensor {id} is registered with unit '{stored}', got '{requested}'")]
    UnitConflict {
        id: String,
        stored: String,
        requested: String,
    },
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DBError),
    #[error("Failed registering signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("Failed binding server: {0}")]
    Bind(#[from] warp::Error),
}

/// Classification the API surface maps onto status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Batch rejected, {} invalid readings", .0.len())]
    Rejected(Vec<RejectedReading>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(DBError),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) | ServiceError::Rejected(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Storage(_) => ErrorKind::Storage,
            ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<DBError> for ServiceError {
    fn from(err: DBError) -> Self {
        match err {
            DBError::SensorNotFound(_) => ServiceError::NotFound(err.to_string()),
            DBError::UnitConflict { .. } => ServiceError::Conflict(err.to_string()),
            DBError::SQLError(_) | DBError::Migration(_) => ServiceError::Storage(err),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}
