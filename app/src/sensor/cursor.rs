use crate::error::ServiceError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use sensor_core::reading::from_micros;
use serde::{Deserialize, Serialize};

/// Opaque page token, the last returned position of a sensor's readings
///
/// Encoded as URL safe base64 over a small JSON object, so that clients
/// treat it as a string and never as an offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "s")]
    sensor_id: String,
    #[serde(rename = "t")]
    last_micros: i64,
}

impl Cursor {
    pub fn new(sensor_id: &str, last: DateTime<Utc>) -> Self {
        Cursor {
            sensor_id: sensor_id.to_owned(),
            last_micros: last.timestamp_micros(),
        }
    }

    pub fn encode(&self) -> Result<String, ServiceError> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| ServiceError::Internal(format!("Encoding cursor failed: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    pub fn decode(token: &str) -> Result<Self, ServiceError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| ServiceError::Validation(format!("Invalid cursor: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::Validation(format!("Invalid cursor: {}", e)))
    }

    /// The timestamp to continue after, if the cursor belongs to `sensor_id`
    pub fn position_for(&self, sensor_id: &str) -> Result<DateTime<Utc>, ServiceError> {
        if self.sensor_id != sensor_id {
            return Err(ServiceError::Validation(format!(
                "Cursor was issued for sensor {}, not {}",
                self.sensor_id, sensor_id
            )));
        }
        from_micros(self.last_micros)
            .ok_or_else(|| ServiceError::Validation("Invalid cursor: timestamp".to_owned()))
    }
}
