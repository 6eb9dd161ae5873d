//! The garage device: its `/api/status` payload and `/api/run` command.
//!
//! The device reports numbers either as JSON numbers or as display strings
//! (`"21.3 °C"`, `"45 %"`, `"--"`), so numeric fields are read leniently.

use crate::classify::SensorOrigin;
use crate::error::{CommandError, FeedResult};
use crate::feed::{lookup, FeedClient};
use crate::geo::GeoQuery;
use crate::metric::Reading;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Door state reported when the device does not know it.
pub const UNKNOWN_DOOR_STATE: &str = "N/A";

/// Temperature/humidity pair from one of the device's sensors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPair {
    pub temperature: Reading,
    pub humidity: Reading,
    pub origin: SensorOrigin,
}

/// Decoded `/api/status` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    /// Device clock, from epoch nanoseconds
    pub timestamp: Option<DateTime<Utc>>,
    pub geo: GeoQuery,
    pub door_state: String,
    pub local: SensorPair,
    pub remote: SensorPair,
    /// Gas resistance of the local VOC sensor, in ohms
    pub local_gas: Reading,
    pub ip: Option<String>,
    pub version: Option<String>,
}

impl DeviceStatus {
    pub fn from_json(data: &Value) -> Self {
        let field = |key: &str| lookup(data, key);
        Self {
            timestamp: epoch_nanos(field("UTC")),
            geo: GeoQuery {
                postal_code: text(field("zipcode")),
                country_code: text(field("country")),
                api_key: text(field("ow_api_key")),
            },
            door_state: text(field("state")).unwrap_or_else(|| UNKNOWN_DOOR_STATE.to_string()),
            local: SensorPair {
                temperature: Reading::lenient(field("locTemp")),
                humidity: Reading::lenient(field("locRH")),
                origin: SensorOrigin::from_tag(field("locSens").as_str()),
            },
            remote: SensorPair {
                temperature: Reading::lenient(field("remoteTemp")),
                humidity: Reading::lenient(field("remoteRH")),
                origin: SensorOrigin::from_tag(field("remoteSens").as_str()),
            },
            local_gas: Reading::lenient(field("locGas")),
            ip: text(field("ip")),
            version: text(field("version")),
        }
    }
}

/// Fetch and decode the device status.
pub async fn fetch_status<C: FeedClient>(client: &C, url: &str) -> FeedResult<DeviceStatus> {
    let data = client.fetch_json(url).await?;
    Ok(DeviceStatus::from_json(&data))
}

/// Fire the door command. Only a 2xx status counts as success.
pub async fn run_command<C: FeedClient>(client: &C, url: &str) -> Result<(), CommandError> {
    let status = client.fetch_status(url).await?;
    if (200..300).contains(&status) {
        log::info!("[Device] run command accepted");
        Ok(())
    } else {
        Err(CommandError::Status(status))
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn epoch_nanos(value: &Value) -> Option<DateTime<Utc>> {
    let nanos = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))?;
    Some(DateTime::from_timestamp_nanos(nanos))
}
