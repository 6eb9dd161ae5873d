//! The published dashboard snapshot and the channel that carries it.

use crate::air_quality::{AirQualityMetrics, Pollutant};
use crate::classify::{door_label, wet_bulb_from_sensor, Classifier, Family};
use crate::device::{DeviceStatus, SensorPair};
use crate::geo::Coordinates;
use crate::metric::{Fixed, NormalizedMetric, Reading};
use crate::weather::WeatherMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Name of the local VOC gas metric.
pub const LOCAL_GAS_METRIC: &str = "loc_gas";

/// One device sensor as published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorConditions {
    pub temperature: Fixed,
    pub humidity: Fixed,
    pub wet_bulb: Fixed,
}

impl SensorConditions {
    fn from_pair(pair: &SensorPair) -> Self {
        Self {
            temperature: pair.temperature.fixed(1),
            humidity: pair.humidity.fixed(0),
            wet_bulb: wet_bulb_from_sensor(pair.temperature, pair.humidity, pair.origin).fixed(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceConditions {
    pub door_state: String,
    pub door_label: String,
    pub local: SensorConditions,
    pub remote: SensorConditions,
    pub local_gas: Reading,
    pub ip: Option<String>,
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A metric tagged with its severity label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    #[serde(flatten)]
    pub metric: NormalizedMetric,
    pub label: String,
}

/// Result of one successful cycle. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub published_at: DateTime<Utc>,
    pub device: DeviceConditions,
    pub coordinates: Coordinates,
    pub forecast_link: Option<String>,
    pub weather: WeatherMetrics,
    pub air_quality: AirQualityMetrics,
    pub classifications: Vec<Classification>,
}

impl StatusSnapshot {
    pub fn assemble(
        device: &DeviceStatus,
        coordinates: Coordinates,
        forecast_link: Option<String>,
        weather: WeatherMetrics,
        air_quality: AirQualityMetrics,
        classifier: &Classifier,
    ) -> Self {
        let mut classifications = Vec::new();
        for pollutant in Pollutant::ALL {
            let Some(family) = pollutant.family() else {
                continue;
            };
            for (suffix, value) in [("now", air_quality.now(pollutant)), ("next", air_quality.next(pollutant))] {
                classifications.push(Classification {
                    metric: NormalizedMetric::new(format!("{}_{}", pollutant.name(), suffix), value),
                    label: classifier.classify(family, value).to_string(),
                });
            }
        }
        classifications.push(Classification {
            metric: NormalizedMetric::new(LOCAL_GAS_METRIC, device.local_gas),
            label: classifier.classify(Family::Voc, device.local_gas).to_string(),
        });

        Self {
            published_at: Utc::now(),
            device: DeviceConditions {
                door_state: device.door_state.clone(),
                door_label: door_label(&device.door_state).to_string(),
                local: SensorConditions::from_pair(&device.local),
                remote: SensorConditions::from_pair(&device.remote),
                local_gas: device.local_gas,
                ip: device.ip.clone(),
                version: device.version.clone(),
                timestamp: device.timestamp,
            },
            coordinates,
            forecast_link,
            weather,
            air_quality,
            classifications,
        }
    }

    pub fn classification(&self, metric: &str) -> Option<&Classification> {
        self.classifications.iter().find(|c| c.metric.name == metric)
    }
}

/// Holds the latest snapshot. Each publish replaces it whole.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: Arc<watch::Sender<Option<Arc<StatusSnapshot>>>>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }

    /// `None` until the first successful cycle.
    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<StatusSnapshot>>> {
        self.tx.subscribe()
    }
}
