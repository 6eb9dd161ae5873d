//! Current and next-day air quality from the Open-Meteo air-quality API.
//!
//! Two requests per cycle: `current=<fields>` for now and
//! `forecast_days=2&hourly=<fields>` read at [`FORECAST_HOUR`] for next.
//! The source already reports in the published units, so values pass
//! through untouched; anything that is not a finite number is MISSING.

use crate::classify::Family;
use crate::error::FeedResult;
use crate::feed::{lookup, with_query, FeedClient};
use crate::geo::Coordinates;
use crate::metric::{NormalizedMetric, Reading};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Hourly index used as the "next day" reading.
pub const FORECAST_HOUR: usize = 36;

/// Metrics extracted from the air-quality feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Pollutant {
    #[serde(rename = "aqi")]
    Aqi,
    #[serde(rename = "uvi")]
    Uv,
    #[serde(rename = "co")]
    Co,
    #[serde(rename = "co2")]
    Co2,
    #[serde(rename = "no2")]
    No2,
    #[serde(rename = "o3")]
    O3,
    #[serde(rename = "so2")]
    So2,
    #[serde(rename = "pm2_5")]
    Pm2_5,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "nh3")]
    Nh3,
    #[serde(rename = "ch4")]
    Ch4,
    #[serde(rename = "dust")]
    Dust,
}

impl Pollutant {
    pub const ALL: [Pollutant; 12] = [
        Pollutant::Aqi,
        Pollutant::Uv,
        Pollutant::Co,
        Pollutant::Co2,
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::So2,
        Pollutant::Pm2_5,
        Pollutant::Pm10,
        Pollutant::Nh3,
        Pollutant::Ch4,
        Pollutant::Dust,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pollutant::Aqi => "aqi",
            Pollutant::Uv => "uvi",
            Pollutant::Co => "co",
            Pollutant::Co2 => "co2",
            Pollutant::No2 => "no2",
            Pollutant::O3 => "o3",
            Pollutant::So2 => "so2",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::Pm10 => "pm10",
            Pollutant::Nh3 => "nh3",
            Pollutant::Ch4 => "ch4",
            Pollutant::Dust => "dust",
        }
    }

    /// Field name in the Open-Meteo air-quality API.
    pub fn source_field(self) -> &'static str {
        match self {
            Pollutant::Aqi => "us_aqi",
            Pollutant::Uv => "uv_index",
            Pollutant::Co => "carbon_monoxide",
            Pollutant::Co2 => "carbon_dioxide",
            Pollutant::No2 => "nitrogen_dioxide",
            Pollutant::O3 => "ozone",
            Pollutant::So2 => "sulphur_dioxide",
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::Pm10 => "pm10",
            Pollutant::Nh3 => "ammonia",
            Pollutant::Ch4 => "methane",
            Pollutant::Dust => "dust",
        }
    }

    /// Range-table family, if this pollutant is classified at all.
    pub fn family(self) -> Option<Family> {
        match self {
            Pollutant::Aqi => Some(Family::Aqi),
            Pollutant::Uv => Some(Family::Uv),
            Pollutant::Co => Some(Family::Co),
            Pollutant::No2 => Some(Family::No2),
            Pollutant::O3 => Some(Family::O3),
            Pollutant::So2 => Some(Family::So2),
            Pollutant::Pm2_5 => Some(Family::Pm2_5),
            Pollutant::Pm10 => Some(Family::Pm10),
            Pollutant::Co2 | Pollutant::Nh3 | Pollutant::Ch4 | Pollutant::Dust => None,
        }
    }
}

/// Flat air-quality metric set. Every pollutant has a slot in both maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityMetrics {
    pub now: BTreeMap<Pollutant, Reading>,
    pub next: BTreeMap<Pollutant, Reading>,
}

impl AirQualityMetrics {
    pub fn now(&self, pollutant: Pollutant) -> Reading {
        self.now.get(&pollutant).copied().unwrap_or_default()
    }

    pub fn next(&self, pollutant: Pollutant) -> Reading {
        self.next.get(&pollutant).copied().unwrap_or_default()
    }

    /// Named metrics, `<name>_now` and `<name>_next` per pollutant.
    pub fn metrics(&self) -> Vec<NormalizedMetric> {
        Pollutant::ALL
            .iter()
            .flat_map(|&p| {
                [
                    NormalizedMetric::new(format!("{}_now", p.name()), self.now(p)),
                    NormalizedMetric::new(format!("{}_next", p.name()), self.next(p)),
                ]
            })
            .collect()
    }
}

/// Fetch and normalize air quality at `coords`.
pub async fn aggregate<C: FeedClient>(
    client: &C,
    endpoint: &str,
    coords: Coordinates,
) -> FeedResult<AirQualityMetrics> {
    let fields = Pollutant::ALL
        .iter()
        .map(|p| p.source_field())
        .collect::<Vec<_>>()
        .join(",");
    let location = [
        ("latitude", coords.latitude.to_string()),
        ("longitude", coords.longitude.to_string()),
    ];

    let now_url = with_query(
        endpoint,
        &[location[0].clone(), location[1].clone(), ("current", fields.clone())],
    )?;
    let now_data = client.fetch_json(&now_url).await?;

    let next_url = with_query(
        endpoint,
        &[
            location[0].clone(),
            location[1].clone(),
            ("forecast_days", "2".to_string()),
            ("hourly", fields),
        ],
    )?;
    let next_data = client.fetch_json(&next_url).await?;

    let metrics = normalize(&now_data, &next_data);
    let missing = metrics
        .now
        .values()
        .chain(metrics.next.values())
        .filter(|r| r.is_missing())
        .count();
    if missing > 0 {
        log::debug!("[AirQuality] {} of {} slots missing", missing, 2 * Pollutant::ALL.len());
    }
    Ok(metrics)
}

/// Extract the fixed pollutant set from the raw current/hourly payloads.
pub fn normalize(now_data: &Value, next_data: &Value) -> AirQualityMetrics {
    let current = lookup(now_data, "current");
    let hourly = lookup(next_data, "hourly");
    let now = Pollutant::ALL
        .iter()
        .map(|&p| (p, Reading::from_json(lookup(current, p.source_field()))))
        .collect();
    let next = Pollutant::ALL
        .iter()
        .map(|&p| {
            let series = lookup(hourly, p.source_field());
            let value = series.get(FORECAST_HOUR).map_or(Reading::Missing, Reading::from_json);
            (p, value)
        })
        .collect();
    AirQualityMetrics { now, next }
}
