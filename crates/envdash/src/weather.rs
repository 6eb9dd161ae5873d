//! Outdoor conditions: nearest NWS station, backed by the Open-Meteo forecast.
//!
//! Request chain (see https://www.weather.gov/documentation/services-web-api):
//!
//! 1. Open-Meteo `current=` and `forecast_days=2&hourly=` conditions
//! 2. `/points/<lat>,<lon>` → `.properties.observationStations`, a URL
//! 3. that station list → `.features[0].id`, the nearest station URL
//! 4. `<station>/observations/latest` → `.properties.<field>.value`
//!
//! Each published field prefers the station value and falls back to the
//! forecast's current reading, per [`FIELDS`]. Any failed request aborts the
//! aggregation; a missing field never does.

use crate::error::{FeedError, FeedResult};
use crate::feed::{lookup, with_query, FeedClient};
use crate::geo::Coordinates;
use crate::metric::{Fixed, Reading};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Hourly index of the next-morning forecast checkpoint.
pub const FORECAST_AM_HOUR: usize = 33;
/// Hourly index of the next-afternoon forecast checkpoint.
pub const FORECAST_PM_HOUR: usize = 38;

/// Decimals for the wet-bulb temperature.
const WET_BULB_DECIMALS: usize = 1;

const FORECAST_FIELDS: [&str; 8] = [
    "temperature_2m",
    "relative_humidity_2m",
    "dew_point_2m",
    "apparent_temperature",
    "wet_bulb_temperature_2m",
    "weather_code",
    "surface_pressure",
    "visibility",
];

/// Published weather metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherField {
    Temperature,
    HeatIndex,
    RelativeHumidity,
    Pressure,
    Dewpoint,
    Visibility,
}

/// Where a weather field comes from and how it is published.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: WeatherField,
    /// Property name in the NWS observation
    pub station_field: &'static str,
    /// Open-Meteo `current` field used when the station has no value
    pub forecast_field: &'static str,
    /// Applied to the station value only
    pub divisor: f64,
    pub decimals: usize,
}

pub const FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        field: WeatherField::Temperature,
        station_field: "temperature",
        forecast_field: "temperature_2m",
        divisor: 1.0,
        decimals: 1,
    },
    FieldSpec {
        field: WeatherField::HeatIndex,
        station_field: "heatIndex",
        forecast_field: "apparent_temperature",
        divisor: 1.0,
        decimals: 1,
    },
    FieldSpec {
        field: WeatherField::RelativeHumidity,
        station_field: "relativeHumidity",
        forecast_field: "relative_humidity_2m",
        divisor: 1.0,
        decimals: 0,
    },
    // NWS reports Pa, Open-Meteo already reports hPa.
    FieldSpec {
        field: WeatherField::Pressure,
        station_field: "seaLevelPressure",
        forecast_field: "surface_pressure",
        divisor: 100.0,
        decimals: 0,
    },
    FieldSpec {
        field: WeatherField::Dewpoint,
        station_field: "dewpoint",
        forecast_field: "dew_point_2m",
        divisor: 1.0,
        decimals: 1,
    },
    FieldSpec {
        field: WeatherField::Visibility,
        station_field: "visibility",
        forecast_field: "visibility",
        divisor: 1.0,
        decimals: 0,
    },
];

/// The observation station the "now" values came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    /// Station URL as listed by the points lookup
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherMetrics {
    pub station: Station,
    pub now: BTreeMap<WeatherField, Fixed>,
    pub wet_bulb: Fixed,
    pub present_weather: String,
    pub forecast_am: String,
    pub forecast_pm: String,
}

impl WeatherMetrics {
    pub fn get(&self, field: WeatherField) -> Fixed {
        self.now
            .get(&field)
            .copied()
            .unwrap_or_else(|| Reading::Missing.fixed(0))
    }
}

/// Run the full request chain for `coords`.
pub async fn aggregate<C: FeedClient>(
    client: &C,
    forecast_endpoint: &str,
    points_endpoint: &str,
    coords: Coordinates,
) -> FeedResult<WeatherMetrics> {
    let fields = FORECAST_FIELDS.join(",");
    let latitude = ("latitude", coords.latitude.to_string());
    let longitude = ("longitude", coords.longitude.to_string());

    let now_url = with_query(
        forecast_endpoint,
        &[latitude.clone(), longitude.clone(), ("current", fields.clone())],
    )?;
    let forecast_now = client.fetch_json(&now_url).await?;

    let next_url = with_query(
        forecast_endpoint,
        &[
            latitude,
            longitude,
            ("forecast_days", "2".to_string()),
            ("hourly", fields),
        ],
    )?;
    let forecast_next = client.fetch_json(&next_url).await?;

    let points_url = format!(
        "{}/{:.4},{:.4}",
        points_endpoint.trim_end_matches('/'),
        coords.latitude,
        coords.longitude
    );
    let points = client.fetch_json(&points_url).await?;
    let stations_url = required_str(&points, "properties.observationStations", &points_url)?;

    let stations = client.fetch_json(&stations_url).await?;
    let station_id = required_str(&stations, "features.0.id", &stations_url)?;
    log::debug!("[Weather] nearest station {}", station_id);

    let observation_url = format!("{}/observations/latest", station_id.trim_end_matches('/'));
    let observation = client.fetch_json(&observation_url).await?;

    Ok(merge(&forecast_now, &forecast_next, station_id, &observation))
}

/// Combine the forecast payloads and the station observation.
pub fn merge(
    forecast_now: &Value,
    forecast_next: &Value,
    station_id: String,
    observation: &Value,
) -> WeatherMetrics {
    let current = lookup(forecast_now, "current");
    let hourly_code = |hour: usize| lookup(forecast_next, &format!("hourly.weather_code.{}", hour));

    let now = FIELDS
        .iter()
        .map(|spec| (spec.field, select_field(spec, observation, current)))
        .collect();

    let present_weather = match lookup(observation, "properties.presentWeather.0.weather") {
        Value::Null => describe_weather_code(lookup(current, "weather_code")).to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    WeatherMetrics {
        station: Station {
            id: station_id,
            name: lookup(observation, "properties.stationName")
                .as_str()
                .map(str::to_string),
        },
        now,
        wet_bulb: Reading::from_json(lookup(current, "wet_bulb_temperature_2m")).fixed(WET_BULB_DECIMALS),
        present_weather,
        forecast_am: describe_weather_code(hourly_code(FORECAST_AM_HOUR)).to_string(),
        forecast_pm: describe_weather_code(hourly_code(FORECAST_PM_HOUR)).to_string(),
    }
}

/// Station value (scaled by the divisor) if numeric, else the forecast's
/// current value unchanged, else MISSING.
pub fn select_field(spec: &FieldSpec, observation: &Value, current: &Value) -> Fixed {
    let path = format!("properties.{}.value", spec.station_field);
    let value = match Reading::from_json(lookup(observation, &path)) {
        Reading::Value(v) => Reading::from_f64(v / spec.divisor),
        Reading::Missing => {
            log::debug!(
                "[Weather] station has no {}, using forecast {}",
                spec.station_field,
                spec.forecast_field
            );
            Reading::from_json(lookup(current, spec.forecast_field))
        }
    };
    value.fixed(spec.decimals)
}

/// Description for a WMO weather interpretation code.
pub fn describe_weather_code(code: &Value) -> &'static str {
    let Some(number) = code.as_f64() else {
        return "Invalid input: Code must be a number.";
    };
    if number.fract() != 0.0 {
        return "Unknown weather code";
    }
    match number as i64 {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm: Slight or moderate",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown weather code",
    }
}

fn required_str(data: &Value, path: &str, url: &str) -> FeedResult<String> {
    lookup(data, path)
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FeedError::MissingField {
            url: url.to_string(),
            field: path.to_string(),
        })
}
