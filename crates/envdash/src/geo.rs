//! Postal code to coordinates, via the OpenWeather geocoding feed.

use crate::error::GeoError;
use crate::feed::{with_query, FeedClient};
use serde::{Deserialize, Serialize};

/// A geographic position, resolved once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Inputs for one geocoding lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoQuery {
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub api_key: Option<String>,
}

impl GeoQuery {
    /// Fill any field missing or blank here from `fallback`.
    pub fn or(self, fallback: &GeoQuery) -> GeoQuery {
        let pick = |own: Option<String>, other: &Option<String>| {
            own.filter(|s| !s.trim().is_empty()).or_else(|| other.clone())
        };
        GeoQuery {
            postal_code: pick(self.postal_code, &fallback.postal_code),
            country_code: pick(self.country_code, &fallback.country_code),
            api_key: pick(self.api_key, &fallback.api_key),
        }
    }
}

/// Resolve `query` against the geocoding `endpoint`.
///
/// No caching: every cycle performs a fresh lookup.
pub async fn resolve<C: FeedClient>(
    client: &C,
    endpoint: &str,
    query: &GeoQuery,
) -> Result<Coordinates, GeoError> {
    let postal_code = non_empty(&query.postal_code).ok_or(GeoError::IncompleteQuery("postal code"))?;
    let country = non_empty(&query.country_code).ok_or(GeoError::IncompleteQuery("country"))?;
    let api_key = non_empty(&query.api_key).ok_or(GeoError::IncompleteQuery("API key"))?;

    let url = with_query(
        endpoint,
        &[
            ("zip", format!("{},{}", postal_code, country)),
            ("appid", api_key.to_string()),
        ],
    )?;
    let data = client.fetch_json(&url).await?;

    match (
        data.get("lat").and_then(|v| v.as_f64()),
        data.get("lon").and_then(|v| v.as_f64()),
    ) {
        (Some(latitude), Some(longitude)) => {
            log::debug!(
                "[Geo] {} {} -> ({:.4}, {:.4})",
                postal_code,
                country,
                latitude,
                longitude
            );
            Ok(Coordinates {
                latitude,
                longitude,
            })
        }
        _ => Err(GeoError::NoCoordinates),
    }
}

/// Link to the human-readable forecast page for `coords`.
pub fn forecast_link(page: &str, coords: Coordinates) -> Option<String> {
    with_query(
        page,
        &[
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
        ],
    )
    .ok()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
