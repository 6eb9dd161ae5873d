//! Severity classification over ordered, inclusive range tables.
//!
//! A table is evaluated in declared order and the first entry with
//! `min <= value <= max` wins, so a value sitting exactly on a shared
//! boundary takes the lower entry's label. Tables are validated when built:
//! entries must be finite, non-inverted, and each must start at or after the
//! previous entry's max.

use crate::metric::Reading;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label used when no entry matches or the value is MISSING.
pub const DEFAULT_LABEL: &str = "white";

/// Labels of the six-tier severity scale, lowest first.
const SEVERITY: [&str; 6] = ["green", "yellow", "orange", "red", "brown", "purple"];

/// Metric families that have a range table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Family {
    #[serde(rename = "aqi")]
    Aqi,
    #[serde(rename = "voc")]
    Voc,
    #[serde(rename = "co")]
    Co,
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
    #[serde(rename = "uv")]
    Uv,
}

impl Family {
    pub const ALL: [Family; 9] = [
        Family::Aqi,
        Family::Voc,
        Family::Co,
        Family::No2,
        Family::O3,
        Family::So2,
        Family::Pm2_5,
        Family::Pm10,
        Family::Uv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::Aqi => "aqi",
            Family::Voc => "voc",
            Family::Co => "co",
            Family::No2 => "no2",
            Family::O3 => "o3",
            Family::So2 => "so2",
            Family::Pm2_5 => "pm2_5",
            Family::Pm10 => "pm10",
            Family::Uv => "uv",
        }
    }

    /// The shipped table for this family.
    pub fn builtin(self) -> RangeTableConfig {
        match self {
            Family::Aqi => severity_scale(&[0.0, 50.0, 100.0, 150.0, 200.0, 300.0, 1000.0]),
            Family::Co => severity_scale(&[0.0, 4500.0, 9500.0, 12500.0, 15500.0, 30500.0, 1e8]),
            Family::No2 => severity_scale(&[0.0, 54.0, 100.0, 360.0, 650.0, 1250.0, 1e8]),
            Family::O3 => severity_scale(&[0.0, 55.0, 70.0, 85.0, 105.0, 200.0, 1e8]),
            Family::So2 => severity_scale(&[0.0, 35.0, 75.0, 185.0, 305.0, 350.0, 1e8]),
            Family::Pm2_5 => severity_scale(&[0.0, 12.0, 35.5, 55.5, 150.5, 250.5, 1e8]),
            Family::Pm10 => severity_scale(&[0.0, 55.0, 155.0, 255.0, 355.0, 425.0, 1e8]),
            Family::Uv => severity_scale(&[0.0, 2.5, 3.5, 5.5, 7.5, 10.5, 1e8]),
            // Gas resistance in ohms: higher means cleaner air.
            Family::Voc => RangeTableConfig {
                // Each boundary belongs to the cleaner (upper) tier.
                entries: vec![
                    RangeEntry::new(0.0, just_below(1e4), "purple"),
                    RangeEntry::new(1e4, just_below(2.5e4), "brown"),
                    RangeEntry::new(2.5e4, just_below(5e4), "red"),
                    RangeEntry::new(5e4, just_below(7.5e4), "orange"),
                    RangeEntry::new(7.5e4, just_below(1e5), "yellow"),
                    RangeEntry::new(1e5, 1e10, "green"),
                ],
                default: Some("black".to_string()),
            },
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest `f64` strictly below a positive finite `bound`.
fn just_below(bound: f64) -> f64 {
    f64::from_bits(bound.to_bits() - 1)
}

/// No `f64` lies strictly between `low` and `high`.
fn adjacent(low: f64, high: f64) -> bool {
    low >= 0.0 && high > 0.0 && high.to_bits() == low.to_bits() + 1
}

fn severity_scale(bounds: &[f64; 7]) -> RangeTableConfig {
    RangeTableConfig {
        entries: bounds
            .windows(2)
            .zip(SEVERITY)
            .map(|(pair, label)| RangeEntry::new(pair[0], pair[1], label))
            .collect(),
        default: None,
    }
}

/// One inclusive bracket of a range table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub min: f64,
    pub max: f64,
    pub label: String,
}

impl RangeEntry {
    pub fn new(min: f64, max: f64, label: &str) -> Self {
        Self {
            min,
            max,
            label: label.to_string(),
        }
    }

    fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Unvalidated table as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeTableConfig {
    pub entries: Vec<RangeEntry>,
    /// Label for MISSING or unmatched values (defaults to `white`)
    #[serde(default)]
    pub default: Option<String>,
}

/// Invalid range table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("range table has no entries")]
    Empty,

    #[error("entry {index} has a non-finite bound")]
    NonFinite { index: usize },

    #[error("entry {index} has min {min} above max {max}")]
    Inverted { index: usize, min: f64, max: f64 },

    #[error("entry {index} starts at {min}, inside the previous entry ending at {previous_max}")]
    Overlap {
        index: usize,
        min: f64,
        previous_max: f64,
    },

    #[error("{family} table: {source}")]
    InFamily {
        family: Family,
        #[source]
        source: Box<TableError>,
    },
}

/// A validated, ordered range table.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable {
    entries: Vec<RangeEntry>,
    default_label: String,
}

impl RangeTable {
    pub fn new(entries: Vec<RangeEntry>, default_label: impl Into<String>) -> Result<Self, TableError> {
        if entries.is_empty() {
            return Err(TableError::Empty);
        }
        for (index, entry) in entries.iter().enumerate() {
            if !entry.min.is_finite() || !entry.max.is_finite() {
                return Err(TableError::NonFinite { index });
            }
            if entry.min > entry.max {
                return Err(TableError::Inverted {
                    index,
                    min: entry.min,
                    max: entry.max,
                });
            }
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].min < pair[0].max {
                return Err(TableError::Overlap {
                    index: index + 1,
                    min: pair[1].min,
                    previous_max: pair[0].max,
                });
            }
        }
        Ok(Self {
            entries,
            default_label: default_label.into(),
        })
    }

    pub fn from_config(config: RangeTableConfig) -> Result<Self, TableError> {
        let default_label = config.default.unwrap_or_else(|| DEFAULT_LABEL.to_string());
        Self::new(config.entries, default_label)
    }

    /// Label of the first entry containing `value`, else the default.
    pub fn classify(&self, value: Reading) -> &str {
        value
            .value()
            .and_then(|v| self.entries.iter().find(|e| e.contains(v)))
            .map_or(self.default_label.as_str(), |e| e.label.as_str())
    }

    /// Open intervals between consecutive entries that no entry covers.
    pub fn gaps(&self) -> Vec<(f64, f64)> {
        self.entries
            .windows(2)
            .filter(|pair| pair[1].min > pair[0].max && !adjacent(pair[0].max, pair[1].min))
            .map(|pair| (pair[0].max, pair[1].min))
            .collect()
    }

    pub fn entries(&self) -> &[RangeEntry] {
        &self.entries
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }
}

/// Free-function form of [`RangeTable::classify`].
pub fn classify(value: Reading, table: &RangeTable) -> &str {
    table.classify(value)
}

/// The full set of tables used for one deployment.
#[derive(Debug, Clone)]
pub struct Classifier {
    tables: BTreeMap<Family, RangeTable>,
    custom_gaps: Vec<(Family, f64, f64)>,
}

impl Classifier {
    /// Built-in tables, with any family in `overrides` replaced.
    pub fn new(overrides: &BTreeMap<Family, RangeTableConfig>) -> Result<Self, TableError> {
        let mut tables = BTreeMap::new();
        let mut custom_gaps = Vec::new();
        for family in Family::ALL {
            let custom = overrides.get(&family);
            let config = custom.cloned().unwrap_or_else(|| family.builtin());
            let table = RangeTable::from_config(config).map_err(|e| TableError::InFamily {
                family,
                source: Box::new(e),
            })?;
            if custom.is_some() {
                custom_gaps.extend(table.gaps().into_iter().map(|(low, high)| (family, low, high)));
            }
            tables.insert(family, table);
        }
        Ok(Self { tables, custom_gaps })
    }

    /// Uncovered intervals in overridden tables, as `(family, low, high)`.
    pub fn custom_gaps(&self) -> &[(Family, f64, f64)] {
        &self.custom_gaps
    }

    /// Warn once per uncovered interval in an overridden table.
    pub fn log_gaps(&self) {
        for &(family, low, high) in &self.custom_gaps {
            log::warn!(
                "[Classifier] {} table leaves ({}, {}) uncovered; values there fall back to '{}'",
                family,
                low,
                high,
                self.table(family).map_or(DEFAULT_LABEL, |t| t.default_label())
            );
        }
    }

    pub fn builtin() -> Result<Self, TableError> {
        Self::new(&BTreeMap::new())
    }

    pub fn table(&self, family: Family) -> Option<&RangeTable> {
        self.tables.get(&family)
    }

    pub fn classify(&self, family: Family, value: Reading) -> &str {
        self.tables
            .get(&family)
            .map_or(DEFAULT_LABEL, |table| table.classify(value))
    }
}

/// Where a temperature/humidity pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorOrigin {
    /// A physical sensor attached to the device
    Sensor,
    /// Anything else (CPU estimate, relayed value, unknown)
    Other,
}

impl SensorOrigin {
    /// The device reports `"sensor"` for readings from real hardware.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.trim().eq_ignore_ascii_case("sensor") => SensorOrigin::Sensor,
            _ => SensorOrigin::Other,
        }
    }
}

/// Wet-bulb temperature (°C) by Stull's approximation.
///
/// Only computed for physical-sensor readings; MISSING otherwise.
pub fn wet_bulb_from_sensor(temperature: Reading, humidity: Reading, origin: SensorOrigin) -> Reading {
    let (t, rh) = match (origin, temperature.value(), humidity.value()) {
        (SensorOrigin::Sensor, Some(t), Some(rh)) => (t, rh),
        _ => return Reading::Missing,
    };
    let wet_bulb = t * (0.151977 * (rh + 8.313659).sqrt()).atan() + (t + rh).atan()
        - (rh - 1.676331).atan()
        + 0.00391838 * rh.powf(1.5) * (0.023101 * rh).atan()
        - 4.686035;
    Reading::from_f64(wet_bulb)
}

/// Colour for the garage door state.
pub fn door_label(state: &str) -> &'static str {
    match state.trim() {
        "OPEN" => "red",
        "CLOSED" => "green",
        _ => "orange",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(family: Family) -> RangeTable {
        RangeTable::from_config(family.builtin()).unwrap()
    }

    #[test]
    fn test_aqi_labels() {
        let aqi = builtin(Family::Aqi);
        assert_eq!(aqi.classify(Reading::Value(42.0)), "green");
        assert_eq!(aqi.classify(Reading::Value(75.0)), "yellow");
        assert_eq!(aqi.classify(Reading::Value(125.0)), "orange");
        assert_eq!(aqi.classify(Reading::Value(175.0)), "red");
        assert_eq!(aqi.classify(Reading::Value(250.0)), "brown");
        assert_eq!(aqi.classify(Reading::Value(999.0)), "purple");
    }

    #[test]
    fn test_shared_boundary_takes_first_entry() {
        let aqi = builtin(Family::Aqi);
        assert_eq!(aqi.classify(Reading::Value(100.0)), "yellow");
        assert_eq!(aqi.classify(Reading::Value(50.0)), "green");
        let co = builtin(Family::Co);
        assert_eq!(co.classify(Reading::Value(4500.0)), "green");
    }

    #[test]
    fn test_missing_and_unmatched_use_default() {
        let aqi = builtin(Family::Aqi);
        assert_eq!(aqi.classify(Reading::Missing), "white");
        assert_eq!(aqi.classify(Reading::Value(-1.0)), "white");
        assert_eq!(aqi.classify(Reading::Value(1001.0)), "white");

        let voc = builtin(Family::Voc);
        assert_eq!(voc.classify(Reading::Missing), "black");
        assert_eq!(voc.classify(Reading::Value(2e5)), "green");
        assert_eq!(voc.classify(Reading::Value(5000.0)), "purple");
    }

    #[test]
    fn test_voc_boundaries_take_cleaner_tier() {
        let voc = builtin(Family::Voc);
        assert_eq!(voc.classify(Reading::Value(1e5)), "green");
        assert_eq!(voc.classify(Reading::Value(99_999.9)), "yellow");
        assert_eq!(voc.classify(Reading::Value(7.5e4)), "yellow");
        assert_eq!(voc.classify(Reading::Value(5e4)), "orange");
        assert_eq!(voc.classify(Reading::Value(2.5e4)), "red");
        assert_eq!(voc.classify(Reading::Value(1e4)), "brown");
        assert_eq!(voc.classify(Reading::Value(9_999.9)), "purple");
        assert_eq!(voc.classify(Reading::Value(0.0)), "purple");
        assert!(voc.gaps().is_empty());
    }

    #[test]
    fn test_first_match_property() {
        // Every value returns the label of the first entry that contains it.
        for family in Family::ALL {
            let table = builtin(family);
            let top = table.entries().last().unwrap().max;
            let mut v = -1.0;
            while v <= top.min(2000.0) {
                let expected = table
                    .entries()
                    .iter()
                    .find(|e| e.min <= v && v <= e.max)
                    .map_or(table.default_label(), |e| e.label.as_str());
                assert_eq!(classify(Reading::Value(v), &table), expected, "{} at {}", family, v);
                v += 0.25;
            }
        }
    }

    #[test]
    fn test_builtin_tables_cover_their_domain() {
        for family in Family::ALL {
            let table = builtin(family);
            assert!(table.gaps().is_empty(), "{} has gaps {:?}", family, table.gaps());
            assert_eq!(table.entries()[0].min, 0.0);
        }
    }

    #[test]
    fn test_pm10_gap_closed() {
        let pm10 = builtin(Family::Pm10);
        assert_eq!(pm10.classify(Reading::Value(424.0)), "brown");
        assert_eq!(pm10.classify(Reading::Value(430.0)), "purple");
        assert_eq!(pm10.classify(Reading::Value(434.9)), "purple");
    }

    #[test]
    fn test_uv_labels() {
        let uv = builtin(Family::Uv);
        assert_eq!(uv.classify(Reading::Value(1.0)), "green");
        assert_eq!(uv.classify(Reading::Value(3.0)), "yellow");
        assert_eq!(uv.classify(Reading::Value(11.0)), "purple");
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(matches!(RangeTable::new(vec![], "white"), Err(TableError::Empty)));
        assert!(matches!(
            RangeTable::new(vec![RangeEntry::new(5.0, 1.0, "x")], "white"),
            Err(TableError::Inverted { index: 0, .. })
        ));
        assert!(matches!(
            RangeTable::new(vec![RangeEntry::new(0.0, f64::INFINITY, "x")], "white"),
            Err(TableError::NonFinite { index: 0 })
        ));
        assert!(matches!(
            RangeTable::new(
                vec![RangeEntry::new(0.0, 10.0, "a"), RangeEntry::new(5.0, 20.0, "b")],
                "white"
            ),
            Err(TableError::Overlap { index: 1, .. })
        ));
        // Decreasing order is an overlap with the previous entry.
        assert!(matches!(
            RangeTable::new(
                vec![RangeEntry::new(10.0, 20.0, "a"), RangeEntry::new(0.0, 5.0, "b")],
                "white"
            ),
            Err(TableError::Overlap { index: 1, .. })
        ));
    }

    #[test]
    fn test_gaps_reported() {
        let table = RangeTable::new(
            vec![RangeEntry::new(0.0, 425.0, "a"), RangeEntry::new(435.0, 1e8, "b")],
            "white",
        )
        .unwrap();
        assert_eq!(table.gaps(), vec![(425.0, 435.0)]);
        assert_eq!(table.classify(Reading::Value(430.0)), "white");
    }

    #[test]
    fn test_classifier_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            Family::Uv,
            RangeTableConfig {
                entries: vec![RangeEntry::new(0.0, 5.0, "low"), RangeEntry::new(5.0, 20.0, "high")],
                default: Some("none".to_string()),
            },
        );
        let classifier = Classifier::new(&overrides).unwrap();
        assert!(classifier.custom_gaps().is_empty());
        assert_eq!(classifier.classify(Family::Uv, Reading::Value(6.0)), "high");
        assert_eq!(classifier.classify(Family::Uv, Reading::Missing), "none");
        assert_eq!(classifier.classify(Family::Aqi, Reading::Value(42.0)), "green");
    }

    #[test]
    fn test_custom_gaps_only_for_overrides() {
        assert!(Classifier::builtin().unwrap().custom_gaps().is_empty());

        let mut overrides = BTreeMap::new();
        overrides.insert(
            Family::Pm10,
            RangeTableConfig {
                entries: vec![RangeEntry::new(0.0, 425.0, "low"), RangeEntry::new(435.0, 1e8, "high")],
                default: None,
            },
        );
        let classifier = Classifier::new(&overrides).unwrap();
        assert_eq!(classifier.custom_gaps(), &[(Family::Pm10, 425.0, 435.0)]);
    }

    #[test]
    fn test_classifier_rejects_bad_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            Family::O3,
            RangeTableConfig {
                entries: vec![],
                default: None,
            },
        );
        let err = Classifier::new(&overrides).unwrap_err();
        assert_eq!(err.to_string(), "o3 table: range table has no entries");
    }

    #[test]
    fn test_wet_bulb_from_sensor() {
        let tw = wet_bulb_from_sensor(Reading::Value(20.0), Reading::Value(50.0), SensorOrigin::Sensor);
        let v = tw.value().unwrap();
        assert!((v - 13.7).abs() < 0.05, "got {}", v);
        assert_eq!(tw.fixed(1).to_string(), "13.7");
    }

    #[test]
    fn test_wet_bulb_requires_sensor_and_inputs() {
        assert!(wet_bulb_from_sensor(Reading::Value(20.0), Reading::Value(50.0), SensorOrigin::Other).is_missing());
        assert!(wet_bulb_from_sensor(Reading::Value(20.0), Reading::Missing, SensorOrigin::Sensor).is_missing());
        assert_eq!(SensorOrigin::from_tag(Some("sensor")), SensorOrigin::Sensor);
        assert_eq!(SensorOrigin::from_tag(Some("cpu")), SensorOrigin::Other);
        assert_eq!(SensorOrigin::from_tag(None), SensorOrigin::Other);
    }

    #[test]
    fn test_door_label() {
        assert_eq!(door_label("OPEN"), "red");
        assert_eq!(door_label("CLOSED"), "green");
        assert_eq!(door_label("N/A"), "orange");
    }
}
