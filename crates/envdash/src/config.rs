use crate::classify::{Classifier, Family, RangeTable, RangeTableConfig};
use crate::feed::DEFAULT_USER_AGENT;
use crate::geo::GeoQuery;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoints: Endpoints,

    /// Seconds between scheduled refreshes
    pub poll_interval_secs: u64,

    /// Wait after an accepted run command before refreshing, in milliseconds
    pub run_settle_ms: u64,

    /// Address of the JSON HTTP surface
    pub listen: String,

    pub user_agent: String,

    /// Used for any field the device leaves empty
    pub location: GeoQuery,

    /// Per-family range table overrides
    pub tables: BTreeMap<Family, RangeTableConfig>,
}

/// Feed URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub device_status: String,
    pub device_run: String,
    pub geocoding: String,
    pub air_quality: String,
    pub forecast: String,
    pub points: String,
    pub forecast_page: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            device_status: "http://127.0.0.1/api/status".to_string(),
            device_run: "http://127.0.0.1/api/run".to_string(),
            geocoding: "https://api.openweathermap.org/geo/1.0/zip".to_string(),
            air_quality: "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
            forecast: "https://api.open-meteo.com/v1/forecast".to_string(),
            points: "https://api.weather.gov/points".to_string(),
            forecast_page: "https://forecast.weather.gov/MapClick.php".to_string(),
        }
    }
}

impl Endpoints {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("device_status", self.device_status.as_str()),
            ("device_run", self.device_run.as_str()),
            ("geocoding", self.geocoding.as_str()),
            ("air_quality", self.air_quality.as_str()),
            ("forecast", self.forecast.as_str()),
            ("points", self.points.as_str()),
            ("forecast_page", self.forecast_page.as_str()),
        ]
        .into_iter()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            poll_interval_secs: 30,
            run_settle_ms: 1000,
            listen: "127.0.0.1:8080".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            location: GeoQuery::default(),
            tables: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `path` if given, else the default file when it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    log::info!(
                        "[Config] {} not found, using defaults",
                        default.display()
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        self.listen_addr()?;
        for (name, url) in self.endpoints.iter() {
            Url::parse(url).map_err(|e| {
                ConfigError::ValidationError(format!("endpoints.{}: '{}' {}", name, url, e))
            })?;
        }
        for (family, table) in &self.tables {
            RangeTable::from_config(table.clone()).map_err(|e| {
                ConfigError::ValidationError(format!("{} table: {}", family, e))
            })?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::ValidationError(format!("listen: '{}' is not a socket address", self.listen))
        })
    }

    /// Built-in tables with the configured overrides applied.
    pub fn classifier(&self) -> Result<Classifier, ConfigError> {
        Classifier::new(&self.tables).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn run_settle(&self) -> Duration {
        Duration::from_millis(self.run_settle_ms)
    }
}

/// `~/.envdash/config.yaml`
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".envdash")
        .join("config.yaml")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Reading;
    use std::io::Write;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.run_settle(), Duration::from_secs(1));
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
endpoints:
  device_status: http://garage.local/api/status
  device_run: http://garage.local/api/run
poll_interval_secs: 60
listen: 0.0.0.0:9000
location:
  postal_code: "02139"
  country_code: US
  api_key: secret
tables:
  aqi:
    entries:
      - { min: 0, max: 100, label: green }
      - { min: 100, max: 500, label: red }
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.endpoints.device_status, "http://garage.local/api/status");
        // unspecified endpoints keep their defaults
        assert_eq!(config.endpoints.points, "https://api.weather.gov/points");
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.location.postal_code.as_deref(), Some("02139"));

        let classifier = config.classifier().unwrap();
        assert_eq!(classifier.classify(Family::Aqi, Reading::Value(75.0)), "green");
        assert_eq!(classifier.classify(Family::Aqi, Reading::Value(600.0)), "white");
        // other families untouched
        assert_eq!(classifier.classify(Family::Uv, Reading::Value(6.0)), "red");
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "poll_interval_secs: 0",
            "listen: localhost",
            "endpoints: { forecast: not-a-url }",
            "tables: { pm10: { entries: [ { min: 10, max: 5, label: red } ] } }",
            "tables: { co: { entries: [] } }",
        ];
        for yaml in cases {
            assert!(
                matches!(Config::parse(yaml), Err(ConfigError::ValidationError(_))),
                "accepted: {}",
                yaml
            );
        }
    }

    #[test]
    fn test_override_with_gap_is_valid() {
        let yaml = "tables: { pm10: { entries: [ { min: 0, max: 425, label: red }, { min: 435, max: 100000000, label: purple } ] } }";
        let config = Config::parse(yaml).unwrap();
        let classifier = config.classifier().unwrap();
        assert_eq!(classifier.custom_gaps(), &[(Family::Pm10, 425.0, 435.0)]);
        assert_eq!(classifier.classify(Family::Pm10, Reading::Value(430.0)), "white");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Config::parse("poll_interval_secs: soon"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            Config::parse("tables: { smog: { entries: [] } }"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "run_settle_ms: 250").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.run_settle(), Duration::from_millis(250));

        let missing = Config::from_file("/nonexistent/envdash.yaml");
        assert!(matches!(missing, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "listen: 127.0.0.1:9999\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9999);
    }

    #[test]
    fn test_default_path() {
        assert!(default_path().ends_with(".envdash/config.yaml"));
    }
}
