//! Envdash
//!
//! Merges a garage sensor device's status, a government weather feed and an
//! air-quality feed into one classified snapshot, refreshed on a timer and on
//! demand.

/// Open-Meteo air quality: current and next-day pollutant readings.
pub mod air_quality;

/// Range tables, severity labels, wet-bulb and door colours.
pub mod classify;

/// YAML configuration: endpoints, cadence, fallback location, table overrides.
pub mod config;

/// Single-flight refresh cycles on a timer and on user action.
pub mod controller;

/// The garage device's status payload and run command.
pub mod device;

/// Error types shared by the pipeline stages.
pub mod error;

/// JSON feed access and the test mock.
pub mod feed;

/// Postal code to coordinates.
pub mod geo;

/// Numeric readings and the MISSING sentinel.
pub mod metric;

/// HTTP surface for the latest snapshot and user triggers.
pub mod server;

/// The published snapshot and its channel.
pub mod snapshot;

/// NWS station observation with Open-Meteo fallback.
pub mod weather;

pub use config::Config;
pub use controller::{PollingController, TriggerOutcome, TriggerReason};
pub use feed::{FeedClient, HttpFeedClient};
pub use snapshot::StatusSnapshot;
