//! Error types for the aggregation pipeline.
//!
//! Field-level misses never show up here; they are absorbed as
//! [`Reading::Missing`](crate::metric::Reading::Missing). These errors cover
//! whole-request failures, which propagate up to the polling controller.

use thiserror::Error;

/// Failure of a single feed request.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Connection, TLS or body transfer failure
    #[error("HTTP error for {url}: {message}")]
    Transport { url: String, message: String },

    /// The feed answered with a non-success status
    #[error("Feed {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The body was not valid JSON
    #[error("Decode error for {url}: {message}")]
    Decode { url: String, message: String },

    /// A link needed to follow a request chain was absent
    #[error("Missing field '{field}' in response from {url}")]
    MissingField { url: String, field: String },

    /// A request URL could not be built from the configured endpoint
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;

/// Failure to turn a postal code into coordinates.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Geocoding request failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Geocoding response has no usable coordinates")]
    NoCoordinates,

    #[error("Geocoding query incomplete: missing {0}")]
    IncompleteQuery(&'static str),
}

/// Failure of the side-effecting device command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Device command request failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Device command failed with status {0}")]
    Status(u16),
}

/// Any failure that aborts one refresh cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl CycleError {
    /// Short message suitable for showing next to the dashboard controls.
    pub fn user_message(&self) -> &'static str {
        match self {
            CycleError::Feed(_) => "Error: Check connection.",
            CycleError::Geo(_) => "Error: Location lookup failed.",
            CycleError::Command(_) => "Error during RUN.",
        }
    }
}
