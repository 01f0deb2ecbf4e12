//! Error types for XADC
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for XADC operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for XADC operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sensor error
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Delivery error
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Sample cannot be rendered as a metric line
    #[error("Invalid sample: {0}")]
    InvalidSample(String),
}

/// Errors while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Enabled destination without a URL
    #[error("Destination '{name}' is enabled but has no url")]
    MissingUrl { name: String },

    /// Enabled destination with an unusable URL
    #[error("Destination '{name}' has invalid url '{url}': {reason}")]
    InvalidUrl {
        name: String,
        url: String,
        reason: String,
    },

    /// Value out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors reading a sensor through the value source
#[derive(Error, Debug)]
pub enum SensorError {
    /// Sensor name not registered
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// Raw file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Raw file did not hold an integer
    #[error("Malformed raw value in {path}: '{raw}'")]
    Parse { path: String, raw: String },
}

/// Errors delivering a batch to the collector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// Destination unreachable, timed out, DNS failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Collector answered with a non-success status (or 400)
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl DeliveryError {
    /// True for failures that never reached the collector
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
