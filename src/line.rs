//! Metric line rendering
//!
//! Every value-change notification becomes one [`MetricSample`], which is
//! rendered into a single line of the collector's text format:
//!
//! ```text
//! xadc_host,host=<hostname>,type=<metric> value=<value>
//! ```

use crate::error::{PipelineError, Result};
use chrono::Utc;

/// Measurement name written at the start of every line
pub const MEASUREMENT: &str = "xadc_host";

/// One sensor update, captured when the notification fires
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Host the sample was taken on
    pub source_host: String,
    /// Lower-cased metric identifier (e.g. `temp`, `vccint`)
    pub metric_name: String,
    /// Scaled reading
    pub value: f64,
    /// Notification time in nanoseconds since the epoch
    pub timestamp_nanos: i64,
}

impl MetricSample {
    /// Create a sample; the metric name is lower-cased.
    pub fn new(
        source_host: impl Into<String>,
        metric_name: &str,
        value: f64,
        timestamp_nanos: i64,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            metric_name: metric_name.to_lowercase(),
            value,
            timestamp_nanos,
        }
    }

    /// Create a sample from a notification timestamp in (fractional) seconds
    pub fn from_notification(
        source_host: impl Into<String>,
        metric_name: &str,
        value: f64,
        timestamp_seconds: f64,
    ) -> Self {
        Self::new(
            source_host,
            metric_name,
            value,
            (timestamp_seconds * 1e9) as i64,
        )
    }

    /// Create a sample stamped with the current wall-clock time
    pub fn now(source_host: impl Into<String>, metric_name: &str, value: f64) -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self::new(source_host, metric_name, value, nanos)
    }
}

/// Renders samples into collector lines for one host.
#[derive(Debug, Clone)]
pub struct MetricFormatter {
    host: String,
}

impl MetricFormatter {
    /// Formatter tagging every line with `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Host tag used for lines built by [`MetricFormatter::line`]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build and render a sample for this formatter's host
    pub fn line(&self, metric_name: &str, value: f64, timestamp_seconds: f64) -> Result<String> {
        let sample =
            MetricSample::from_notification(self.host.as_str(), metric_name, value, timestamp_seconds);
        format_line(&sample)
    }
}

/// Render a sample as one line.
///
/// NaN and infinities have no representation in the line format and are
/// rejected.
pub fn format_line(sample: &MetricSample) -> Result<String> {
    if !sample.value.is_finite() {
        return Err(PipelineError::InvalidSample(format!(
            "{}={}",
            sample.metric_name, sample.value
        )));
    }
    Ok(format!(
        "{},host={},type={} value={}",
        MEASUREMENT, sample.source_host, sample.metric_name, sample.value
    ))
}
