//! Configuration types for XADC
//!
//! TOML with defaults for every field. A missing or unreadable file is not an
//! error: [`Config::load_or_default`] falls back to defaults (no
//! destinations) and hands the reason back for logging. Validation is
//! separate and its errors are fatal at startup.
//!
//! ```toml
//! [ioc]
//! prefix = "$hostname:XADC:"
//!
//! [[destinations]]
//! name = "influx"
//! url = "https://collector:8086/write?db=telemetry"
//! username = "xadc"
//! password = "secret"
//! ```

use crate::error::ConfigError;
use crate::queue::DEFAULT_MEMORY_CEILING;
use crate::sender::{SenderConfig, DEFAULT_BATCH_SIZE};
use crate::transport::{Credentials, DEFAULT_REQUEST_TIMEOUT};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Macro replaced by the local hostname in the PV prefix
pub const HOSTNAME_MACRO: &str = "$hostname";

/// Default IIO device exposing the XADC channels
pub const DEFAULT_IIO_DEVICE: &str = "/sys/bus/iio/devices/iio:device0";

/// Default PV prefix
pub const DEFAULT_PREFIX: &str = "ZYNQ:";

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/xadc-ioc.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Value source settings
    pub ioc: IocConfig,
    /// Egress destinations, each with its own pipeline
    pub destinations: Vec<DestinationConfig>,
}

/// Value source settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IocConfig {
    /// PV prefix template, may contain `$hostname`
    pub prefix: String,
    /// Sensor scan period in milliseconds
    pub scan_period_ms: u64,
    /// IIO device directory
    pub iio_device: String,
}

impl Default for IocConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            scan_period_ms: 1000,
            iio_device: DEFAULT_IIO_DEVICE.to_string(),
        }
    }
}

impl IocConfig {
    /// Scan period as a duration
    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms.max(1))
    }
}

/// One egress destination
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Name used in diagnostics
    pub name: String,
    /// Whether a pipeline is started for this destination
    pub enabled: bool,
    /// Collector URL (required when enabled)
    pub url: Option<String>,
    /// Basic-auth username
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Lines per request
    pub batch_size: usize,
    /// Poll interval with less than a batch pending (ms)
    pub idle_interval_ms: u64,
    /// Poll interval with a backlog (ms)
    pub busy_interval_ms: u64,
    /// Resident memory above which samples are dropped (bytes)
    pub memory_ceiling_bytes: u64,
    /// HTTP request timeout (ms)
    pub request_timeout_ms: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            enabled: true,
            url: None,
            username: None,
            password: None,
            batch_size: DEFAULT_BATCH_SIZE,
            idle_interval_ms: 2000,
            busy_interval_ms: 1000,
            memory_ceiling_bytes: DEFAULT_MEMORY_CEILING,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DestinationConfig {
    /// Destination with `url` and defaults for everything else
    pub fn with_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Sender parameters for this destination
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            destination: self.name.clone(),
            batch_size: self.batch_size,
            idle_interval: Duration::from_millis(self.idle_interval_ms),
            busy_interval: Duration::from_millis(self.busy_interval_ms),
        }
    }

    /// Basic-auth credentials, if a username is set
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.as_deref(), self.password.as_deref())
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check the fields an enabled destination needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        let url = match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => {
                return Err(ConfigError::MissingUrl {
                    name: self.name.clone(),
                })
            }
        };
        let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            name: self.name.clone(),
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                name: self.name.clone(),
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let positive = [
            ("batch_size", self.batch_size as u64),
            ("idle_interval_ms", self.idle_interval_ms),
            ("busy_interval_ms", self.busy_interval_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.{}", self.name, field),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// Load `path`, or fall back to defaults when it cannot be read or parsed.
    ///
    /// The second element carries the reason defaults were used.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<ConfigError>) {
        match Self::from_file(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Validate every destination
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.destinations.iter().try_for_each(|d| d.validate())
    }

    /// Destinations a pipeline should be started for
    pub fn enabled_destinations(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter().filter(|d| d.enabled)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

/// Substitute the hostname macro in a prefix template
pub fn resolve_prefix(template: &str, hostname: &str) -> String {
    template.replace(HOSTNAME_MACRO, hostname)
}

/// Hostname of this machine, `localhost` if it cannot be determined
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.ioc.prefix, "ZYNQ:");
        assert_eq!(config.ioc.scan_period(), Duration::from_secs(1));
        assert_eq!(config.ioc.iio_device, DEFAULT_IIO_DEVICE);
        assert!(config.destinations.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_destination() {
        let toml = r#"
            [ioc]
            prefix = "$hostname:XADC:"
            scan_period_ms = 500

            [[destinations]]
            name = "influx"
            url = "https://collector:8086/write?db=telemetry"
            username = "xadc"
            password = "secret"
            batch_size = 50
            memory_ceiling_bytes = 1048576
        "#;
        let config = Config::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.ioc.scan_period_ms, 500);

        let dest = &config.destinations[0];
        assert!(dest.enabled);
        assert_eq!(dest.batch_size, 50);
        assert_eq!(dest.memory_ceiling_bytes, 1_048_576);
        assert_eq!(dest.idle_interval_ms, 2000);

        let creds = dest.credentials().unwrap();
        assert_eq!(creds.username, "xadc");

        let sender = dest.sender_config();
        assert_eq!(sender.destination, "influx");
        assert_eq!(sender.batch_size, 50);
        assert_eq!(sender.busy_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_enabled_without_url_is_fatal() {
        let config = Config::from_str("[[destinations]]\nname = \"influx\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingUrl { .. })
        ));
    }

    #[test]
    fn test_disabled_without_url_is_fine() {
        let config = Config::from_str("[[destinations]]\nenabled = false\n").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_destinations().count(), 0);
    }

    #[test]
    fn test_invalid_url() {
        let dest = DestinationConfig::with_url("x", "not a url");
        assert!(matches!(dest.validate(), Err(ConfigError::InvalidUrl { .. })));

        let dest = DestinationConfig::with_url("x", "ftp://collector/");
        assert!(matches!(dest.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_zero_batch_size() {
        let mut dest = DestinationConfig::with_url("x", "http://collector/");
        dest.batch_size = 0;
        assert!(matches!(
            dest.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_intervals_and_timeout() {
        for field in ["idle_interval_ms", "busy_interval_ms", "request_timeout_ms"] {
            let toml = format!(
                "[[destinations]]\nname = \"influx\"\nurl = \"http://collector/\"\n{} = 0\n",
                field
            );
            let config = Config::from_str(&toml).unwrap();
            match config.validate() {
                Err(ConfigError::InvalidValue { field: name, .. }) => {
                    assert_eq!(name, format!("influx.{}", field))
                }
                other => panic!("{} = 0 accepted: {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_missing_file_degrades_to_defaults() {
        let (config, err) = Config::load_or_default("/nonexistent/xadc-ioc.toml");
        assert!(config.destinations.is_empty());
        assert!(matches!(err, Some(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unparseable_file_degrades_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid {{ toml").unwrap();
        let (config, err) = Config::load_or_default(file.path());
        assert_eq!(config.ioc.prefix, DEFAULT_PREFIX);
        assert!(matches!(err, Some(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[destinations]]\nurl = \"http://127.0.0.1:8086/write\"").unwrap();
        let (config, err) = Config::load_or_default(file.path());
        assert!(err.is_none());
        assert_eq!(config.enabled_destinations().count(), 1);
    }

    #[test]
    fn test_resolve_prefix() {
        assert_eq!(resolve_prefix("$hostname:XADC:", "zynq-01"), "zynq-01:XADC:");
        assert_eq!(resolve_prefix("ZYNQ:", "zynq-01"), "ZYNQ:");
    }

    #[test]
    fn test_local_hostname_not_empty() {
        assert!(!local_hostname().is_empty());
    }
}
