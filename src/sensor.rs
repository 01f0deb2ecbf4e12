//! XADC sensor registry
//!
//! Each channel is an IIO sysfs file holding a raw integer. The engineering
//! value is `(raw + offset) * scale`. The registry is an ordinary value
//! built at startup and handed to the value source.

use crate::error::SensorError;
use std::path::{Path, PathBuf};

/// Scale of the on-die temperature channel (°C per LSB)
pub const TEMP_SCALE: f64 = 123.040771484 / 1000.0;

/// Offset of the on-die temperature channel (LSB)
pub const TEMP_OFFSET: f64 = -2219.0;

/// Scale of the supply voltage channels (V per LSB)
pub const VOLTAGE_SCALE: f64 = 0.732421875 / 1000.0;

/// One exported channel
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSpec {
    /// PV name without prefix (e.g. `TEMP`)
    pub name: String,
    /// Raw sysfs file
    pub raw_path: PathBuf,
    /// Multiplier applied after the offset
    pub scale: f64,
    /// Added to the raw reading
    pub offset: f64,
    /// Engineering unit
    pub unit: &'static str,
    /// Display precision (decimal places)
    pub precision: u8,
}

impl SensorSpec {
    /// Convert a raw reading into engineering units
    pub fn convert(&self, raw: i64) -> f64 {
        (raw as f64 + self.offset) * self.scale
    }

    /// Read the raw file and convert it
    pub fn read(&self) -> Result<f64, SensorError> {
        let path = self.raw_path.display().to_string();
        let contents = std::fs::read_to_string(&self.raw_path)
            .map_err(|source| SensorError::Io { path: path.clone(), source })?;
        let raw = contents.trim();
        let raw: i64 = raw.parse().map_err(|_| SensorError::Parse {
            path,
            raw: raw.to_string(),
        })?;
        Ok(self.convert(raw))
    }
}

/// Channels of the Zynq-7000 XADC
const XADC_CHANNELS: &[(&str, &str, f64, f64, &str)] = &[
    ("TEMP", "in_temp0_raw", TEMP_SCALE, TEMP_OFFSET, "C"),
    ("VCCINT", "in_voltage0_vccint_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VCCAUX", "in_voltage1_vccaux_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VCCBRAM", "in_voltage2_vccbram_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VCCPINT", "in_voltage3_vccpint_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VCCPAUX", "in_voltage4_vccpaux_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VCCODDR", "in_voltage5_vccoddr_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VREFP", "in_voltage6_vrefp_raw", VOLTAGE_SCALE, 0.0, "V"),
    ("VREFN", "in_voltage7_vrefn_raw", VOLTAGE_SCALE, 0.0, "V"),
];

/// Ordered set of exported channels
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    sensors: Vec<SensorSpec>,
}

impl SensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard XADC channels under `device_dir`
    pub fn xadc(device_dir: impl AsRef<Path>) -> Self {
        let dir = device_dir.as_ref();
        let sensors = XADC_CHANNELS
            .iter()
            .map(|&(name, file, scale, offset, unit)| SensorSpec {
                name: name.to_string(),
                raw_path: dir.join(file),
                scale,
                offset,
                unit,
                precision: 3,
            })
            .collect();
        Self { sensors }
    }

    /// Add a channel, replacing any with the same name
    pub fn register(&mut self, spec: SensorSpec) {
        match self.sensors.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.sensors.push(spec),
        }
    }

    /// Look up a channel
    pub fn get(&self, name: &str) -> Option<&SensorSpec> {
        self.sensors.iter().find(|s| s.name == name)
    }

    /// Read a channel by name
    pub fn read(&self, name: &str) -> Result<f64, SensorError> {
        self.get(name)
            .ok_or_else(|| SensorError::UnknownSensor(name.to_string()))?
            .read()
    }

    /// Channel names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|s| s.name.as_str())
    }

    /// All channels
    pub fn iter(&self) -> impl Iterator<Item = &SensorSpec> {
        self.sensors.iter()
    }

    /// Number of channels
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// True when no channel is registered
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
