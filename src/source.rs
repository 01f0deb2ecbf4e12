// XADC - sensor telemetry egress
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Value source and change notification
//!
//! The egress pipeline only needs two capabilities from whatever serves the
//! process variables: a way to read a named value ([`ValueSource`]) and a way
//! to be called back when it changes ([`ChangeNotifier`]). [`ScanLoop`]
//! provides both in-process by scanning the sensor registry on a fixed
//! period.

use crate::error::SensorError;
use crate::sensor::SensorRegistry;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Callback invoked with `(metric_name, value, timestamp_seconds)`.
///
/// Runs on the notifier's schedule and must return quickly.
pub type ChangeCallback = Arc<dyn Fn(&str, f64, f64) + Send + Sync>;

/// Named values readable on demand
pub trait ValueSource: Send + Sync {
    /// Current scaled reading of `name`
    fn read(&self, name: &str) -> Result<f64, SensorError>;

    /// Names this source exports
    fn names(&self) -> Vec<String>;
}

/// Subscriptions to value changes
pub trait ChangeNotifier: Send + Sync {
    /// Call `callback` whenever `name` changes
    fn subscribe(&self, name: &str, callback: ChangeCallback);
}

/// One exported PV as served by the status surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvReading {
    /// Full PV name, prefix included
    pub name: String,
    /// Latest value, absent until a scan has read the channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Engineering unit
    pub unit: &'static str,
    /// Display precision (decimal places)
    pub precision: u8,
}

/// Periodic scanner over a [`SensorRegistry`].
///
/// Every scan reads each channel, stores the value, and notifies all
/// subscribers of that channel. There is no deadband: every successful scan
/// posts a notification, even if the value did not move.
pub struct ScanLoop {
    registry: SensorRegistry,
    prefix: String,
    period: Duration,
    latest: RwLock<HashMap<String, f64>>,
    subscribers: RwLock<HashMap<String, Vec<ChangeCallback>>>,
}

impl ScanLoop {
    /// Create a scanner exporting `registry` under `prefix`
    pub fn new(registry: SensorRegistry, prefix: impl Into<String>, period: Duration) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            period,
            latest: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Full PV name of a channel
    pub fn pv_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Resolved PV prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Value stored by the last successful scan
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Every PV with its latest value, in registry order
    pub fn pv_values(&self) -> Vec<PvReading> {
        self.registry
            .iter()
            .map(|spec| PvReading {
                name: self.pv_name(&spec.name),
                value: self.latest(&spec.name),
                unit: spec.unit,
                precision: spec.precision,
            })
            .collect()
    }

    /// Read every channel once and notify subscribers; returns channels read
    pub fn scan_once(&self) -> usize {
        let timestamp = Utc::now().timestamp_micros() as f64 / 1e6;
        let mut read = 0;

        for spec in self.registry.iter() {
            // sysfs attribute reads return immediately
            let value = match spec.read() {
                Ok(value) => value,
                Err(e) => {
                    debug!(sensor = %spec.name, error = %e, "Sensor read failed");
                    continue;
                }
            };
            read += 1;

            self.latest
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(spec.name.clone(), value);

            let callbacks = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&spec.name)
                .cloned()
                .unwrap_or_default();
            for callback in callbacks {
                callback(&spec.name, value, timestamp);
            }
        }
        read
    }

    /// Scan forever on the configured period.
    pub async fn run(self: Arc<Self>) {
        info!(
            prefix = %self.prefix,
            sensors = self.registry.len(),
            period_ms = self.period.as_millis() as u64,
            "Scan loop started"
        );
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.scan_once();
        }
    }
}

impl ValueSource for ScanLoop {
    fn read(&self, name: &str) -> Result<f64, SensorError> {
        self.registry.read(name)
    }

    fn names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }
}

impl ChangeNotifier for ScanLoop {
    fn subscribe(&self, name: &str, callback: ChangeCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }
}
