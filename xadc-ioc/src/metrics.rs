// XADC IOC - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the IOC.
//!
//! Gauges are refreshed from pipeline status snapshots on every scrape, so a
//! stalled collector shows up as a growing `xadc_queue_length`.

use lazy_static::lazy_static;
use prometheus::{register_gauge, register_gauge_vec, Encoder, Gauge, GaugeVec, TextEncoder};
use xadc::{PipelineStatus, PvReading};

lazy_static! {
    // ============================================================
    // Sensor values
    // ============================================================

    /// Latest scaled reading per PV.
    pub static ref PV_VALUE: GaugeVec = register_gauge_vec!(
        "xadc_pv_value",
        "Latest XADC reading in engineering units",
        &["pv"]
    ).unwrap();

    // ============================================================
    // Egress pipelines
    // ============================================================

    /// Lines waiting for delivery.
    pub static ref QUEUE_LENGTH: GaugeVec = register_gauge_vec!(
        "xadc_queue_length",
        "Formatted lines waiting for delivery",
        &["destination"]
    ).unwrap();

    /// Degraded flags (1 = degraded, 0 = healthy).
    pub static ref DEGRADED: GaugeVec = register_gauge_vec!(
        "xadc_degraded",
        "Pipeline degraded state per axis (1=degraded, 0=healthy)",
        &["destination", "axis"]
    ).unwrap();

    /// Lines accepted by the collector.
    pub static ref LINES_DELIVERED: GaugeVec = register_gauge_vec!(
        "xadc_lines_delivered_total",
        "Lines accepted by the collector",
        &["destination"]
    ).unwrap();

    /// Samples dropped at admission.
    pub static ref SAMPLES_REJECTED: GaugeVec = register_gauge_vec!(
        "xadc_samples_rejected_total",
        "Samples dropped because resident memory exceeded the ceiling",
        &["destination"]
    ).unwrap();

    /// Failed delivery attempts.
    pub static ref DELIVERY_FAILURES: GaugeVec = register_gauge_vec!(
        "xadc_delivery_failures_total",
        "Failed delivery attempts",
        &["destination", "kind"]
    ).unwrap();

    // ============================================================
    // Process
    // ============================================================

    /// Seconds since start.
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "xadc_uptime_seconds",
        "Seconds since the IOC started"
    ).unwrap();
}

/// Update the PV gauges.
pub fn update_pv_values(values: &[PvReading]) {
    for pv in values {
        if let Some(value) = pv.value {
            PV_VALUE.with_label_values(&[pv.name.as_str()]).set(value);
        }
    }
}

/// Update the pipeline gauges.
pub fn update_pipeline_metrics(status: &[PipelineStatus]) {
    for pipeline in status {
        let name = pipeline.name.as_str();
        QUEUE_LENGTH
            .with_label_values(&[name])
            .set(pipeline.queue_len as f64);
        DEGRADED
            .with_label_values(&[name, "delivery"])
            .set(flag(pipeline.degraded_http));
        DEGRADED
            .with_label_values(&[name, "memory"])
            .set(flag(pipeline.degraded_memory));
        LINES_DELIVERED
            .with_label_values(&[name])
            .set(pipeline.stats.lines_delivered as f64);
        SAMPLES_REJECTED
            .with_label_values(&[name])
            .set(pipeline.stats.rejected as f64);
        DELIVERY_FAILURES
            .with_label_values(&[name, "transport"])
            .set(pipeline.stats.transport_failures as f64);
        DELIVERY_FAILURES
            .with_label_values(&[name, "http"])
            .set(pipeline.stats.http_failures as f64);
    }
}

/// Update the uptime gauge.
pub fn update_uptime(seconds: f64) {
    UPTIME_SECONDS.set(seconds);
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
