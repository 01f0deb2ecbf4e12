//! Delivery health tracking for a pipeline
//!
//! Two independent axes, each either healthy or degraded:
//!
//! - **delivery**: degraded by any transport or HTTP failure, restored by the
//!   next successful delivery
//! - **memory**: degraded by a rejected admission, restored by the next
//!   accepted one
//!
//! Signals are edge-triggered. A sustained outage produces one "degraded"
//! event and one "recovered" event, however many ticks it lasts.
//!
//! The tracker only decides. Logging the returned [`Transition`] and
//! forwarding it to listeners is up to the owner, outside any lock it holds.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Health status of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Working normally
    #[default]
    Healthy,
    /// Failing, still retrying
    Degraded,
}

impl HealthStatus {
    /// Check if the status is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if the status is degraded
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }
}

/// Which axis changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Network and HTTP delivery
    Delivery,
    /// Admission under memory pressure
    Memory,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Delivery => write!(f, "delivery"),
            Axis::Memory => write!(f, "memory"),
        }
    }
}

/// A state change on one axis
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Destination the pipeline delivers to
    pub destination: String,
    /// Axis that changed
    pub axis: Axis,
    /// New status
    pub status: HealthStatus,
    /// What caused the change (error text, response body, footprint)
    pub detail: String,
}

impl Transition {
    /// True for healthy → degraded
    pub fn is_degradation(&self) -> bool {
        self.status.is_degraded()
    }

    /// Emit the diagnostic for this change
    pub fn log(&self) {
        match (self.axis, self.status) {
            (Axis::Delivery, HealthStatus::Degraded) => warn!(
                destination = %self.destination,
                detail = %self.detail,
                "Delivery failing, batches kept for retry"
            ),
            (Axis::Delivery, HealthStatus::Healthy) => info!(
                destination = %self.destination,
                "Delivery recovered"
            ),
            (Axis::Memory, HealthStatus::Degraded) => warn!(
                destination = %self.destination,
                detail = %self.detail,
                "Memory ceiling exceeded, dropping samples"
            ),
            (Axis::Memory, HealthStatus::Healthy) => info!(
                destination = %self.destination,
                "Memory below ceiling, accepting samples again"
            ),
        }
    }
}

/// Callback receiving every transition
pub type TransitionListener = Arc<dyn Fn(&Transition) + Send + Sync>;

/// Snapshot of both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineHealth {
    /// Delivery axis
    pub delivery: HealthStatus,
    /// Memory axis
    pub memory: HealthStatus,
}

impl PipelineHealth {
    /// Both axes healthy
    pub fn is_healthy(&self) -> bool {
        self.delivery.is_healthy() && self.memory.is_healthy()
    }
}

/// Edge-triggered failure bookkeeping for one destination.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    destination: String,
    health: PipelineHealth,
}

impl FailureTracker {
    /// Create a tracker with both axes healthy
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            health: PipelineHealth::default(),
        }
    }

    /// Current status of both axes
    pub fn health(&self) -> PipelineHealth {
        self.health
    }

    /// Destination name used in diagnostics
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// The collector could not be reached
    pub fn network_failure(&mut self, error: &str) -> Option<Transition> {
        self.set(Axis::Delivery, HealthStatus::Degraded, error.to_string())
    }

    /// The collector answered with a failure status
    pub fn http_failure(&mut self, status: u16, body: &str) -> Option<Transition> {
        self.set(
            Axis::Delivery,
            HealthStatus::Degraded,
            format!("HTTP {}: {}", status, body),
        )
    }

    /// A batch was delivered
    pub fn delivery_success(&mut self) -> Option<Transition> {
        self.set(Axis::Delivery, HealthStatus::Healthy, String::new())
    }

    /// An offer was rejected at `resident_bytes`
    pub fn admission_rejected(&mut self, resident_bytes: u64) -> Option<Transition> {
        self.set(
            Axis::Memory,
            HealthStatus::Degraded,
            format!("resident memory {} bytes", resident_bytes),
        )
    }

    /// An offer was admitted
    pub fn admission_accepted(&mut self) -> Option<Transition> {
        self.set(Axis::Memory, HealthStatus::Healthy, String::new())
    }

    fn set(&mut self, axis: Axis, status: HealthStatus, detail: String) -> Option<Transition> {
        let slot = match axis {
            Axis::Delivery => &mut self.health.delivery,
            Axis::Memory => &mut self.health.memory,
        };
        if *slot == status {
            return None;
        }
        *slot = status;

        Some(Transition {
            destination: self.destination.clone(),
            axis,
            status,
            detail,
        })
    }
}
