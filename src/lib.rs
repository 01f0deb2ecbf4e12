//! # XADC - sensor telemetry egress
//!
//! Samples the Zynq XADC (die temperature and supply rails), republishes each
//! channel as a process variable and forwards every update as a metric line to
//! an HTTP collector.
//!
//! ## Key Features
//!
//! - **Memory-bounded queue**: admission driven by the live process footprint
//! - **Never blocks the producer**: network I/O happens only in sender tasks
//! - **Retry without duplication**: a batch leaves the queue only once accepted
//! - **Edge-triggered diagnostics**: one log line per health transition
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use xadc::{BoundedBatchQueue, MetricFormatter, SimulatedMemory, DEFAULT_MEMORY_CEILING};
//!
//! let queue = BoundedBatchQueue::new(
//!     "influx",
//!     Arc::new(SimulatedMemory::new(0)),
//!     DEFAULT_MEMORY_CEILING,
//! );
//! let formatter = MetricFormatter::new("zynq-01");
//!
//! let line = formatter.line("TEMP", 46.5, 0.0).unwrap();
//! assert!(queue.offer(line));
//! assert_eq!(
//!     queue.take_prefix(100),
//!     vec!["xadc_host,host=zynq-01,type=temp value=46.5"]
//! );
//! queue.commit(1);
//! assert!(queue.is_empty());
//! ```
//!
//! ## Modules
//!
//! - [`line`]: Sample type and line rendering
//! - [`queue`]: Bounded batch queue
//! - [`sender`]: Egress sender loop
//! - [`health`]: Edge-triggered failure tracking
//! - [`supervisor`]: Per-destination pipelines
//! - [`source`]: Value source and change notification
//! - [`sensor`]: XADC channel registry

pub mod config;
pub mod error;
pub mod health;
pub mod line;
pub mod memory;
pub mod metrics;
pub mod queue;
pub mod sender;
pub mod sensor;
pub mod source;
pub mod supervisor;
pub mod transport;

// Re-exports for convenient access
pub use config::{local_hostname, resolve_prefix, Config, DestinationConfig, IocConfig};
pub use error::{ConfigError, DeliveryError, PipelineError, Result, SensorError};
pub use health::{Axis, FailureTracker, HealthStatus, PipelineHealth, Transition, TransitionListener};
pub use line::{format_line, MetricFormatter, MetricSample};
pub use memory::{MemoryProbe, ProcessMemory, SimulatedMemory};
pub use metrics::{PipelineStats, StatsSnapshot};
pub use queue::{BoundedBatchQueue, DEFAULT_MEMORY_CEILING};
pub use sender::{EgressSender, SenderConfig, TickOutcome, DEFAULT_BATCH_SIZE};
pub use sensor::{SensorRegistry, SensorSpec};
pub use source::{ChangeCallback, ChangeNotifier, PvReading, ScanLoop, ValueSource};
pub use supervisor::{PipelineStatus, PipelineSupervisor};
pub use transport::{Credentials, HttpTransport, MemoryTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
