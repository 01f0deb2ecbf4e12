// XADC - sensor telemetry egress
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pipeline supervisor
//!
//! Owns one pipeline per enabled destination. A pipeline is a
//! [`BoundedBatchQueue`] fed by change callbacks plus an [`EgressSender`]
//! task draining it. Pipelines share nothing but the sample stream: a stalled
//! collector only grows its own queue.

use crate::config::{resolve_prefix, DestinationConfig};
use crate::error::Result;
use crate::health::TransitionListener;
use crate::line::MetricFormatter;
use crate::memory::{MemoryProbe, ProcessMemory};
use crate::metrics::StatsSnapshot;
use crate::queue::BoundedBatchQueue;
use crate::sender::{EgressSender, SenderConfig};
use crate::source::ChangeNotifier;
use crate::transport::{HttpTransport, Transport};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running pipeline
#[derive(Debug)]
struct Pipeline {
    name: String,
    url: String,
    queue: Arc<BoundedBatchQueue>,
    handle: JoinHandle<()>,
}

/// Point-in-time view of one pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub url: String,
    pub queue_len: usize,
    pub degraded_http: bool,
    pub degraded_memory: bool,
    pub stats: StatsSnapshot,
}

/// Starts and tracks the egress pipelines of this process.
pub struct PipelineSupervisor {
    hostname: String,
    prefix: String,
    probe: Arc<dyn MemoryProbe>,
    listener: Option<TransitionListener>,
    pipelines: Vec<Pipeline>,
}

impl PipelineSupervisor {
    /// Create a supervisor; `$hostname` in `prefix_template` is resolved now
    pub fn new(hostname: impl Into<String>, prefix_template: &str) -> Self {
        let hostname = hostname.into();
        let prefix = resolve_prefix(prefix_template, &hostname);
        Self {
            hostname,
            prefix,
            probe: Arc::new(ProcessMemory::new()),
            listener: None,
            pipelines: Vec::new(),
        }
    }

    /// Measure admission against `probe` instead of the process RSS
    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Forward every health transition of every pipeline to `listener`
    pub fn with_listener(mut self, listener: TransitionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Host tag written into every line
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Resolved PV prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Validate and start an HTTP pipeline for every enabled destination.
    ///
    /// Every destination is validated and its HTTP client built before any
    /// pipeline is started, so an error never leaves half the pipelines
    /// running. Must be called inside a tokio runtime.
    pub fn start<'a>(
        &mut self,
        destinations: impl IntoIterator<Item = &'a DestinationConfig>,
        notifier: &dyn ChangeNotifier,
        metrics: &[String],
    ) -> Result<usize> {
        let enabled: Vec<_> = destinations.into_iter().filter(|d| d.enabled).collect();
        for dest in &enabled {
            dest.validate()?;
        }

        let transports = enabled
            .iter()
            .map(|dest| {
                let url = dest.url.clone().unwrap_or_default();
                HttpTransport::new(url.as_str(), dest.credentials(), dest.request_timeout())
                    .map(|transport| (url, transport))
            })
            .collect::<Result<Vec<_>>>()?;

        let started = transports.len();
        for (dest, (url, transport)) in enabled.into_iter().zip(transports) {
            self.spawn(
                dest.sender_config(),
                dest.memory_ceiling_bytes,
                url,
                transport,
                notifier,
                metrics,
            );
        }
        Ok(started)
    }

    /// Start one pipeline over an arbitrary transport.
    ///
    /// Subscribes to every name in `metrics` and spawns the sender task.
    /// Returns the pipeline's queue.
    pub fn spawn<T: Transport>(
        &mut self,
        config: SenderConfig,
        memory_ceiling: u64,
        url: impl Into<String>,
        transport: T,
        notifier: &dyn ChangeNotifier,
        metrics: &[String],
    ) -> Arc<BoundedBatchQueue> {
        let name = config.destination.clone();
        let url = url.into();

        let mut queue = BoundedBatchQueue::new(name.as_str(), Arc::clone(&self.probe), memory_ceiling);
        if let Some(listener) = &self.listener {
            queue = queue.with_listener(Arc::clone(listener));
        }
        let queue = Arc::new(queue);

        let formatter = MetricFormatter::new(self.hostname.as_str());
        for metric in metrics {
            let queue = Arc::clone(&queue);
            let formatter = formatter.clone();
            notifier.subscribe(
                metric,
                Arc::new(move |metric: &str, value: f64, timestamp: f64| {
                    match formatter.line(metric, value, timestamp) {
                        Ok(line) => {
                            queue.offer(line);
                        }
                        Err(_) => queue.stats().record_invalid(),
                    }
                }),
            );
        }

        info!(
            destination = %name,
            url = %url,
            metrics = metrics.len(),
            memory_ceiling,
            "Pipeline started"
        );

        let sender = EgressSender::new(config, Arc::clone(&queue), transport);
        let handle = tokio::spawn(sender.run());
        self.pipelines.push(Pipeline {
            name,
            url,
            queue: Arc::clone(&queue),
            handle,
        });
        queue
    }

    /// Status of every pipeline, in start order
    pub fn status(&self) -> Vec<PipelineStatus> {
        self.pipelines
            .iter()
            .map(|p| {
                let health = p.queue.health();
                PipelineStatus {
                    name: p.name.clone(),
                    url: p.url.clone(),
                    queue_len: p.queue.len(),
                    degraded_http: health.delivery.is_degraded(),
                    degraded_memory: health.memory.is_degraded(),
                    stats: p.queue.stats().snapshot(),
                }
            })
            .collect()
    }

    /// Number of running pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// True when no pipeline was started
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Stop every sender task. Pending lines are dropped.
    pub fn shutdown(&mut self) {
        for pipeline in self.pipelines.drain(..) {
            pipeline.handle.abort();
            info!(
                destination = %pipeline.name,
                dropped = pipeline.queue.len(),
                "Pipeline stopped"
            );
        }
    }
}

impl Drop for PipelineSupervisor {
    fn drop(&mut self) {
        for pipeline in &self.pipelines {
            pipeline.handle.abort();
        }
    }
}
