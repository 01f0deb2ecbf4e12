// XADC - sensor telemetry egress
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Egress sender - the single consumer of a batch queue.
//!
//! Each tick the sender looks at the queue. With at least one full batch
//! pending it copies the head, posts it, and removes it only once the
//! collector has accepted it. Anything else leaves the queue untouched, so a
//! failed batch is retried, same lines in the same order, on the next tick.
//!
//! Partial batches are never sent. Lines still queued at shutdown are lost.

use crate::error::DeliveryError;
use crate::queue::BoundedBatchQueue;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Lines per request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Poll interval while less than a batch is pending
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(2);

/// Poll interval while a backlog remains
pub const DEFAULT_BUSY_INTERVAL: Duration = Duration::from_secs(1);

/// Sender parameters for one destination
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Destination name used in diagnostics
    pub destination: String,
    /// Lines per request
    pub batch_size: usize,
    /// Sleep when less than a batch is pending
    pub idle_interval: Duration,
    /// Sleep when a full batch is still pending
    pub busy_interval: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            destination: "default".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            busy_interval: DEFAULT_BUSY_INTERVAL,
        }
    }
}

/// Result of one sender tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Less than a full batch pending, nothing sent
    Idle,
    /// A batch of this many lines was delivered and committed
    Delivered(usize),
    /// Delivery failed; the batch stays at the head of the queue
    Retained(DeliveryError),
}

/// Drains a [`BoundedBatchQueue`] through a [`Transport`].
pub struct EgressSender<T: Transport> {
    config: SenderConfig,
    queue: Arc<BoundedBatchQueue>,
    transport: T,
}

impl<T: Transport> EgressSender<T> {
    /// Create a sender
    pub fn new(config: SenderConfig, queue: Arc<BoundedBatchQueue>, transport: T) -> Self {
        Self {
            config,
            queue,
            transport,
        }
    }

    /// Queue this sender drains
    pub fn queue(&self) -> &Arc<BoundedBatchQueue> {
        &self.queue
    }

    /// Attempt at most one batch.
    pub async fn tick(&self) -> TickOutcome {
        let batch_size = self.config.batch_size.max(1);
        if self.queue.len() < batch_size {
            return TickOutcome::Idle;
        }

        let batch = self.queue.take_prefix(batch_size);
        let count = batch.len();
        let outcome = self.transport.deliver(batch.join("\n")).await;
        self.queue.record_delivery(&outcome);

        let stats = self.queue.stats();
        match outcome {
            Ok(()) => {
                self.queue.commit(count);
                stats.record_delivered(count);
                debug!(
                    destination = %self.config.destination,
                    lines = count,
                    pending = self.queue.len(),
                    "Batch delivered"
                );
                TickOutcome::Delivered(count)
            }
            Err(err) => {
                if err.is_transport() {
                    stats.record_transport_failure();
                } else {
                    stats.record_http_failure();
                }
                debug!(
                    destination = %self.config.destination,
                    error = %err,
                    pending = self.queue.len(),
                    "Batch retained"
                );
                TickOutcome::Retained(err)
            }
        }
    }

    /// Sleep before the next tick: short while a full batch is still pending
    pub fn next_interval(&self) -> Duration {
        if self.queue.len() >= self.config.batch_size.max(1) {
            self.config.busy_interval
        } else {
            self.config.idle_interval
        }
    }

    /// Run until the task is dropped with the runtime.
    pub async fn run(self) {
        info!(
            destination = %self.config.destination,
            batch_size = self.config.batch_size,
            idle_ms = self.config.idle_interval.as_millis() as u64,
            busy_ms = self.config.busy_interval.as_millis() as u64,
            "Egress sender started"
        );
        loop {
            self.tick().await;
            sleep(self.next_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SimulatedMemory;
    use crate::queue::DEFAULT_MEMORY_CEILING;
    use crate::transport::MemoryTransport;

    fn sender() -> (EgressSender<MemoryTransport>, MemoryTransport) {
        let queue = Arc::new(BoundedBatchQueue::new(
            "test",
            Arc::new(SimulatedMemory::new(0)),
            DEFAULT_MEMORY_CEILING,
        ));
        let transport = MemoryTransport::new();
        let sender = EgressSender::new(SenderConfig::default(), queue, transport.clone());
        (sender, transport)
    }

    fn fill(queue: &BoundedBatchQueue, n: usize) {
        for i in 1..=n {
            queue.offer(format!("line {}", i));
        }
    }

    #[tokio::test]
    async fn test_idle_below_batch_size() {
        let (sender, transport) = sender();
        fill(sender.queue(), 99);

        assert_eq!(sender.tick().await, TickOutcome::Idle);
        assert!(transport.attempts().is_empty());
        assert_eq!(sender.next_interval(), DEFAULT_IDLE_INTERVAL);
    }

    #[tokio::test]
    async fn test_delivers_first_hundred() {
        let (sender, transport) = sender();
        fill(sender.queue(), 150);

        assert_eq!(sender.tick().await, TickOutcome::Delivered(100));
        assert_eq!(sender.queue().len(), 50);

        let expected: Vec<String> = (1..=100).map(|i| format!("line {}", i)).collect();
        assert_eq!(transport.delivered(), vec![expected.join("\n")]);
        assert_eq!(sender.queue().take_prefix(1), vec!["line 101"]);
    }

    #[tokio::test]
    async fn test_transport_error_retains_batch() {
        let (sender, transport) = sender();
        fill(sender.queue(), 100);
        transport.push_outcome(Err(DeliveryError::Transport("connection refused".into())));

        assert!(matches!(sender.tick().await, TickOutcome::Retained(_)));
        assert_eq!(sender.queue().len(), 100);
        assert!(sender.queue().health().delivery.is_degraded());
        assert_eq!(sender.next_interval(), DEFAULT_BUSY_INTERVAL);

        assert_eq!(sender.tick().await, TickOutcome::Delivered(100));
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0], attempts[1]);
        assert!(sender.queue().is_empty());
        assert!(sender.queue().health().is_healthy());
    }

    #[tokio::test]
    async fn test_bad_request_retained() {
        let (sender, transport) = sender();
        fill(sender.queue(), 100);
        transport.push_outcome(Err(DeliveryError::Rejected {
            status: 400,
            body: "bad line".into(),
        }));

        let outcome = sender.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Retained(DeliveryError::Rejected {
                status: 400,
                body: "bad line".into()
            })
        );
        assert_eq!(sender.queue().len(), 100);

        let stats = sender.queue().stats().snapshot();
        assert_eq!(stats.http_failures, 1);
        assert_eq!(stats.transport_failures, 0);
    }

    #[tokio::test]
    async fn test_custom_batch_size() {
        let queue = Arc::new(BoundedBatchQueue::new(
            "small",
            Arc::new(SimulatedMemory::new(0)),
            DEFAULT_MEMORY_CEILING,
        ));
        let transport = MemoryTransport::new();
        let config = SenderConfig {
            batch_size: 2,
            ..Default::default()
        };
        let sender = EgressSender::new(config, queue, transport.clone());
        fill(sender.queue(), 3);

        assert_eq!(sender.tick().await, TickOutcome::Delivered(2));
        assert_eq!(sender.tick().await, TickOutcome::Idle);
        assert_eq!(transport.delivered(), vec!["line 1\nline 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_backlog() {
        let (sender, transport) = sender();
        fill(sender.queue(), 250);
        let queue = Arc::clone(sender.queue());

        let handle = tokio::spawn(sender.run());
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.abort();

        assert_eq!(transport.delivered().len(), 2);
        assert_eq!(queue.len(), 50);
    }
}
