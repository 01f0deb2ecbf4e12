//! Memory-bounded batch queue
//!
//! Ordered pending lines shared by the producer (change callbacks) and the
//! single consumer (the egress sender). Only three mutating operations exist:
//!
//! - [`BoundedBatchQueue::offer`] appends at the tail, subject to admission
//! - [`BoundedBatchQueue::take_prefix`] copies the head without removing it
//! - [`BoundedBatchQueue::commit`] removes the head once delivered
//!
//! Admission is decided on the live resident footprint of the whole process,
//! not on the queue's own size. The failure tracker lives under the same lock
//! so health state is never observed half-applied; its transitions are logged
//! and handed to the listener only after the lock is released.

use crate::error::DeliveryError;
use crate::health::{FailureTracker, PipelineHealth, Transition, TransitionListener};
use crate::memory::MemoryProbe;
use crate::metrics::PipelineStats;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Default admission ceiling: 100 MB resident
pub const DEFAULT_MEMORY_CEILING: u64 = 100 * 1024 * 1024;

#[derive(Debug)]
struct Inner {
    lines: VecDeque<String>,
    tracker: FailureTracker,
}

/// FIFO of formatted lines with memory-driven admission.
pub struct BoundedBatchQueue {
    inner: Mutex<Inner>,
    probe: Arc<dyn MemoryProbe>,
    ceiling: u64,
    stats: Arc<PipelineStats>,
    listener: Option<TransitionListener>,
}

impl std::fmt::Debug for BoundedBatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBatchQueue")
            .field("len", &self.len())
            .field("ceiling", &self.ceiling)
            .finish()
    }
}

impl BoundedBatchQueue {
    /// Create an empty queue for `destination`
    pub fn new(destination: impl Into<String>, probe: Arc<dyn MemoryProbe>, ceiling: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lines: VecDeque::new(),
                tracker: FailureTracker::new(destination),
            }),
            probe,
            ceiling,
            stats: Arc::new(PipelineStats::new()),
            listener: None,
        }
    }

    /// Forward every health transition to `listener`.
    ///
    /// The listener runs without the queue lock held and may call back into
    /// the queue.
    pub fn with_listener(mut self, listener: TransitionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A producer that panicked mid-offer leaves the deque consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `line` unless the process is over the memory ceiling.
    ///
    /// Never blocks on I/O. A missing measurement counts as "no pressure".
    pub fn offer(&self, line: String) -> bool {
        let resident = self.probe.resident_bytes();
        let over = matches!(resident, Some(bytes) if bytes > self.ceiling);

        let mut inner = self.lock();
        let transition = if over {
            inner.tracker.admission_rejected(resident.unwrap_or_default())
        } else {
            inner.lines.push_back(line);
            inner.tracker.admission_accepted()
        };
        drop(inner);

        self.stats.record_offer(!over);
        self.publish(transition);
        !over
    }

    /// Copy up to `n` lines from the head, oldest first
    pub fn take_prefix(&self, n: usize) -> Vec<String> {
        let inner = self.lock();
        inner.lines.iter().take(n).cloned().collect()
    }

    /// Remove the first `n` lines after confirmed delivery.
    ///
    /// Returns the number removed. Committing more than the queue holds is
    /// refused and leaves the queue untouched.
    pub fn commit(&self, n: usize) -> usize {
        let mut inner = self.lock();
        let len = inner.lines.len();
        if n > len {
            warn!(
                destination = %inner.tracker.destination(),
                requested = n,
                len,
                "Commit larger than queue, ignored"
            );
            return 0;
        }
        inner.lines.drain(..n);
        n
    }

    /// Reconcile health with the outcome of a delivery attempt
    pub fn record_delivery(&self, outcome: &Result<(), DeliveryError>) -> Option<Transition> {
        let transition = {
            let mut inner = self.lock();
            match outcome {
                Ok(()) => inner.tracker.delivery_success(),
                Err(DeliveryError::Transport(reason)) => inner.tracker.network_failure(reason),
                Err(DeliveryError::Rejected { status, body }) => {
                    inner.tracker.http_failure(*status, body)
                }
            }
        };
        self.publish(transition)
    }

    // Never called with the lock held.
    fn publish(&self, transition: Option<Transition>) -> Option<Transition> {
        if let Some(t) = &transition {
            t.log();
            if let Some(listener) = &self.listener {
                listener(t);
            }
        }
        transition
    }

    /// Number of pending lines
    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    /// Current health of both axes
    pub fn health(&self) -> PipelineHealth {
        self.lock().tracker.health()
    }

    /// Admission ceiling in bytes
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Counters shared with the sender
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }
}
