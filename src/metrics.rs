//! Pipeline statistics
//!
//! Counters updated from both sides of a pipeline (producer callbacks and the
//! sender task). Persistent failures show up here as a growing gap between
//! `admitted` and `delivered`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    offered: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    invalid: AtomicU64,
    batches_sent: AtomicU64,
    lines_delivered: AtomicU64,
    transport_failures: AtomicU64,
    http_failures: AtomicU64,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an offer and whether it was admitted
    pub fn record_offer(&self, admitted: bool) {
        self.offered.fetch_add(1, Ordering::Relaxed);
        if admitted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a sample that could not be rendered
    pub fn record_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered batch of `lines`
    pub fn record_delivered(&self, lines: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.lines_delivered
            .fetch_add(lines as u64, Ordering::Relaxed);
    }

    /// Record a batch that never reached the collector
    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch the collector refused
    pub fn record_http_failure(&self) {
        self.http_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            offered: self.offered.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            lines_delivered: self.lines_delivered.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            http_failures: self.http_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub offered: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub invalid: u64,
    pub batches_sent: u64,
    pub lines_delivered: u64,
    pub transport_failures: u64,
    pub http_failures: u64,
}

impl StatsSnapshot {
    /// Share of offers dropped for memory pressure (0.0 - 1.0)
    pub fn rejection_rate(&self) -> f64 {
        if self.offered == 0 {
            return 0.0;
        }
        self.rejected as f64 / self.offered as f64
    }

    /// Delivery attempts that failed, of any kind
    pub fn failed_attempts(&self) -> u64 {
        self.transport_failures + self.http_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_offers() {
        let stats = PipelineStats::new();
        stats.record_offer(true);
        stats.record_offer(true);
        stats.record_offer(false);

        let snap = stats.snapshot();
        assert_eq!(snap.offered, 3);
        assert_eq!(snap.admitted, 2);
        assert_eq!(snap.rejected, 1);
        assert!((snap.rejection_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_delivery() {
        let stats = PipelineStats::new();
        stats.record_delivered(100);
        stats.record_delivered(100);
        stats.record_transport_failure();
        stats.record_http_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.batches_sent, 2);
        assert_eq!(snap.lines_delivered, 200);
        assert_eq!(snap.failed_attempts(), 2);
    }

    #[test]
    fn test_empty_rejection_rate() {
        assert_eq!(StatsSnapshot::default().rejection_rate(), 0.0);
    }
}
