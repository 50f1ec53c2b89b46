#[cfg(feature = "metrics")]
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[cfg(feature = "metrics")]
    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
    #[error("Metrics encoding error: {0}")]
    EncodingError(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub snapshots_processed: u64,
    pub bulks_dispatched: u64,
    pub bulks_failed: u64,
    pub retry_attempts: u64,
    pub messages_before_compaction: u64,
    pub messages_after_compaction: u64,
    pub recoveries: u64,
    pub producer_waits: u64,
}

impl MetricsSnapshot {
    /// Share of messages removed by compaction, 0.0 when nothing was compacted.
    pub fn compaction_ratio(&self) -> f64 {
        if self.messages_before_compaction == 0 {
            return 0.0;
        }
        let removed = self
            .messages_before_compaction
            .saturating_sub(self.messages_after_compaction);
        removed as f64 / self.messages_before_compaction as f64
    }
}

/// Lock-free counters shared by the buffer, the assembler and the retry loop.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    snapshots_processed: AtomicU64,
    bulks_dispatched: AtomicU64,
    bulks_failed: AtomicU64,
    retry_attempts: AtomicU64,
    messages_before_compaction: AtomicU64,
    messages_after_compaction: AtomicU64,
    recoveries: AtomicU64,
    producer_waits: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&self) {
        self.snapshots_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bulk(&self, success: bool) {
        if success {
            self.bulks_dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bulks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compaction(&self, before: usize, after: usize) {
        self.messages_before_compaction
            .fetch_add(before as u64, Ordering::Relaxed);
        self.messages_after_compaction
            .fetch_add(after as u64, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_producer_wait(&self) {
        self.producer_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            snapshots_processed: self.snapshots_processed.load(Ordering::Relaxed),
            bulks_dispatched: self.bulks_dispatched.load(Ordering::Relaxed),
            bulks_failed: self.bulks_failed.load(Ordering::Relaxed),
            retry_attempts: self.retry_attempts.load(Ordering::Relaxed),
            messages_before_compaction: self.messages_before_compaction.load(Ordering::Relaxed),
            messages_after_compaction: self.messages_after_compaction.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            producer_waits: self.producer_waits.load(Ordering::Relaxed),
        }
    }
}

/// Exposes [`DispatchMetrics`] in Prometheus text format.
#[cfg(feature = "metrics")]
pub struct PrometheusExporter {
    metrics: Arc<DispatchMetrics>,
    registry: Registry,
    snapshots_processed: IntCounter,
    bulks_dispatched: IntCounter,
    bulks_failed: IntCounter,
    retry_attempts: IntCounter,
    messages_before_compaction: IntCounter,
    messages_after_compaction: IntCounter,
    recoveries: IntCounter,
    producer_waits: IntCounter,
}

#[cfg(feature = "metrics")]
impl PrometheusExporter {
    pub fn new(metrics: Arc<DispatchMetrics>) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounter, MetricsError> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            snapshots_processed: counter(
                "outbound_snapshots_processed_total",
                "Drained buffer snapshots handed to the assembler",
            )?,
            bulks_dispatched: counter(
                "outbound_bulks_dispatched_total",
                "Bulks delivered to the orchestrator",
            )?,
            bulks_failed: counter(
                "outbound_bulks_failed_total",
                "Bulks abandoned after exhausting retries",
            )?,
            retry_attempts: counter(
                "outbound_retry_attempts_total",
                "Failed dispatch attempts that were retried",
            )?,
            messages_before_compaction: counter(
                "outbound_messages_before_compaction_total",
                "Messages entering bulk compaction",
            )?,
            messages_after_compaction: counter(
                "outbound_messages_after_compaction_total",
                "Messages left after bulk compaction",
            )?,
            recoveries: counter(
                "outbound_recoveries_total",
                "Recovery episodes triggered by dispatch failure",
            )?,
            producer_waits: counter(
                "outbound_producer_waits_total",
                "Producers that had to wait for buffer capacity",
            )?,
            metrics,
            registry,
        })
    }

    /// Bring the Prometheus counters up to date and encode them.
    pub fn render(&self) -> Result<String, MetricsError> {
        let snapshot = self.metrics.snapshot();
        sync_counter(&self.snapshots_processed, snapshot.snapshots_processed);
        sync_counter(&self.bulks_dispatched, snapshot.bulks_dispatched);
        sync_counter(&self.bulks_failed, snapshot.bulks_failed);
        sync_counter(&self.retry_attempts, snapshot.retry_attempts);
        sync_counter(
            &self.messages_before_compaction,
            snapshot.messages_before_compaction,
        );
        sync_counter(
            &self.messages_after_compaction,
            snapshot.messages_after_compaction,
        );
        sync_counter(&self.recoveries, snapshot.recoveries);
        sync_counter(&self.producer_waits, snapshot.producer_waits);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

#[cfg(feature = "metrics")]
fn sync_counter(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}
