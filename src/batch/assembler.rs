use super::bulk::Bulk;
use super::compact::compact;
use crate::buffer::Snapshot;
use crate::domain::Message;
use crate::reliability::metrics::DispatchMetrics;
use crate::reliability::{RecoveryTrigger, RetryError, RetryTemplate};
use crate::sender::{DispatchError, Dispatcher};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub const DEFAULT_MAX_BULK_WEIGHT: u64 = 1_500;

/// Where the bulk threshold is checked while walking a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundSplit {
    /// After every flattened message; a compound may straddle two bulks.
    #[default]
    Split,
    /// Only between top-level entries; a compound always shares one bulk.
    KeepWhole,
}

#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub max_bulk_weight: u64,
    pub compound_split: CompoundSplit,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_bulk_weight: DEFAULT_MAX_BULK_WEIGHT,
            compound_split: CompoundSplit::default(),
        }
    }
}

/// Outcome of processing one drained snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    /// Top-level buffer entries in the snapshot.
    pub entries: usize,
    pub messages_in: usize,
    /// Messages actually sent, after compaction.
    pub messages_dispatched: usize,
    pub bulks_dispatched: usize,
    /// Set when a bulk exhausted its retries and the rest was dropped.
    pub abandoned: bool,
}

/// Turns drained snapshots into weight-bounded, compacted bulks and sends them.
///
/// A bulk is closed as soon as its accumulated weight exceeds
/// `max_bulk_weight`, so the message that crosses the threshold is still part
/// of it. Bulks of one snapshot are sent sequentially, in order.
pub struct BulkAssembler<M, D> {
    config: AssemblerConfig,
    dispatcher: D,
    retry: RetryTemplate,
    recovery: Arc<dyn RecoveryTrigger>,
    metrics: Option<Arc<DispatchMetrics>>,
    _message: PhantomData<fn(M)>,
}

impl<M: Message, D: Dispatcher<M>> BulkAssembler<M, D> {
    pub fn new(
        config: AssemblerConfig,
        dispatcher: D,
        retry: RetryTemplate,
        recovery: Arc<dyn RecoveryTrigger>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            retry,
            recovery,
            metrics: None,
            _message: PhantomData,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Split, compact and dispatch one snapshot.
    ///
    /// If a bulk exhausts its retries the remainder of the snapshot is
    /// abandoned and recovery is triggered once. Dispatch failures are never
    /// returned to the caller.
    pub async fn process_snapshot(&self, snapshot: Snapshot<M>) -> SnapshotReport {
        let mut report = SnapshotReport {
            entries: snapshot.len(),
            messages_in: snapshot.message_count(),
            ..SnapshotReport::default()
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot();
        }

        debug!(
            entries = report.entries,
            messages = report.messages_in,
            weight = snapshot.weight(),
            "Processing drained snapshot"
        );

        if let Err(e) = self.assemble(snapshot, &mut report).await {
            report.abandoned = true;
            if let Some(metrics) = &self.metrics {
                metrics.record_bulk(false);
            }
            error!(
                "Unable to deliver bulk, abandoning snapshot after {} bulks: {}",
                report.bulks_dispatched, e
            );
            info!("Triggering worker recovery");
            self.recovery.trigger_recovery();
        }

        report
    }

    async fn assemble(
        &self,
        snapshot: Snapshot<M>,
        report: &mut SnapshotReport,
    ) -> Result<(), RetryError<DispatchError>> {
        let max_weight = self.config.max_bulk_weight;
        let mut pending = Vec::new();
        let mut weight = 0u64;

        match self.config.compound_split {
            CompoundSplit::Split => {
                for message in snapshot.flatten() {
                    weight = weight.saturating_add(message.weight());
                    pending.push(message);
                    if weight > max_weight {
                        self.flush(std::mem::take(&mut pending), report).await?;
                        weight = 0;
                    }
                }
            }
            CompoundSplit::KeepWhole => {
                for entry in snapshot {
                    weight = weight.saturating_add(entry.weight());
                    pending.extend(entry.into_messages());
                    if weight > max_weight {
                        self.flush(std::mem::take(&mut pending), report).await?;
                        weight = 0;
                    }
                }
            }
        }

        if !pending.is_empty() {
            self.flush(pending, report).await?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        messages: Vec<M>,
        report: &mut SnapshotReport,
    ) -> Result<(), RetryError<DispatchError>> {
        let before = messages.len();
        let start = Instant::now();
        let compacted = compact(messages);
        debug!(
            "bulk optimization result: {} -> {} in {:?}",
            before,
            compacted.len(),
            start.elapsed()
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_compaction(before, compacted.len());
        }

        if compacted.is_empty() {
            return Ok(());
        }

        let bulk = Bulk::new(compacted);
        self.dispatch_with_retry(&bulk).await?;

        report.bulks_dispatched += 1;
        report.messages_dispatched += bulk.len();
        if let Some(metrics) = &self.metrics {
            metrics.record_bulk(true);
        }
        Ok(())
    }

    /// Send one bulk under the retry policy.
    pub async fn dispatch_with_retry(&self, bulk: &Bulk<M>) -> Result<(), RetryError<DispatchError>> {
        debug!(
            "Dispatching bulk {} ({} messages, weight {})",
            bulk.id(),
            bulk.len(),
            bulk.weight()
        );
        let start = Instant::now();
        self.retry.retry(|| self.dispatcher.dispatch(bulk)).await?;
        debug!(
            "bulk {} was drained in {:?}, W:{}",
            bulk.id(),
            start.elapsed(),
            bulk.weight()
        );
        Ok(())
    }
}

impl<M, D> std::fmt::Debug for BulkAssembler<M, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkAssembler")
            .field("config", &self.config)
            .field("retry", self.retry.config())
            .finish_non_exhaustive()
    }
}
