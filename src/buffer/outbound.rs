use super::entry::{BufferEntry, Snapshot};
use super::error::BufferError;
use crate::domain::Message;
use crate::reliability::RecoveryListener;
use crate::reliability::metrics::DispatchMetrics;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const DEFAULT_MAX_BUFFER_WEIGHT: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub max_buffer_weight: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_weight: DEFAULT_MAX_BUFFER_WEIGHT,
        }
    }
}

/// Point-in-time view of the buffer, for monitoring only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub weight: u64,
    pub max_weight: u64,
    pub size: usize,
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Buffer status: [W:{}/{},S:{}]",
            self.weight, self.max_weight, self.size
        )
    }
}

struct BufferState<M> {
    queue: VecDeque<BufferEntry<M>>,
    // Sum of entry weights in `queue`
    current_weight: u64,
}

/// Weight-bounded FIFO between producer tasks and the drain loop.
///
/// A single mutex guards the queue and its weight. `not_full` and `not_empty`
/// play the role of the two monitor conditions: producers wait on the former
/// while the weight is at or above capacity, the drain path waits on the latter
/// while the queue is empty. Every waiter re-checks its predicate after waking.
///
/// Waiting is cancellation safe: dropping a pending `put` or `drain` future
/// leaves the buffer exactly as it was.
pub struct OutboundBuffer<M> {
    state: Mutex<BufferState<M>>,
    not_full: Notify,
    not_empty: Notify,
    max_weight: u64,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl<M: Message> OutboundBuffer<M> {
    pub fn new(config: BufferConfig) -> Result<Self, BufferError> {
        if config.max_buffer_weight == 0 {
            return Err(BufferError::InvalidCapacity {
                capacity: config.max_buffer_weight,
            });
        }

        Ok(Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                current_weight: 0,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            max_weight: config.max_buffer_weight,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    /// Enqueue the messages of one logical submission.
    ///
    /// More than one message is kept together as a compound entry so the
    /// messages stay adjacent all the way to dispatch. Waits while the buffered
    /// weight is at or above capacity.
    pub async fn put(&self, messages: Vec<M>) -> Result<(), BufferError> {
        if messages.is_empty() {
            return Err(BufferError::EmptyMessageSet);
        }

        let entry = BufferEntry::from_messages(messages);
        let mut waited = false;

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.current_weight < self.max_weight {
                    let compound = entry.is_compound();
                    // Saturates so an oversized weight pins the buffer at capacity
                    state.current_weight = state.current_weight.saturating_add(entry.weight());
                    state.queue.push_back(entry);
                    trace!(
                        compound,
                        "Entry added to the buffer. {}",
                        status_of(&state, self.max_weight)
                    );
                    drop(state);

                    self.not_empty.notify_waiters();
                    return Ok(());
                }

                if !waited {
                    warn!(
                        "Outbound buffer is full. Waiting... {}",
                        status_of(&state, self.max_weight)
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_producer_wait();
                    }
                    waited = true;
                }
            }

            notified.await;
        }
    }

    pub async fn put_one(&self, message: M) -> Result<(), BufferError> {
        self.put(vec![message]).await
    }

    /// `put` that gives up, without enqueuing anything, once `token` is cancelled.
    pub async fn put_until_cancelled(
        &self,
        messages: Vec<M>,
        token: &CancellationToken,
    ) -> Result<(), BufferError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                warn!("Buffer put action was interrupted");
                Err(BufferError::Interrupted { operation: "put" })
            }
            result = self.put(messages) => result,
        }
    }

    /// Wait until the buffer holds something, then detach the whole queue.
    ///
    /// The swap happens under the lock; the returned snapshot is processed by
    /// the caller with no lock held.
    pub async fn drain(&self) -> Snapshot<M> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(snapshot) = self.try_drain() {
                return snapshot;
            }

            debug!("buffer is empty. Waiting to drain...");
            notified.await;
        }
    }

    /// `drain` that returns `None`, without draining, once `token` is cancelled.
    pub async fn drain_until_cancelled(&self, token: &CancellationToken) -> Option<Snapshot<M>> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("Drain outgoing buffer was interrupted while waiting for messages");
                None
            }
            snapshot = self.drain() => Some(snapshot),
        }
    }

    /// Detach the queue if it holds anything, without waiting.
    pub fn try_drain(&self) -> Option<Snapshot<M>> {
        let snapshot = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                return None;
            }

            debug!(
                "buffer is going to be drained. {}",
                status_of(&state, self.max_weight)
            );

            let entries = std::mem::take(&mut state.queue);
            let weight = std::mem::replace(&mut state.current_weight, 0);
            Snapshot::new(entries, weight)
        };

        self.not_full.notify_waiters();
        Some(snapshot)
    }

    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn weight(&self) -> u64 {
        self.state.lock().current_weight
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn status(&self) -> BufferStatus {
        status_of(&self.state.lock(), self.max_weight)
    }
}

impl<M: Message> RecoveryListener for OutboundBuffer<M> {
    fn name(&self) -> &str {
        "outbound_buffer"
    }

    /// Drop everything buffered. Undelivered messages are lost.
    fn do_recovery(&self) {
        let (dropped_entries, dropped_weight) = {
            let mut state = self.state.lock();
            let dropped = (state.queue.len(), state.current_weight);
            state.queue.clear();
            state.current_weight = 0;
            dropped
        };

        self.not_full.notify_waiters();
        warn!(
            dropped_entries,
            dropped_weight, "OutboundBuffer in recovery, buffer cleared"
        );
    }
}

impl<M> fmt::Debug for OutboundBuffer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OutboundBuffer")
            .field("max_weight", &self.max_weight)
            .field("weight", &state.current_weight)
            .field("size", &state.queue.len())
            .finish()
    }
}

fn status_of<M>(state: &BufferState<M>, max_weight: u64) -> BufferStatus {
    BufferStatus {
        weight: state.current_weight,
        max_weight,
        size: state.queue.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimpleMessage;
    use std::time::Duration;

    fn buffer(max: u64) -> OutboundBuffer<SimpleMessage> {
        OutboundBuffer::new(BufferConfig {
            max_buffer_weight: max,
        })
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = OutboundBuffer::<SimpleMessage>::new(BufferConfig {
            max_buffer_weight: 0,
        });
        assert_eq!(
            result.unwrap_err(),
            BufferError::InvalidCapacity { capacity: 0 }
        );
    }

    #[tokio::test]
    async fn test_put_empty_set_is_rejected_without_side_effects() {
        let buffer = buffer(100);
        let result = buffer.put(Vec::new()).await;
        assert_eq!(result, Err(BufferError::EmptyMessageSet));
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.weight(), 0);
    }

    #[tokio::test]
    async fn test_weight_tracks_enqueued_entries() {
        let buffer = buffer(100);
        buffer.put_one(SimpleMessage::new(10)).await.unwrap();
        buffer
            .put(vec![SimpleMessage::new(5), SimpleMessage::new(7)])
            .await
            .unwrap();

        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.weight(), 22);
        assert_eq!(buffer.status().to_string(), "Buffer status: [W:22/100,S:2]");
    }

    #[tokio::test]
    async fn test_drain_swaps_out_whole_queue() {
        let buffer = buffer(100);
        buffer.put_one(SimpleMessage::new(10)).await.unwrap();
        buffer.put_one(SimpleMessage::new(20)).await.unwrap();

        let snapshot = buffer.drain().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.weight(), 30);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.weight(), 0);
    }

    #[tokio::test]
    async fn test_try_drain_on_empty_buffer() {
        let buffer = buffer(100);
        assert!(buffer.try_drain().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_drain_leaves_buffer_untouched() {
        let buffer = buffer(100);
        let token = CancellationToken::new();
        token.cancel();

        assert!(buffer.drain_until_cancelled(&token).await.is_none());

        buffer.put_one(SimpleMessage::new(1)).await.unwrap();
        assert_eq!(buffer.size(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_put_does_not_enqueue() {
        let buffer = buffer(10);
        buffer.put_one(SimpleMessage::new(10)).await.unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = buffer
            .put_until_cancelled(vec![SimpleMessage::new(3)], &token)
            .await;
        assert_eq!(result, Err(BufferError::Interrupted { operation: "put" }));
        assert_eq!(buffer.size(), 1);
        assert_eq!(buffer.weight(), 10);
    }

    #[tokio::test]
    async fn test_recovery_clears_buffer() {
        let buffer = buffer(100);
        buffer.put_one(SimpleMessage::new(40)).await.unwrap();
        buffer
            .put(vec![SimpleMessage::new(5), SimpleMessage::new(5)])
            .await
            .unwrap();

        buffer.do_recovery();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.weight(), 0);
    }

    #[test]
    fn test_put_at_capacity_is_pending_until_drain() {
        let buffer = buffer(10);
        let mut first = tokio_test::task::spawn(buffer.put_one(SimpleMessage::new(10)));
        tokio_test::assert_ready_ok!(first.poll());
        drop(first);

        let mut blocked = tokio_test::task::spawn(buffer.put_one(SimpleMessage::new(1)));
        tokio_test::assert_pending!(blocked.poll());
        assert_eq!(buffer.weight(), 10);

        let snapshot = buffer.try_drain();
        assert!(snapshot.is_some());
        assert!(blocked.is_woken());
        tokio_test::assert_ready_ok!(blocked.poll());
        assert_eq!(buffer.weight(), 1);
    }

    #[test]
    fn test_oversized_weight_saturates_and_blocks_further_puts() {
        let buffer = buffer(10);
        let mut grouped = tokio_test::task::spawn(
            buffer.put(vec![SimpleMessage::new(u64::MAX), SimpleMessage::new(1)]),
        );
        tokio_test::assert_ready_ok!(grouped.poll());
        drop(grouped);
        assert_eq!(buffer.weight(), u64::MAX);

        let mut next = tokio_test::task::spawn(buffer.put_one(SimpleMessage::new(1)));
        tokio_test::assert_pending!(next.poll());
        assert_eq!(buffer.weight(), u64::MAX);
        assert_eq!(buffer.size(), 1);

        let snapshot = buffer.try_drain().unwrap();
        assert_eq!(snapshot.weight(), u64::MAX);
        tokio_test::assert_ready_ok!(next.poll());
        assert_eq!(buffer.weight(), 1);
    }

    #[tokio::test]
    async fn test_single_heavy_message_is_admitted_below_capacity() {
        // Admission only checks the weight already buffered
        let buffer = buffer(10);
        buffer.put_one(SimpleMessage::new(50)).await.unwrap();
        assert_eq!(buffer.weight(), 50);
    }
}
