#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use worker_outbound_buffer::batch::Bulk;
use worker_outbound_buffer::domain::Message;
use worker_outbound_buffer::sender::{DispatchError, Dispatcher};

/// Records every delivered bulk; fails the first `failures` calls.
pub struct RecordingDispatcher<M> {
    pub bulks: Mutex<Vec<Vec<M>>>,
    pub calls: AtomicUsize,
    failures: usize,
}

impl<M> RecordingDispatcher<M> {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            bulks: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            failures,
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<M: Message + Clone> RecordingDispatcher<M> {
    pub fn delivered(&self) -> Vec<Vec<M>> {
        self.bulks.lock().clone()
    }
}

impl<M: Message + Clone> Dispatcher<M> for RecordingDispatcher<M> {
    async fn dispatch(&self, bulk: &Bulk<M>) -> Result<(), DispatchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(DispatchError::Rejected {
                status: 503,
                message: "orchestrator unavailable".to_string(),
            });
        }
        self.bulks.lock().push(bulk.messages().to_vec());
        Ok(())
    }
}
