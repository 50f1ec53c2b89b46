pub mod http;
pub mod serialization;

pub use http::{HttpDispatcher, HttpDispatcherConfig};
pub use serialization::{BulkPayload, BulkSerializer};

use crate::batch::Bulk;
use crate::domain::Message;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Bulk rejected by orchestrator: HTTP {status} - {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Transport delivering one bulk to the orchestrator in a single call.
///
/// Success or failure applies to the whole bulk. A failed call may be retried
/// with the same bulk, so receivers must tolerate duplicates.
pub trait Dispatcher<M: Message>: Send + Sync {
    fn dispatch(&self, bulk: &Bulk<M>) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

impl<M: Message, D: Dispatcher<M>> Dispatcher<M> for Arc<D> {
    fn dispatch(&self, bulk: &Bulk<M>) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (**self).dispatch(bulk)
    }
}
