//! Domain layer for the outbound buffer.
//!
//! Contains the message types shared across all modules:
//! - `Message`: The capability every buffered value exposes (weight, id, shrink)
//! - `SimpleMessage`: A generic payload carrier with no compaction semantics
//! - `WorkerMessage`: The worker's outbound traffic (execution updates and events)

pub mod execution;
pub mod message;

pub use execution::{ExecutionEvent, ExecutionMessage, ExecutionStatus, WorkerMessage};
pub use message::{Message, SimpleMessage};
