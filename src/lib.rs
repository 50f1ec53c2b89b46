#![deny(rust_2018_idioms)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Millisecond durations fit in u64
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. BufferError in buffer module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod batch;
pub mod buffer;
pub mod domain;
pub mod reliability;
pub mod sender;

// Re-export main types for easy access
pub use app::Config;
pub use batch::{AssemblerConfig, Bulk, BulkAssembler, CompoundSplit, SnapshotReport};
pub use buffer::{BufferConfig, BufferError, BufferStatus, OutboundBuffer, Snapshot};
pub use domain::Message;
pub use reliability::{RecoveryListener, RecoveryManager, RecoveryTrigger, RetryTemplate};
pub use sender::{DispatchError, Dispatcher};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
