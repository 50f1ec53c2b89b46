pub mod entry;
pub mod error;
pub mod outbound;

pub use entry::{BufferEntry, CompoundMessage, Snapshot};
pub use error::BufferError;
pub use outbound::{BufferConfig, BufferStatus, OutboundBuffer};
