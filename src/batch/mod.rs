pub mod assembler;
pub mod bulk;
pub mod compact;

pub use assembler::{AssemblerConfig, BulkAssembler, CompoundSplit, SnapshotReport};
pub use bulk::Bulk;
pub use compact::compact;
