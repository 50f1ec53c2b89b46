use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("The set of messages is empty")]
    EmptyMessageSet,

    #[error("Invalid buffer capacity: {capacity}")]
    InvalidCapacity { capacity: u64 },

    #[error("Buffer operation interrupted: {operation}")]
    Interrupted { operation: &'static str },
}

impl BufferError {
    /// Whether retrying the same call can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BufferError::Interrupted { .. } => true,
            BufferError::EmptyMessageSet | BufferError::InvalidCapacity { .. } => false,
        }
    }
}
