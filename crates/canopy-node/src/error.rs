//! Node engine errors

use canopy_convert::ConversionError;

/// Result alias for node operations
pub type Result<T, E = NodeError> = std::result::Result<T, E>;

/// Errors raised by node and value operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Caller passed an argument the operation cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// List insertion past the end of the list
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// List length at the time of the insert
        len: usize,
    },

    /// Internal invariant violated; indicates a bug in the engine
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Operation not supported by the current value variant
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Conversion subsystem failure
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl NodeError {
    /// Whether a caller can reasonably handle this error and continue
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            NodeError::IllegalState(_) => false,
            NodeError::InvalidArgument(_)
            | NodeError::IndexOutOfBounds { .. }
            | NodeError::Unsupported(_)
            | NodeError::Conversion(_) => true,
        }
    }

    /// Whether the error stems from misuse of the API rather than data
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            NodeError::InvalidArgument(_)
                | NodeError::IndexOutOfBounds { .. }
                | NodeError::IllegalState(_)
                | NodeError::Unsupported(_)
        )
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        NodeError::IllegalState(message.into())
    }
}

/// Fail fast with [`NodeError::InvalidArgument`] unless `condition` holds
///
/// # Errors
/// Returns [`NodeError::InvalidArgument`] carrying `message`
#[inline]
pub fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(NodeError::InvalidArgument(message()))
    }
}
