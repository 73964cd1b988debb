//! Error types for engine operations

use crate::types::Handle;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by an engine
///
/// This is the engine's own taxonomy; callers surface it verbatim.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Operands have incompatible sizes
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: String, right: String },

    /// The engine could not create a new resource
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    /// An argument was rejected by a kernel
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The handle does not name a live engine value
    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    /// Element index outside the stored value
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Expression text could not be parsed
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    /// Unknown kernel or function name
    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

impl EngineError {
    /// Create a dimension mismatch error
    pub fn mismatch(left: impl std::fmt::Display, right: impl std::fmt::Display) -> Self {
        Self::DimensionMismatch {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
