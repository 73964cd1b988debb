//! Error types for tether-core operations

use tether_engine::{EngineError, Handle};

/// Result type for tether-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tether-core operations
///
/// Disposal never produces an error; everything else reports synchronously.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The engine could not create a value
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Operation on a value that was already disposed
    #[error("Use after dispose: value {handle} was already released")]
    UseAfterDispose { handle: Handle },

    /// Operand sizes or matrix shapes do not agree
    #[error("Dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: String, right: String },

    /// Element index outside the value
    #[error("Index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Any other engine error, surfaced verbatim
    #[error("Engine error: {0}")]
    Engine(EngineError),

    /// The engine issued a handle that is still registered and live
    #[error("Duplicate handle: {0} is already registered")]
    DuplicateHandle(Handle),

    /// The leak checker found handles that are still live
    #[error("Outstanding handles: {} value(s) still live: {handles:?}", handles.len())]
    OutstandingHandles { handles: Vec<Handle> },

    /// Operands belong to different runtimes
    #[error("Foreign value: operand {0} belongs to another runtime")]
    ForeignValue(Handle),

    /// Invalid argument passed to a factory or operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::AllocationFailed(msg) => Error::AllocationFailed(msg),
            EngineError::DimensionMismatch { left, right } => Error::DimensionMismatch { left, right },
            EngineError::IndexOutOfBounds { index, len } => Error::IndexOutOfBounds { index, len },
            other => Error::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_onto_core_taxonomy() {
        let err: Error = EngineError::mismatch("vector[3]", "vector[5]").into();
        assert_eq!(
            err,
            Error::DimensionMismatch {
                left: "vector[3]".to_string(),
                right: "vector[5]".to_string()
            }
        );

        let err: Error = EngineError::invalid("bad").into();
        assert!(matches!(err, Error::Engine(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_display() {
        let err = Error::OutstandingHandles {
            handles: vec![Handle::new(3), Handle::new(9)],
        };
        assert_eq!(err.to_string(), "Outstanding handles: 2 value(s) still live: [Handle(3), Handle(9)]");
    }
}
