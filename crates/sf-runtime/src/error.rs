//! Error types for resolution and the application lifecycle.

use thiserror::Error;

use sf_graph::GraphError;
use sf_transport::TransportError;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the resolver and the application lifecycle.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Illegal parameter: {what}")]
    IllegalParameter { what: String },

    /// An otherwise valid combination the resolver does not handle.
    #[error("Not yet implemented: {what}")]
    NotYetImplemented { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Whether this error is the clean shutdown signal delivered to
    /// blocking reads.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RuntimeError::Transport(TransportError::Interrupted))
    }

    /// Whether testable mode concluded that no thread can make progress.
    pub fn is_stalled(&self) -> bool {
        matches!(
            self,
            RuntimeError::Transport(TransportError::TestsStalled { .. })
        )
    }
}

impl From<sf_core::CoreError> for RuntimeError {
    fn from(err: sf_core::CoreError) -> Self {
        RuntimeError::IllegalParameter {
            what: err.to_string(),
        }
    }
}
