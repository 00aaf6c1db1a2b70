//! Error types for transport operations.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by accessors and the testable-mode gate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// A blocking operation was woken by application shutdown.
    #[error("Operation interrupted by shutdown")]
    Interrupted,

    /// Static mis-use of an accessor, e.g. reading a write-only fan-out.
    #[error("Logic error: {what}")]
    LogicError { what: String },

    /// Testable mode concluded that no thread can make progress.
    #[error("Tests are stalled.\n{listing}")]
    TestsStalled { listing: String },

    /// Propagated from a device backend.
    #[error("Device error: {what}")]
    Device { what: String },

    /// Propagated from the control-system adapter.
    #[error("Control system adapter error: {what}")]
    Adapter { what: String },
}
