//! Error types for graph declaration and validation.

use thiserror::Error;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while declaring or validating the variable graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Malformed declaration (bad name, mismatched element counts, ...).
    #[error("Illegal parameter: {what}")]
    IllegalParameter { what: String },

    /// Structural mis-wiring discovered during connect or validation.
    #[error("Illegal variable network: {what}")]
    IllegalVariableNetwork { what: String },
}
