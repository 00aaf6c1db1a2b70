use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Value type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: crate::value::ValueType,
        actual: crate::value::ValueType,
    },

    #[error("Buffer shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}
