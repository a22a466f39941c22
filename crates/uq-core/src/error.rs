use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invariant violated: {what}")]
    Invariant { what: String },

    #[error("Shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Unknown {what}: {name}")]
    UnknownName { what: &'static str, name: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}

impl CoreError {
    pub(crate) fn invariant(what: impl Into<String>) -> Self {
        CoreError::Invariant { what: what.into() }
    }
}
