use thiserror::Error;
use uq_core::CoreError;

pub type ScriptResult<T> = Result<T, ScriptError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("{operation}: missing required option: {option}")]
    MissingOption {
        operation: String,
        option: &'static str,
    },

    #[error("{operation}: {what}")]
    InvalidRequest { operation: String, what: String },

    #[error("Model error: {0}")]
    Core(#[from] CoreError),
}

impl ScriptError {
    pub(crate) fn missing(operation: &str, option: &'static str) -> Self {
        ScriptError::MissingOption {
            operation: operation.to_string(),
            option,
        }
    }

    pub(crate) fn invalid(operation: &str, what: impl Into<String>) -> Self {
        ScriptError::InvalidRequest {
            operation: operation.to_string(),
            what: what.into(),
        }
    }
}
