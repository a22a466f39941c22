//! Error types for the uq-app service layer.

use std::path::PathBuf;

/// One error type for every front end. Each backend crate keeps its own
/// variant so callers can still match on the category.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model error: {0}")]
    Core(#[from] uq_core::CoreError),

    #[error("File format error: {0}")]
    Format(#[from] uq_formats::FormatError),

    #[error("Script error: {0}")]
    Script(#[from] uq_script::ScriptError),

    #[error("Solver error: {0}")]
    Solver(#[from] uq_solver::SolverError),

    #[error("Output parse error: {0}")]
    Parse(#[from] uq_solver::ParseError),

    #[error("Run error: {0}")]
    Run(#[from] uq_run::RunError),

    #[error("{operation} failed: {reason}")]
    AnalysisFailed { operation: String, reason: String },

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("Results error: {0}")]
    Results(#[from] uq_results::ResultsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for uq-app operations.
pub type AppResult<T> = Result<T, AppError>;
