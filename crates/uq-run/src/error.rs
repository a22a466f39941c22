use thiserror::Error;
use uq_core::CoreError;
use uq_formats::FormatError;
use uq_script::ScriptError;
use uq_solver::SolverError;

pub type RunResult<T> = Result<T, RunError>;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Run could not be launched: {0}")]
    Launch(#[source] SolverError),

    #[error("Backend {backend} cannot run this ensemble: {reason}")]
    InvalidBackend {
        backend: &'static str,
        reason: String,
    },

    #[error("Run already started")]
    AlreadyStarted,

    #[error("Could not read run results: {reason}")]
    ReadBack { reason: String },

    #[error("Job grid error: {0}")]
    Grid(String),

    #[error("Run worker stopped unexpectedly")]
    WorkerGone,

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Model error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
