//! Error types for solver invocation and output parsing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running the solver or handling its files.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The executable could not be started at all.
    #[error("Cannot launch solver {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation}: failed to send script to solver: {source}")]
    ScriptWrite {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// The solver ran but reported an error.
    #[error("{operation}: solver reported an error: {excerpt}{}", hint(.diagnosis))]
    Runtime {
        operation: String,
        excerpt: String,
        diagnosis: Option<String>,
    },

    #[error("{operation}: expected output file {file_name} not found in {}", .dir.display())]
    ArtifactMissing {
        operation: String,
        file_name: String,
        dir: PathBuf,
    },

    #[error("Solver version {found} is older than required {required}")]
    IncompatibleVersion { found: String, required: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SolverResult<T> = Result<T, SolverError>;

fn hint(diagnosis: &Option<String>) -> String {
    diagnosis
        .as_deref()
        .map(|d| format!("\n  hint: {}", d))
        .unwrap_or_default()
}

/// Errors raised while recovering values from solver output.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error(
        "{operation}: expected {expected} value(s) for marker '{marker}', found {found}"
    )]
    UnexpectedOutputShape {
        operation: String,
        marker: String,
        expected: usize,
        found: usize,
    },

    #[error("{operation}: field {field} is not a number: '{text}'")]
    InvalidNumber {
        operation: String,
        field: String,
        text: String,
    },

    #[error("{operation}: refusing to parse output of a failed solver run")]
    SolverFailed { operation: String },

    #[error("Invalid marker pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;
