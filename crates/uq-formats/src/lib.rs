//! uq-formats: the solver's text file formats.
//!
//! Contains:
//! - ensemble_file (the full ensemble file the solver loads and writes)
//! - rsdata (analysis variant of the ensemble file, with prior overrides)
//! - simple (headered whitespace sample tables)
//! - index_file (fixed-input index files for mixed UQ and calibration)
//! - design_file (input files that ask the solver for a new sample)
//! - rsua (the sample drawn during uncertainty analysis, and its moments)
//! - mcmc_spec (experiment observations for Bayesian calibration)
//! - run_files (config.txt and selectedVars for local runs)
//! - priors (prior tables loaded from YAML or JSON)
//! - validate (structural checks before a file is handed to the solver)

pub mod design_file;
pub mod ensemble_file;
pub mod index_file;
pub mod mcmc_spec;
pub mod priors;
pub mod rsdata;
pub mod rsua;
pub mod run_files;
pub mod simple;
pub mod validate;

pub use design_file::{
    PLACEHOLDER_OUTPUT, needs_pdf_conversion, render_design_input, write_design_input,
};
pub use ensemble_file::{parse_ensemble, read_ensemble, render_ensemble, write_ensemble};
pub use index_file::{
    FixedEntry, render_full_index_file, render_index_file, write_full_index_file,
    write_index_file,
};
pub use mcmc_spec::{Experiment, render_mcmc_spec, write_mcmc_spec};
pub use priors::{load_priors, save_priors};
pub use rsdata::{RsDataOptions, apply_priors, render_rsdata, write_rsdata};
pub use rsua::{RSUA_SAMPLE_FILE, SampleMoments, mean_moments, moments, read_rsua_sample};
pub use run_files::{render_config_txt, render_selected_vars};
pub use simple::{SimpleSample, parse_simple, read_simple, render_simple, write_simple};
pub use validate::{ValidationError, validate_ensemble};

use uq_core::CoreError;

pub type FormatResult<T> = Result<T, FormatError>;

#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Parse error at line {line}: {what}")]
    Parse { line: usize, what: String },

    #[error("Missing option {option} for {context}")]
    MissingOption {
        context: &'static str,
        option: &'static str,
    },

    #[error("Invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    #[error("Expected {expected} prior entries (one per variable input), got {found}")]
    PriorCount { expected: usize, found: usize },

    #[error("Model error: {0}")]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn parse_error(line: usize, what: impl Into<String>) -> FormatError {
    FormatError::Parse {
        line,
        what: what.into(),
    }
}
