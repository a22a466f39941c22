//! uq-script: turns analysis requests into solver command scripts.
//!
//! The solver is driven through its interactive prompt: every answer it will
//! ask for is written up front as one line of stdin. Building a script is pure
//! and deterministic; all file I/O happens in the caller.
//!
//! Contains:
//! - request (what to analyse: response-surface, raw-data, ODOE, refinement and
//!   calibration requests)
//! - script (the ordered command lines plus the artifacts they produce)
//! - paths (hook for rewriting file paths into the solver's form)
//! - builder (request + ensemble -> script)
//! - raw, odoe (script families without a fitted surface)
//! - design (adaptive refinement and PDF conversion of samples)
//! - inference (Bayesian calibration against experiments)
//! - error

pub mod builder;
pub mod design;
pub mod error;
pub mod inference;
pub mod odoe;
pub mod paths;
pub mod raw;
pub mod request;
pub mod script;

pub use builder::{
    BuildContext, DEFAULT_PRIOR_COLLAPSE_THRESHOLD, EMULATE_OUTPUT, build, check_mars_options,
    effective_surface, fixed_role_entries, labels_line, regression_output_name,
};
pub use design::pdfconvert_script;
pub use error::{ScriptError, ScriptResult};
pub use inference::{DISCREPANCY_FILE, INFERENCE_FAILURE_FILE, POSTERIOR_SAMPLE_FILE};
pub use odoe::{ODOE_SURFACES, RSEVAL_OUTPUT, prior_input_indices};
pub use paths::{IdentityPaths, PathNormalizer};
pub use request::{
    AnalysisRequest, CalibrationRole, InferenceRequest, InputRole, ObservedOutput, OdoeCriterion,
    OdoeEvalRequest, OdoeMethod, OdoeRequest, RawKind, ScreeningMethod, SobolOrder,
};
pub use script::{ExpectedArtifact, Script};
