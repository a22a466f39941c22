//! uq-core: data model shared by every uqflow crate.
//!
//! Contains:
//! - variable (inputs/outputs, bounds, fixed constants)
//! - distribution (input PDFs and their solver codes)
//! - surface (response-surface types and their option schema)
//! - sampling (sampling schemes)
//! - prior (per-input prior overrides for analyses)
//! - ensemble (the in-memory sample set and its run-state)
//! - numfmt (C-style scientific formatting used on the solver wire)
//! - error (shared error types)

pub mod distribution;
pub mod ensemble;
pub mod error;
pub mod numfmt;
pub mod prior;
pub mod sampling;
pub mod surface;
pub mod variable;

// Re-exports: nice ergonomics for downstream crates
pub use distribution::{Distribution, DistributionKind};
pub use ensemble::{
    Backend, Drivers, EmulatorSetup, Ensemble, EnsembleMetadata, OutputStatus, SampleFailure,
};
pub use error::{CoreError, CoreResult};
pub use numfmt::{
    UNSET_SENTINEL, UNSET_SENTINEL_TEXT, WIRE_PRECISION, is_unset_token, parse_value, sci, sci_padded,
};
pub use prior::PriorSpec;
pub use sampling::{SampleSizeCheck, SamplingMethod};
pub use surface::{
    FittedSurface, MarsOptions, OptionRequirement, SurfaceOptions, SurfaceType, legendre_max_order,
};
pub use variable::{Role, Variable, VariableKind};
