//! Shared application service layer for uqflow.
//!
//! Front ends (the CLI, scripts embedding the library) go through this crate
//! instead of wiring the builder, driver, parser and history together
//! themselves.

pub mod analysis_service;
pub mod config;
pub mod error;
pub mod progress;
pub mod run_service;

// Re-export key types for convenience
pub use analysis_service::{AnalysisOutcome, AnalysisService};
pub use config::{AppConfig, GridConfig};
pub use error::{AppError, AppResult};
pub use progress::{AnalysisProgressEvent, AnalysisStage, RunProgressEvent};
pub use run_service::RunService;
