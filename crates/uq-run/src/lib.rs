//! uq-run: evaluating ensembles and tracking them to completion.
//!
//! Contains:
//! - manager (the run state machine and its single copy of the ensemble)
//! - local (the solver runs the samples itself as a child process)
//! - emulator (outputs filled from a fitted response surface on a worker thread)
//! - grid (samples submitted as jobs to a remote job grid, plus an in-memory grid)
//! - facade (count-only polling)
//! - state, backend, error

mod backend;
pub mod emulator;
pub mod error;
pub mod facade;
pub mod grid;
pub mod local;
pub mod manager;
pub mod state;

// Re-exports: nice ergonomics for downstream crates
pub use backend::JobOutcome;
pub use emulator::{EmulatorBackend, emulate_output};
pub use error::{RunError, RunResult};
pub use facade::PollingFacade;
pub use grid::{
    GridBackend, GridHandle, GridPage, GridSnapshot, JobGrid, JobId, JobReport, MemoryGrid,
};
pub use local::{CONFIG_FILE, DRIVER_FILE, LocalBackend, RUN_DATA_FILE, SELECTED_VARS_FILE};
pub use manager::{RunConfig, RunManager};
pub use state::{GridSettings, RunSnapshot, RunState, StopMode};
