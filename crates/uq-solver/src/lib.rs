//! uq-solver: drives the external solver process and reads back what it produced.
//!
//! Contains:
//! - driver (spawning the solver, feeding scripts, per-directory exclusivity)
//! - captured (raw invocation output and the structured result record)
//! - parser (marker-based scraping of solver output)
//! - artifacts (relocating fixed-name output files, checksums)
//! - probe (version and module detection)
//! - error

pub mod artifacts;
pub mod captured;
pub mod driver;
pub mod error;
pub mod parser;
pub mod probe;

// Re-exports: nice ergonomics for downstream crates
pub use artifacts::{ArtifactKey, ArtifactManager, STALE_RUN_FILES, checksum};
pub use captured::{CapturedRun, ResultRecord, ResultValue};
pub use driver::{ProcessDriver, SolverSession, TRANSCRIPT_FILE, WorkdirGuard, WorkdirLocks};
pub use error::{ParseError, ParseResult, SolverError, SolverResult};
pub use parser::{ExpectedShape, Marker, Take, parse, parse_odoe_selection};
pub use probe::{KNOWN_MODULES, SolverInfo, parse_info, version_satisfies};
