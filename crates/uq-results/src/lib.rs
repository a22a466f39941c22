//! uq-results: the analysis history.
//!
//! Every successful analysis leaves a manifest and its result records under
//! `<root>/<ensemble id>/<analysis id>/`.

pub mod hash;
pub mod store;
pub mod types;

pub use hash::{compute_content_hash, compute_ensemble_fingerprint};
pub use store::AnalysisStore;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Analysis not found: {ensemble_id}/{analysis_id}")]
    AnalysisNotFound {
        ensemble_id: String,
        analysis_id: String,
    },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },
}
