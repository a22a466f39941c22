//! History data types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uq_script::AnalysisRequest;

pub type AnalysisId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisManifest {
    pub analysis_id: AnalysisId,
    pub ensemble_id: String,
    pub ensemble_name: String,
    /// SHA-256 of the ensemble metadata at the time of the analysis.
    pub ensemble_fingerprint: String,
    pub operation: String,
    pub request: AnalysisRequest,
    /// RFC 3339.
    pub timestamp: String,
    pub solver_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}
