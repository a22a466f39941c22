//! Analysis history storage API.

use crate::hash::{SHORT_HASH_LEN, compute_content_hash, compute_ensemble_fingerprint};
use crate::types::{AnalysisId, AnalysisManifest};
use crate::{ResultsError, ResultsResult};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uq_core::Ensemble;
use uq_script::AnalysisRequest;
use uq_solver::ResultRecord;

const MANIFEST_FILE: &str = "manifest.json";
const RECORDS_FILE: &str = "records.jsonl";

#[derive(Debug, Clone)]
pub struct AnalysisStore {
    root_dir: PathBuf,
}

impl AnalysisStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    pub fn for_working_dir(working_dir: &Path) -> ResultsResult<Self> {
        if working_dir.as_os_str().is_empty() {
            return Err(ResultsError::InvalidPath {
                message: "working directory is empty".to_string(),
            });
        }
        Self::new(working_dir.join(".uqflow").join("history"))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn ensemble_dir(&self, ensemble_id: &str) -> PathBuf {
        self.root_dir.join(ensemble_id)
    }

    fn analysis_dir(&self, ensemble_id: &str, analysis_id: &str) -> PathBuf {
        self.ensemble_dir(ensemble_id).join(analysis_id)
    }

    pub fn has_analysis(&self, ensemble_id: &str, analysis_id: &str) -> bool {
        self.analysis_dir(ensemble_id, analysis_id)
            .join(MANIFEST_FILE)
            .exists()
    }

    /// `Analysis_%y%m%d%H%M%S`, with a short content hash appended when that
    /// name is already taken.
    pub fn allocate_id(
        &self,
        ensemble_id: &str,
        at: DateTime<Local>,
        content_hash: &str,
    ) -> AnalysisId {
        let base = at.format("Analysis_%y%m%d%H%M%S").to_string();
        if !self.analysis_dir(ensemble_id, &base).exists() {
            return base;
        }
        let short = &content_hash[..content_hash.len().min(SHORT_HASH_LEN)];
        let hashed = format!("{}_{}", base, short);
        if !self.analysis_dir(ensemble_id, &hashed).exists() {
            return hashed;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", hashed, n);
            if !self.analysis_dir(ensemble_id, &candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Store one finished analysis of `ensemble` and return its manifest.
    pub fn record(
        &self,
        ensemble: &Ensemble,
        request: &AnalysisRequest,
        records: &[ResultRecord],
        solver_version: Option<&str>,
    ) -> ResultsResult<AnalysisManifest> {
        let now = Local::now();
        let ensemble_id = ensemble.id.to_string();
        let fingerprint = compute_ensemble_fingerprint(ensemble);
        let content_hash = compute_content_hash(&fingerprint, request);
        let analysis_id = self.allocate_id(&ensemble_id, now, &content_hash);

        let manifest = AnalysisManifest {
            analysis_id,
            ensemble_id,
            ensemble_name: ensemble.name.clone(),
            ensemble_fingerprint: fingerprint,
            operation: request.operation(),
            request: request.clone(),
            timestamp: now.to_rfc3339(),
            solver_version: solver_version.map(str::to_string),
            artifacts: records.iter().flat_map(|r| r.artifacts.clone()).collect(),
        };
        self.save(&manifest, records)?;
        info!(
            analysis = %manifest.analysis_id,
            operation = %manifest.operation,
            "recorded analysis"
        );
        Ok(manifest)
    }

    pub fn save(&self, manifest: &AnalysisManifest, records: &[ResultRecord]) -> ResultsResult<()> {
        let dir = self.analysis_dir(&manifest.ensemble_id, &manifest.analysis_id);
        fs::create_dir_all(&dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(dir.join(MANIFEST_FILE), manifest_json)?;

        let mut records_content = String::new();
        for record in records {
            let line = serde_json::to_string(record)?;
            records_content.push_str(&line);
            records_content.push('\n');
        }
        fs::write(dir.join(RECORDS_FILE), records_content)?;
        debug!(dir = %dir.display(), records = records.len(), "saved analysis");
        Ok(())
    }

    pub fn load_manifest(
        &self,
        ensemble_id: &str,
        analysis_id: &str,
    ) -> ResultsResult<AnalysisManifest> {
        let path = self.analysis_dir(ensemble_id, analysis_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(not_found(ensemble_id, analysis_id));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_records(
        &self,
        ensemble_id: &str,
        analysis_id: &str,
    ) -> ResultsResult<Vec<ResultRecord>> {
        let path = self.analysis_dir(ensemble_id, analysis_id).join(RECORDS_FILE);
        if !path.exists() {
            return Err(not_found(ensemble_id, analysis_id));
        }
        let content = fs::read_to_string(path)?;
        let mut records = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(line)?);
            }
        }
        Ok(records)
    }

    pub fn load(
        &self,
        ensemble_id: &str,
        analysis_id: &str,
    ) -> ResultsResult<(AnalysisManifest, Vec<ResultRecord>)> {
        Ok((
            self.load_manifest(ensemble_id, analysis_id)?,
            self.load_records(ensemble_id, analysis_id)?,
        ))
    }

    /// Analyses of one ensemble, oldest first.
    pub fn list_analyses(&self, ensemble_id: &str) -> ResultsResult<Vec<AnalysisManifest>> {
        let mut analyses = Vec::new();
        let dir = self.ensemble_dir(ensemble_id);
        if !dir.exists() {
            return Ok(analyses);
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let analysis_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(ensemble_id, &analysis_id) {
                    analyses.push(manifest);
                }
            }
        }
        analyses.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.analysis_id.cmp(&b.analysis_id))
        });
        Ok(analyses)
    }

    /// Ensemble ids with at least one stored analysis.
    pub fn list_ensembles(&self) -> ResultsResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn delete_analysis(&self, ensemble_id: &str, analysis_id: &str) -> ResultsResult<()> {
        let dir = self.analysis_dir(ensemble_id, analysis_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

fn not_found(ensemble_id: &str, analysis_id: &str) -> ResultsError {
    ResultsError::AnalysisNotFound {
        ensemble_id: ensemble_id.to_string(),
        analysis_id: analysis_id.to_string(),
    }
}
