//! Moving the solver's fixed-name output files somewhere they cannot be clobbered.

use crate::error::{SolverError, SolverResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files the solver leaves behind in its working directory on every run.
pub const STALE_RUN_FILES: [&str; 3] = ["psuadeData", "psuadeOut", "psuadeApps_ct.*"];

/// Sub-directory name identifying one analysis of one ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(ensemble_id: impl fmt::Display, operation: &str) -> Self {
        let op: String = operation
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Self(format!("{}_{}", ensemble_id, op))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactManager {
    workdir: PathBuf,
}

impl ArtifactManager {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Move `<workdir>/<file_name>` to `<destination>/<key>/<file_name>`.
    ///
    /// An existing file at the destination is replaced.
    pub fn claim(
        &self,
        operation: &str,
        file_name: &str,
        destination: &Path,
        key: &ArtifactKey,
    ) -> SolverResult<PathBuf> {
        match self.claim_optional(file_name, destination, key)? {
            Some(path) => Ok(path),
            None => Err(SolverError::ArtifactMissing {
                operation: operation.to_string(),
                file_name: file_name.to_string(),
                dir: self.workdir.clone(),
            }),
        }
    }

    /// Like [`claim`](Self::claim) for files the solver may legitimately skip.
    pub fn claim_optional(
        &self,
        file_name: &str,
        destination: &Path,
        key: &ArtifactKey,
    ) -> SolverResult<Option<PathBuf>> {
        let source = self.workdir.join(file_name);
        if !source.is_file() {
            return Ok(None);
        }
        let dir = destination.join(key.as_str());
        fs::create_dir_all(&dir)?;
        let target = dir.join(file_name);
        if target.exists() {
            fs::remove_file(&target)?;
        }
        if let Err(e) = fs::rename(&source, &target) {
            // different filesystem
            debug!(error = %e, "rename failed, copying artifact instead");
            fs::copy(&source, &target)?;
            fs::remove_file(&source)?;
        }
        info!(
            file = file_name,
            target = %target.display(),
            "claimed solver artifact"
        );
        Ok(Some(target))
    }

    /// Delete leftover files from earlier runs. A trailing `*` matches by prefix.
    pub fn clear_stale(&self, patterns: &[&str]) -> SolverResult<usize> {
        let mut removed = 0;
        for pattern in patterns {
            if let Some(prefix) = pattern.strip_suffix('*') {
                if !self.workdir.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&self.workdir)? {
                    let entry = entry?;
                    let name = entry.file_name();
                    if name.to_string_lossy().starts_with(prefix) && entry.path().is_file() {
                        fs::remove_file(entry.path())?;
                        removed += 1;
                    }
                }
            } else {
                let path = self.workdir.join(pattern);
                if path.is_file() {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            warn!(
                workdir = %self.workdir.display(),
                removed,
                "removed stale solver files"
            );
        }
        Ok(removed)
    }
}

/// SHA-256 of a file's contents, as lowercase hex.
pub fn checksum(path: &Path) -> SolverResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
