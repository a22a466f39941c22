//! Application configuration, loaded from YAML or JSON.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uq_run::{GridSettings, RunConfig};
use uq_script::{BuildContext, DEFAULT_PRIOR_COLLAPSE_THRESHOLD};

/// Oldest solver release whose prompts the script builder follows.
pub const DEFAULT_REQUIRED_VERSION: &str = "1.7.6";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub solver_path: PathBuf,
    #[serde(default = "default_required_version")]
    pub required_version: String,
    /// Where the solver runs and reads/writes its fixed-name files.
    pub working_dir: PathBuf,
    /// Defaults to `<working_dir>/.uqflow/artifacts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
    /// Defaults to `<working_dir>/.uqflow/history`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_dir: Option<PathBuf>,
    #[serde(default = "default_prior_collapse_threshold")]
    pub prior_collapse_threshold: usize,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub poll_interval_ms: u64,
    pub resub_max: u32,
    pub max_send: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        let settings = GridSettings::default();
        Self {
            poll_interval_ms: settings.poll_interval.as_millis() as u64,
            resub_max: settings.resub_max,
            max_send: settings.max_send,
        }
    }
}

fn default_required_version() -> String {
    DEFAULT_REQUIRED_VERSION.to_string()
}

fn default_prior_collapse_threshold() -> usize {
    DEFAULT_PRIOR_COLLAPSE_THRESHOLD
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    pub fn new(solver_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            solver_path: solver_path.into(),
            required_version: default_required_version(),
            working_dir: working_dir.into(),
            artifact_dir: None,
            history_dir: None,
            prior_collapse_threshold: default_prior_collapse_threshold(),
            grid: GridConfig::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }

    /// Load from `path`; `.json` files are JSON, anything else YAML.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: Result<AppConfig, String> = if is_json(path) {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        let config = parsed.map_err(|message| AppError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let rendered = if is_json(path) {
            serde_json::to_string_pretty(self).map_err(|e| e.to_string())
        } else {
            serde_yaml::to_string(self).map_err(|e| e.to_string())
        };
        let content = rendered.map_err(|message| AppError::ConfigParse {
            path: path.to_path_buf(),
            message,
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.solver_path.as_os_str().is_empty() {
            return Err(AppError::InvalidInput("solver_path is empty".to_string()));
        }
        if self.working_dir.as_os_str().is_empty() {
            return Err(AppError::InvalidInput("working_dir is empty".to_string()));
        }
        if self.grid.max_send == 0 {
            return Err(AppError::InvalidInput("grid.max_send must be positive".to_string()));
        }
        Ok(())
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.join(".uqflow").join("artifacts"))
    }

    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.join(".uqflow").join("history"))
    }

    /// Solver file locations for scripts run in the working directory.
    pub fn build_context(&self) -> BuildContext {
        BuildContext::in_dir(&self.working_dir)
            .with_prior_collapse_threshold(self.prior_collapse_threshold)
    }

    pub fn to_run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.solver_path, &self.working_dir);
        config.artifact_dir = self.artifact_dir();
        config.stop_timeout = Duration::from_millis(self.stop_timeout_ms);
        config.grid = GridSettings {
            poll_interval: Duration::from_millis(self.grid.poll_interval_ms),
            resub_max: self.grid.resub_max,
            max_send: self.grid.max_send,
        };
        config
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fills_defaults() {
        let config: AppConfig =
            serde_yaml::from_str("solver_path: /opt/psuade/bin/psuade\nworking_dir: /tmp/uq\n")
                .unwrap();
        assert_eq!(config.required_version, "1.7.6");
        assert_eq!(config.prior_collapse_threshold, 1000);
        assert_eq!(config.stop_timeout_ms, 5000);
        assert_eq!(config.grid, GridConfig::default());
        assert_eq!(config.artifact_dir(), PathBuf::from("/tmp/uq/.uqflow/artifacts"));
        assert_eq!(config.history_dir(), PathBuf::from("/tmp/uq/.uqflow/history"));
    }

    #[test]
    fn run_config_carries_grid_settings() {
        let mut config = AppConfig::new("/bin/psuade", "/work");
        config.grid.poll_interval_ms = 250;
        config.grid.resub_max = 2;
        config.artifact_dir = Some(PathBuf::from("/keep"));
        let run = config.to_run_config();
        assert_eq!(run.grid.poll_interval, Duration::from_millis(250));
        assert_eq!(run.grid.resub_max, 2);
        assert_eq!(run.artifact_dir, PathBuf::from("/keep"));
    }

    #[test]
    fn load_reads_json_and_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("uqflow.json");
        std::fs::write(
            &json,
            r#"{"solver_path": "psuade", "working_dir": "run", "prior_collapse_threshold": 50}"#,
        )
        .unwrap();
        assert_eq!(AppConfig::load(&json).unwrap().prior_collapse_threshold, 50);

        let yaml = dir.path().join("uqflow.yaml");
        std::fs::write(&yaml, "solver_path: [").unwrap();
        assert!(matches!(
            AppConfig::load(&yaml),
            Err(AppError::ConfigParse { .. })
        ));
        assert!(matches!(
            AppConfig::load(&dir.path().join("missing.yaml")),
            Err(AppError::ConfigRead { .. })
        ));
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uqflow.yaml");
        let mut config = AppConfig::new("/bin/psuade", "/work");
        config.history_dir = Some(PathBuf::from("/history"));
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }
}
