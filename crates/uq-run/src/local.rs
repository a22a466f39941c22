//! Local runs: the solver evaluates the ensemble itself as a child process.
//!
//! The solver reads `psuadeDriver`, runs every pending sample through the
//! driver program, and keeps rewriting `psuadeData` with per-sample run flags.
//! Polling reads that file; nothing else is shared with the child. The
//! working directory stays locked from launch until the child is reaped.

use crate::backend::{JobOutcome, RunBackend, apply_resolved};
use crate::error::{RunError, RunResult};
use crate::state::StopMode;
use std::fs;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::time::Duration;
use tracing::{debug, info, warn};
use uq_core::{Ensemble, SampleFailure};
use uq_formats::{read_ensemble, render_config_txt, render_selected_vars, write_ensemble};
use uq_solver::{ArtifactManager, ProcessDriver, WorkdirGuard};

pub const DRIVER_FILE: &str = "psuadeDriver";
pub const CONFIG_FILE: &str = "config.txt";
pub const SELECTED_VARS_FILE: &str = "selectedVars";
pub const RUN_DATA_FILE: &str = "psuadeData";

const COUNTER_FILES: &str = "psuadeApps_ct.*";

pub struct LocalBackend {
    artifacts: ArtifactManager,
    data_file: PathBuf,
    child: Child,
    exit: Option<ExitStatus>,
    workdir_lock: Option<WorkdirGuard>,
}

impl LocalBackend {
    /// Write the run files into the driver's working directory and start the
    /// solver. `workdir_lock` is the caller's hold on that directory; it is
    /// released once the run is finished or stopped.
    pub fn launch(
        driver: &ProcessDriver,
        ensemble: &Ensemble,
        workdir_lock: WorkdirGuard,
    ) -> RunResult<Self> {
        let workdir = driver.workdir();
        fs::create_dir_all(workdir)?;
        let driver_file = workdir.join(DRIVER_FILE);
        write_ensemble(&driver_file, ensemble)?;
        fs::write(
            workdir.join(CONFIG_FILE),
            render_config_txt(ensemble, driver.program())?,
        )?;
        fs::write(
            workdir.join(SELECTED_VARS_FILE),
            render_selected_vars(ensemble)?,
        )?;

        let child = driver.spawn_file(&driver_file).map_err(RunError::Launch)?;
        info!(
            workdir = %workdir.display(),
            samples = ensemble.n_samples(),
            pending = ensemble.unfinished_count(),
            "local run started"
        );
        Ok(Self {
            artifacts: ArtifactManager::new(workdir),
            data_file: workdir.join(RUN_DATA_FILE),
            child,
            exit: None,
            workdir_lock: Some(workdir_lock),
        })
    }

    fn exit_status(&mut self) -> RunResult<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit)
    }

    /// Rows the solver has settled so far, or `None` while the data file is
    /// missing or mid-write.
    fn read_back(&self, n_samples: usize) -> Option<Vec<(usize, JobOutcome)>> {
        if !self.data_file.is_file() {
            return None;
        }
        let data = match read_ensemble(&self.data_file) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "run data not readable yet");
                return None;
            }
        };
        if data.n_samples() != n_samples {
            debug!(
                found = data.n_samples(),
                expected = n_samples,
                "run data has the wrong number of samples"
            );
            return None;
        }
        let mut resolved = Vec::new();
        for row in 0..n_samples {
            if let Some(failure) = data.failure(row) {
                resolved.push((row, JobOutcome::Failed(failure.clone())));
            } else if data.run_state()[row] {
                resolved.push((row, JobOutcome::Done(data.output_data()[row].clone())));
            }
        }
        Some(resolved)
    }
}

impl RunBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn poll(&mut self, ensemble: &mut Ensemble) -> RunResult<()> {
        // checked before reading so a finished child's file is final
        let exit = self.exit_status()?;
        if let Some(rows) = self.read_back(ensemble.n_samples()) {
            apply_resolved(ensemble, &rows)?;
        }
        if let Some(status) = exit {
            if ensemble.unfinished_count() > 0 {
                let code = match status.code() {
                    Some(0) | None => -1,
                    Some(code) => code,
                };
                let failure = SampleFailure::new(code, "solver exited before the sample finished");
                let marked = ensemble.resolve_pending_as_failed(&failure);
                warn!(marked, status = %status, "solver exited with samples pending");
            }
        }
        Ok(())
    }

    fn finish(&mut self, ensemble: &mut Ensemble) -> RunResult<()> {
        match self.read_back(ensemble.n_samples()) {
            Some(rows) => {
                apply_resolved(ensemble, &rows)?;
            }
            None => warn!(
                path = %self.data_file.display(),
                "no run data to read back"
            ),
        }
        self.artifacts.clear_stale(&[COUNTER_FILES])?;
        if self.exit_status()?.is_none() {
            self.exit = Some(self.child.wait()?);
        }
        self.workdir_lock = None;
        info!(failed = ensemble.failed_rows().len(), "local run finished");
        Ok(())
    }

    fn stop(&mut self, mode: StopMode, _timeout: Duration, ensemble: &mut Ensemble) -> RunResult<()> {
        if self.exit_status()?.is_none() {
            self.child.kill()?;
            self.exit = Some(self.child.wait()?);
        }
        if let Some(rows) = self.read_back(ensemble.n_samples()) {
            apply_resolved(ensemble, &rows)?;
        }
        if mode == StopMode::Terminate {
            let marked =
                ensemble.resolve_pending_as_failed(&SampleFailure::new(-1, "run was terminated"));
            info!(marked, "terminated local run");
        }
        self.artifacts.clear_stale(&[COUNTER_FILES])?;
        self.workdir_lock = None;
        Ok(())
    }
}
