//! The run state machine.
//!
//! `NotStarted -> Running -> {Finished, Stopped, Failed}`. The manager is the
//! only owner of the ensemble while a run is active; backends report through
//! [`RunBackend::poll`] and everyone else gets clones.

use crate::backend::RunBackend;
use crate::emulator::EmulatorBackend;
use crate::error::{RunError, RunResult};
use crate::grid::{GridBackend, GridHandle, JobGrid};
use crate::local::LocalBackend;
use crate::state::{GridSettings, RunSnapshot, RunState, StopMode};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uq_core::{Backend, Ensemble, OutputStatus};
use uq_script::BuildContext;
use uq_solver::{ArtifactManager, ProcessDriver, STALE_RUN_FILES, WorkdirLocks};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub solver: PathBuf,
    pub workdir: PathBuf,
    /// Where emulator outputs are moved once read.
    pub artifact_dir: PathBuf,
    /// Longest wait for a worker to acknowledge a stop.
    pub stop_timeout: Duration,
    pub grid: GridSettings,
}

impl RunConfig {
    pub fn new(solver: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            solver: solver.into(),
            artifact_dir: workdir.join(".uqflow").join("artifacts"),
            workdir,
            stop_timeout: Duration::from_secs(5),
            grid: GridSettings::default(),
        }
    }
}

pub struct RunManager {
    config: RunConfig,
    driver: ProcessDriver,
    state: RunState,
    ensemble: Option<Ensemble>,
    backend: Option<Box<dyn RunBackend>>,
    grid: Option<Box<dyn JobGrid>>,
}

impl RunManager {
    /// A manager whose solver invocations are serialized against every other
    /// user of `locks` in the same working directory.
    pub fn new(config: RunConfig, locks: &WorkdirLocks) -> Self {
        let driver = ProcessDriver::new(&config.solver, &config.workdir, locks);
        Self {
            config,
            driver,
            state: RunState::NotStarted,
            ensemble: None,
            backend: None,
            grid: None,
        }
    }

    /// The grid a [`Backend::Grid`] ensemble will be submitted to.
    pub fn attach_grid(&mut self, grid: Box<dyn JobGrid>) {
        self.grid = Some(grid);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn start(&mut self, ensemble: Ensemble) -> RunResult<()> {
        if self.state != RunState::NotStarted {
            return Err(RunError::AlreadyStarted);
        }
        ensemble.validate()?;
        self.check_backend(&ensemble)?;

        let guard = self.driver.lock_owned();
        fs::create_dir_all(&self.config.workdir)?;
        ArtifactManager::new(&self.config.workdir).clear_stale(&STALE_RUN_FILES)?;

        let launched: RunResult<Box<dyn RunBackend>> = match ensemble.backend {
            // the local run keeps the directory until its child is reaped
            Backend::Local => LocalBackend::launch(&self.driver, &ensemble, guard)
                .map(|b| Box::new(b) as Box<dyn RunBackend>),
            Backend::Emulator => {
                drop(guard);
                EmulatorBackend::launch(
                    self.driver.clone(),
                    &ensemble,
                    BuildContext::in_dir(&self.config.workdir),
                    self.config.artifact_dir.clone(),
                )
                .map(|b| Box::new(b) as Box<dyn RunBackend>)
            }
            Backend::Grid => match self.grid.take() {
                Some(grid) => GridBackend::launch(grid, &ensemble, self.config.grid.clone())
                    .map(|b| Box::new(b) as Box<dyn RunBackend>),
                None => Err(no_grid()),
            },
        };
        self.install(ensemble, launched)
    }

    /// Pick up a grid session left by [`StopMode::Disconnect`].
    pub fn reattach_grid(
        &mut self,
        ensemble: Ensemble,
        grid: Box<dyn JobGrid>,
        handle: GridHandle,
    ) -> RunResult<()> {
        if self.state == RunState::Running {
            return Err(RunError::AlreadyStarted);
        }
        ensemble.validate()?;
        let launched = GridBackend::reattach(grid, handle, &ensemble, self.config.grid.clone())
            .map(|b| Box::new(b) as Box<dyn RunBackend>);
        self.install(ensemble, launched)
    }

    fn install(
        &mut self,
        ensemble: Ensemble,
        launched: RunResult<Box<dyn RunBackend>>,
    ) -> RunResult<()> {
        self.ensemble = Some(ensemble);
        match launched {
            Ok(backend) => {
                info!(backend = backend.name(), "run started");
                self.backend = Some(backend);
                self.state = RunState::Running;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "run failed to launch");
                self.state = RunState::Failed;
                Err(e)
            }
        }
    }

    fn check_backend(&self, ensemble: &Ensemble) -> RunResult<()> {
        match ensemble.backend {
            Backend::Local => Ok(()),
            Backend::Grid if self.grid.is_none() => Err(no_grid()),
            Backend::Grid => Ok(()),
            Backend::Emulator => {
                let setup = ensemble.emulator.as_ref().ok_or_else(|| {
                    invalid_emulator("ensemble has no training data or output status")
                })?;
                if !setup.training_file.is_file() {
                    return Err(invalid_emulator(format!(
                        "training file {} does not exist",
                        setup.training_file.display()
                    )));
                }
                if setup.output_status.len() != ensemble.n_outputs() {
                    return Err(invalid_emulator(format!(
                        "output status lists {} outputs, ensemble has {}",
                        setup.output_status.len(),
                        ensemble.n_outputs()
                    )));
                }
                if !setup.output_status.contains(&OutputStatus::NeedToCalculate)
                    && ensemble.unfinished_count() > 0
                {
                    return Err(invalid_emulator(
                        "no output is marked for calculation but samples are unfinished",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Apply backend progress. Terminal states are left untouched.
    pub fn poll(&mut self) -> RunResult<RunState> {
        if self.state != RunState::Running {
            return Ok(self.state);
        }
        let (Some(backend), Some(ensemble)) = (self.backend.as_mut(), self.ensemble.as_mut())
        else {
            return Ok(self.state);
        };
        if let Err(e) = backend.poll(ensemble) {
            warn!(error = %e, backend = backend.name(), "run failed");
            self.state = RunState::Failed;
            return Err(e);
        }
        if ensemble.unfinished_count() == 0 {
            if let Err(e) = backend.finish(ensemble) {
                self.state = RunState::Failed;
                return Err(e);
            }
            self.state = RunState::Finished;
            info!(
                backend = backend.name(),
                samples = ensemble.n_samples(),
                failed = ensemble.failed_rows().len(),
                "run finished"
            );
        }
        Ok(self.state)
    }

    /// Stop a running run. Stopping anything else does nothing.
    pub fn stop(&mut self, mode: StopMode) -> RunResult<()> {
        if self.state != RunState::Running {
            return Ok(());
        }
        let (Some(backend), Some(ensemble)) = (self.backend.as_mut(), self.ensemble.as_mut())
        else {
            return Ok(());
        };
        let result = backend.stop(mode, self.config.stop_timeout, ensemble);
        self.state = RunState::Stopped;
        info!(?mode, backend = backend.name(), "run stopped");
        result
    }

    pub fn ensemble(&self) -> Option<&Ensemble> {
        self.ensemble.as_ref()
    }

    /// A copy of the ensemble as it stands.
    pub fn results(&self) -> Option<Ensemble> {
        self.ensemble.clone()
    }

    pub fn unfinished_count(&self) -> Option<usize> {
        self.ensemble.as_ref().map(Ensemble::unfinished_count)
    }

    /// Grid job ids; still available after a disconnect.
    pub fn job_ids(&self) -> Option<&[String]> {
        self.grid_handle().map(|h| h.job_ids.as_slice())
    }

    pub fn grid_handle(&self) -> Option<&GridHandle> {
        self.backend.as_ref().and_then(|b| b.grid_handle())
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let ensemble = self.ensemble.as_ref();
        RunSnapshot {
            state: self.state,
            n_samples: ensemble.map_or(0, Ensemble::n_samples),
            unfinished: ensemble.map_or(0, Ensemble::unfinished_count),
            failed: ensemble.map_or(0, |e| e.failed_rows().len()),
            completed_outputs: self.backend.as_ref().and_then(|b| b.completed_outputs()),
            job_ids: self.job_ids().map(<[String]>::to_vec),
        }
    }
}

fn no_grid() -> RunError {
    RunError::InvalidBackend {
        backend: "grid",
        reason: "no job grid attached".to_string(),
    }
}

fn invalid_emulator(reason: impl Into<String>) -> RunError {
    RunError::InvalidBackend {
        backend: "emulator",
        reason: reason.into(),
    }
}
