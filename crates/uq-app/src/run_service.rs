//! Ensemble runs driven to completion for front ends that block.

use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use uq_core::Ensemble;
use uq_run::{JobGrid, PollingFacade, RunManager, RunSnapshot, RunState, StopMode};
use uq_solver::WorkdirLocks;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::progress::RunProgressEvent;

pub struct RunService {
    facade: PollingFacade,
}

impl RunService {
    /// `locks` must be the registry every other service on the same
    /// working directory uses.
    pub fn new(config: &AppConfig, locks: &WorkdirLocks) -> Self {
        Self::from_manager(RunManager::new(config.to_run_config(), locks))
    }

    /// A service whose grid-backend ensembles go to `grid`.
    pub fn with_grid(config: &AppConfig, locks: &WorkdirLocks, grid: Box<dyn JobGrid>) -> Self {
        let mut manager = RunManager::new(config.to_run_config(), locks);
        manager.attach_grid(grid);
        Self::from_manager(manager)
    }

    fn from_manager(manager: RunManager) -> Self {
        Self {
            facade: PollingFacade::new(manager),
        }
    }

    pub fn start(&mut self, ensemble: Ensemble) -> AppResult<()> {
        self.facade.start(ensemble)?;
        Ok(())
    }

    /// Samples still pending; -1 before the run starts.
    pub fn unfinished_count(&mut self) -> i64 {
        self.facade.unfinished_count()
    }

    pub fn state(&self) -> RunState {
        self.facade.state()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.facade.manager().snapshot()
    }

    pub fn results(&self) -> Option<Ensemble> {
        self.facade.results()
    }

    pub fn stop(&mut self, mode: StopMode) -> AppResult<()> {
        self.facade.stop(mode)?;
        Ok(())
    }

    /// Poll every `interval` until the run leaves `Running`, then return the
    /// final ensemble.
    ///
    /// A run that ends in `Failed` is an error. A stopped run still returns
    /// its ensemble, with whatever rows resolved before the stop.
    pub fn wait(
        &mut self,
        interval: Duration,
        mut progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
    ) -> AppResult<Ensemble> {
        if self.facade.state() == RunState::NotStarted {
            return Err(AppError::InvalidInput("run has not been started".to_string()));
        }
        let started = Instant::now();
        loop {
            self.facade.unfinished_count();
            let snapshot = self.snapshot();
            if let Some(cb) = progress_cb.as_deref_mut() {
                cb(RunProgressEvent::from_snapshot(
                    &snapshot,
                    started.elapsed().as_secs_f64(),
                ));
            }
            if snapshot.state.is_terminal() {
                info!(
                    state = ?snapshot.state,
                    failed = snapshot.failed,
                    elapsed_s = started.elapsed().as_secs_f64(),
                    "run ended"
                );
                break;
            }
            thread::sleep(interval);
        }

        if self.facade.state() == RunState::Failed {
            return Err(match self.facade.take_last_error() {
                Some(e) => e.into(),
                None => AppError::RunFailed("no error was reported".to_string()),
            });
        }
        self.results()
            .ok_or_else(|| AppError::RunFailed("run produced no ensemble".to_string()))
    }
}
