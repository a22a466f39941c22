//! Non-blocking polling surface for callers that only want counts.

use crate::error::{RunError, RunResult};
use crate::manager::RunManager;
use crate::state::{RunState, StopMode};
use tracing::warn;
use uq_core::Ensemble;

pub struct PollingFacade {
    manager: RunManager,
    last_error: Option<RunError>,
}

impl PollingFacade {
    pub fn new(manager: RunManager) -> Self {
        Self {
            manager,
            last_error: None,
        }
    }

    pub fn start(&mut self, ensemble: Ensemble) -> RunResult<()> {
        self.manager.start(ensemble)
    }

    /// Samples still pending; -1 before the run starts.
    pub fn unfinished_count(&mut self) -> i64 {
        if self.manager.state() == RunState::NotStarted {
            return -1;
        }
        self.refresh();
        self.manager
            .unfinished_count()
            .map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn is_finished(&mut self) -> bool {
        self.refresh();
        self.manager.state() == RunState::Finished
    }

    pub fn state(&self) -> RunState {
        self.manager.state()
    }

    /// Snapshot of the ensemble; `None` before the run starts.
    pub fn results(&self) -> Option<Ensemble> {
        self.manager.results()
    }

    pub fn stop(&mut self, mode: StopMode) -> RunResult<()> {
        self.manager.stop(mode)
    }

    /// The error that moved the run to `Failed`, if any.
    pub fn last_error(&self) -> Option<&RunError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<RunError> {
        self.last_error.take()
    }

    pub fn manager(&self) -> &RunManager {
        &self.manager
    }

    pub fn into_manager(self) -> RunManager {
        self.manager
    }

    fn refresh(&mut self) {
        if let Err(e) = self.manager.poll() {
            warn!(error = %e, "run poll failed");
            self.last_error = Some(e);
        }
    }
}
