//! Run lifecycle and the read-only views handed to callers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Running,
    Finished,
    Stopped,
    Failed,
}

impl RunState {
    /// No further polling changes anything.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finished | RunState::Stopped | RunState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// Stop watching; grid jobs keep running and can be re-attached.
    Disconnect,
    /// Kill the work; unresolved samples are marked failed.
    Terminate,
}

/// Grid submission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub poll_interval: Duration,
    /// Times a failed job is resubmitted before its failure counts.
    pub resub_max: u32,
    /// Jobs created per submission batch.
    pub max_send: usize,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            resub_max: 0,
            max_send: 20,
        }
    }
}

/// Point-in-time summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub state: RunState,
    pub n_samples: usize,
    pub unfinished: usize,
    pub failed: usize,
    /// Emulator runs only.
    pub completed_outputs: Option<usize>,
    /// Grid runs only.
    pub job_ids: Option<Vec<String>>,
}
