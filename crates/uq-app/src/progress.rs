use uq_run::{RunSnapshot, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    BuildingScript,
    InvokingSolver,
    ClaimingArtifacts,
    ParsingOutput,
    Recording,
    Completed,
}

#[derive(Debug, Clone)]
pub struct AnalysisProgressEvent {
    pub operation: String,
    pub stage: AnalysisStage,
    pub elapsed_wall_s: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunProgressEvent {
    pub state: RunState,
    pub n_samples: usize,
    pub unfinished: usize,
    pub failed: usize,
    pub completed_outputs: Option<usize>,
    pub elapsed_wall_s: f64,
}

impl RunProgressEvent {
    pub fn from_snapshot(snapshot: &RunSnapshot, elapsed_wall_s: f64) -> Self {
        Self {
            state: snapshot.state,
            n_samples: snapshot.n_samples,
            unfinished: snapshot.unfinished,
            failed: snapshot.failed,
            completed_outputs: snapshot.completed_outputs,
            elapsed_wall_s,
        }
    }

    pub fn fraction_complete(&self) -> f64 {
        if self.n_samples == 0 {
            return 1.0;
        }
        self.n_samples.saturating_sub(self.unfinished) as f64 / self.n_samples as f64
    }
}
