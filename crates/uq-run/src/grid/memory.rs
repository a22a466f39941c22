use super::{GridPage, JobGrid, JobId, JobReport};
use crate::backend::JobOutcome;
use crate::error::{RunError, RunResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

type Model = Box<dyn FnMut(&[f64]) -> JobOutcome + Send>;

struct Job {
    id: JobId,
    session: String,
    input: Vec<f64>,
    started: bool,
    reported: bool,
}

struct State {
    model: Model,
    sessions: usize,
    jobs: Vec<Job>,
    killed: BTreeSet<String>,
    held: bool,
    page_size: usize,
}

/// In-process grid that evaluates jobs with a closure.
///
/// Clones share one grid, so a caller can keep a handle while a run owns another.
#[derive(Clone)]
pub struct MemoryGrid {
    state: Arc<Mutex<State>>,
}

impl MemoryGrid {
    pub fn new(model: impl FnMut(&[f64]) -> JobOutcome + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                model: Box::new(model),
                sessions: 0,
                jobs: Vec::new(),
                killed: BTreeSet::new(),
                held: false,
                page_size: usize::MAX,
            })),
        }
    }

    /// While held, no job completes.
    pub fn hold(&self, held: bool) {
        self.state.lock().held = held;
    }

    /// Most results handed out per page.
    pub fn set_page_size(&self, size: usize) {
        self.state.lock().page_size = size.max(1);
    }

    pub fn is_killed(&self, session: &str) -> bool {
        self.state.lock().killed.contains(session)
    }

    /// Jobs ever created, resubmissions included.
    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }
}

impl JobGrid for MemoryGrid {
    fn create_session(&mut self) -> RunResult<String> {
        let mut state = self.state.lock();
        state.sessions += 1;
        Ok(format!("session-{}", state.sessions))
    }

    fn create_jobs(&mut self, session: &str, inputs: &[Vec<f64>]) -> RunResult<Vec<JobId>> {
        let mut state = self.state.lock();
        if state.killed.contains(session) {
            return Err(RunError::Grid(format!("session {} was killed", session)));
        }
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = format!("job-{}", state.jobs.len() + 1);
            state.jobs.push(Job {
                id: id.clone(),
                session: session.to_string(),
                input: input.clone(),
                started: false,
                reported: false,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn start_session(&mut self, session: &str) -> RunResult<()> {
        let mut state = self.state.lock();
        for job in state.jobs.iter_mut().filter(|j| j.session == session) {
            job.started = true;
        }
        Ok(())
    }

    fn next_page(&mut self, session: &str) -> RunResult<GridPage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.held || state.killed.contains(session) {
            return Ok(GridPage::Pending);
        }
        let mut reports = Vec::new();
        for job in state
            .jobs
            .iter_mut()
            .filter(|j| j.session == session && j.started && !j.reported)
            .take(state.page_size)
        {
            job.reported = true;
            reports.push(JobReport {
                id: job.id.clone(),
                outcome: (state.model)(&job.input),
            });
        }
        if reports.is_empty() {
            Ok(GridPage::Pending)
        } else {
            Ok(GridPage::Results(reports))
        }
    }

    fn kill_session(&mut self, session: &str) -> RunResult<()> {
        self.state.lock().killed.insert(session.to_string());
        Ok(())
    }
}
