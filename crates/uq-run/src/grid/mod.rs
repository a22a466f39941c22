//! Grid runs: samples become jobs on a remote job grid.
//!
//! A worker thread owns the [`JobGrid`] for the whole run. It submits the
//! pending rows in batches, pages through completed results, resubmits failed
//! jobs up to `resub_max` times, and publishes a [`GridSnapshot`] whenever
//! something changes, including a replaced job id. Stop commands reach it
//! over a second channel.

mod memory;

pub use memory::MemoryGrid;

use crate::backend::{JobOutcome, RunBackend, apply_resolved};
use crate::error::{RunError, RunResult};
use crate::state::{GridSettings, StopMode};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uq_core::{Ensemble, SampleFailure};

pub type JobId = String;

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub id: JobId,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridPage {
    /// Nothing new since the last page.
    Pending,
    Results(Vec<JobReport>),
    /// The session will not make progress; unresolved jobs count as failed.
    Paused,
}

/// The remote grid the jobs run on.
pub trait JobGrid: Send {
    fn create_session(&mut self) -> RunResult<String>;

    /// One job per input row, in order.
    fn create_jobs(&mut self, session: &str, inputs: &[Vec<f64>]) -> RunResult<Vec<JobId>>;

    fn start_session(&mut self, session: &str) -> RunResult<()>;

    /// Results completed since the previous call.
    fn next_page(&mut self, session: &str) -> RunResult<GridPage>;

    fn kill_session(&mut self, session: &str) -> RunResult<()>;
}

/// Everything needed to pick a disconnected session back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHandle {
    pub session: String,
    /// Current job per submitted row; resubmission replaces the entry.
    pub job_ids: Vec<JobId>,
    /// Ensemble row of each job.
    pub rows: Vec<usize>,
    pub resubmissions: Vec<u32>,
}

/// Published by the worker after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    pub session: String,
    pub job_ids: Vec<JobId>,
    pub resubmissions: Vec<u32>,
    pub success: usize,
    pub error: usize,
    pub unfinished: usize,
    /// Rows resolved since the previous snapshot.
    pub resolved: Vec<(usize, JobOutcome)>,
}

enum GridEvent {
    Snapshot(GridSnapshot),
    /// Carries the worker's final handle so resubmissions are never lost.
    Acknowledged(StopMode, GridHandle),
    Done,
    Failed(RunError),
}

pub struct GridBackend {
    events: Receiver<GridEvent>,
    commands: Sender<StopMode>,
    worker: Option<JoinHandle<()>>,
    handle: GridHandle,
    done: bool,
}

impl GridBackend {
    /// Submit every unattempted row of `ensemble` as a job.
    pub fn launch(
        grid: Box<dyn JobGrid>,
        ensemble: &Ensemble,
        settings: GridSettings,
    ) -> RunResult<Self> {
        let rows = ensemble.unfinished_rows();
        let inputs = rows
            .iter()
            .map(|&r| ensemble.input_data()[r].clone())
            .collect();
        let handle = GridHandle {
            session: String::new(),
            job_ids: Vec::new(),
            resubmissions: vec![0; rows.len()],
            rows,
        };
        Self::spawn(grid, handle, inputs, vec![], settings, true)
    }

    /// Resume watching a session left by [`StopMode::Disconnect`].
    pub fn reattach(
        grid: Box<dyn JobGrid>,
        handle: GridHandle,
        ensemble: &Ensemble,
        settings: GridSettings,
    ) -> RunResult<Self> {
        if handle.job_ids.len() != handle.rows.len()
            || handle.resubmissions.len() != handle.rows.len()
        {
            return Err(RunError::InvalidBackend {
                backend: "grid",
                reason: "grid handle lists differ in length".to_string(),
            });
        }
        let mut inputs = Vec::with_capacity(handle.rows.len());
        let mut settled = Vec::with_capacity(handle.rows.len());
        for &row in &handle.rows {
            let input = ensemble.input_data().get(row).ok_or_else(|| RunError::InvalidBackend {
                backend: "grid",
                reason: format!("grid handle names row {} beyond the ensemble", row),
            })?;
            inputs.push(input.clone());
            settled.push(ensemble.run_state()[row]);
        }
        info!(session = %handle.session, jobs = handle.job_ids.len(), "re-attaching grid session");
        Self::spawn(grid, handle, inputs, settled, settings, false)
    }

    fn spawn(
        grid: Box<dyn JobGrid>,
        handle: GridHandle,
        inputs: Vec<Vec<f64>>,
        settled: Vec<bool>,
        settings: GridSettings,
        fresh: bool,
    ) -> RunResult<Self> {
        let (event_tx, events) = unbounded();
        let (commands, command_rx) = unbounded();
        let n = handle.rows.len();
        let settled = if settled.is_empty() { vec![false; n] } else { settled };
        let mut worker = GridWorker {
            grid,
            settings,
            handle: handle.clone(),
            inputs,
            unfinished: settled.iter().filter(|s| !**s).count(),
            settled,
            success: 0,
            error: 0,
            events: event_tx,
            commands: command_rx,
        };
        let thread = thread::Builder::new()
            .name("uq-grid".to_string())
            .spawn(move || worker.run(fresh))?;
        Ok(Self {
            events,
            commands,
            worker: Some(thread),
            handle,
            done: false,
        })
    }

    pub fn handle(&self) -> &GridHandle {
        &self.handle
    }

    /// Update bookkeeping from one event; resolved rows go to `rows`.
    fn absorb(
        &mut self,
        event: GridEvent,
        rows: &mut Vec<(usize, JobOutcome)>,
    ) -> Option<RunError> {
        match event {
            GridEvent::Snapshot(snapshot) => {
                self.handle.session = snapshot.session;
                self.handle.job_ids = snapshot.job_ids;
                self.handle.resubmissions = snapshot.resubmissions;
                debug!(
                    success = snapshot.success,
                    error = snapshot.error,
                    unfinished = snapshot.unfinished,
                    "grid snapshot"
                );
                rows.extend(snapshot.resolved);
            }
            GridEvent::Acknowledged(mode, handle) => {
                debug!(?mode, "grid worker acknowledged stop");
                self.handle = handle;
                self.done = true;
            }
            GridEvent::Done => self.done = true,
            GridEvent::Failed(e) => {
                self.done = true;
                return Some(e);
            }
        }
        None
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("grid worker panicked");
            }
        }
    }
}

impl RunBackend for GridBackend {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn poll(&mut self, ensemble: &mut Ensemble) -> RunResult<()> {
        let mut rows = Vec::new();
        let mut failure = None;
        let mut gone = false;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(e) = self.absorb(event, &mut rows) {
                        failure = Some(e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    gone = true;
                    break;
                }
            }
        }
        apply_resolved(ensemble, &rows)?;
        if let Some(e) = failure {
            return Err(e);
        }
        if gone && !self.done {
            return Err(RunError::WorkerGone);
        }
        Ok(())
    }

    fn finish(&mut self, _ensemble: &mut Ensemble) -> RunResult<()> {
        self.join();
        info!(session = %self.handle.session, "grid run finished");
        Ok(())
    }

    fn stop(&mut self, mode: StopMode, timeout: Duration, ensemble: &mut Ensemble) -> RunResult<()> {
        let _ = self.commands.send(mode);
        let deadline = Instant::now() + timeout;
        let mut rows = Vec::new();
        while !self.done {
            match self.events.recv_deadline(deadline) {
                Ok(event) => {
                    if let Some(e) = self.absorb(event, &mut rows) {
                        warn!(error = %e, "grid worker failed while stopping");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(?mode, "grid worker did not acknowledge stop in time");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        apply_resolved(ensemble, &rows)?;
        if self.done {
            self.join();
        }
        if mode == StopMode::Terminate {
            let marked = ensemble
                .resolve_pending_as_failed(&SampleFailure::new(-1, "grid session terminated"));
            info!(marked, session = %self.handle.session, "terminated grid run");
        } else {
            info!(
                session = %self.handle.session,
                jobs = self.handle.job_ids.len(),
                "disconnected from grid run"
            );
        }
        Ok(())
    }

    fn grid_handle(&self) -> Option<&GridHandle> {
        Some(&self.handle)
    }
}

struct GridWorker {
    grid: Box<dyn JobGrid>,
    settings: GridSettings,
    handle: GridHandle,
    inputs: Vec<Vec<f64>>,
    settled: Vec<bool>,
    unfinished: usize,
    success: usize,
    error: usize,
    events: Sender<GridEvent>,
    commands: Receiver<StopMode>,
}

impl GridWorker {
    fn run(&mut self, fresh: bool) {
        if let Err(e) = self.monitor(fresh) {
            let _ = self.events.send(GridEvent::Failed(e));
        }
    }

    fn monitor(&mut self, fresh: bool) -> RunResult<()> {
        if fresh {
            self.submit()?;
        }
        self.publish(Vec::new())?;
        while self.unfinished > 0 {
            match self.commands.recv_timeout(self.settings.poll_interval) {
                Ok(StopMode::Terminate) => {
                    if let Err(e) = self.grid.kill_session(&self.handle.session) {
                        warn!(error = %e, session = %self.handle.session, "could not kill grid session");
                    }
                    let _ = self
                        .events
                        .send(GridEvent::Acknowledged(StopMode::Terminate, self.handle.clone()));
                    return Ok(());
                }
                Ok(StopMode::Disconnect) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = self
                        .events
                        .send(GridEvent::Acknowledged(StopMode::Disconnect, self.handle.clone()));
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            match self.grid.next_page(&self.handle.session)? {
                GridPage::Pending => {}
                GridPage::Results(reports) => {
                    let (resolved, resubmitted) = self.record(reports)?;
                    if resubmitted || !resolved.is_empty() {
                        self.publish(resolved)?;
                    }
                }
                GridPage::Paused => {
                    warn!(session = %self.handle.session, "grid session paused");
                    let failure = SampleFailure::new(-2, "grid session paused");
                    let pending: Vec<usize> = (0..self.handle.rows.len())
                        .filter(|&i| !self.settled[i])
                        .collect();
                    let resolved = pending
                        .into_iter()
                        .map(|i| self.settle(i, JobOutcome::Failed(failure.clone())))
                        .collect();
                    self.publish(resolved)?;
                }
            }
        }
        let _ = self.events.send(GridEvent::Done);
        Ok(())
    }

    fn submit(&mut self) -> RunResult<()> {
        self.handle.session = self.grid.create_session()?;
        let batch = self.settings.max_send.max(1);
        for chunk in self.inputs.chunks(batch) {
            let ids = self.grid.create_jobs(&self.handle.session, chunk)?;
            if ids.len() != chunk.len() {
                return Err(RunError::Grid(format!(
                    "asked for {} jobs, grid created {}",
                    chunk.len(),
                    ids.len()
                )));
            }
            self.handle.job_ids.extend(ids);
            // jobs may start while later batches are still being sent
            self.grid.start_session(&self.handle.session)?;
        }
        info!(
            session = %self.handle.session,
            jobs = self.handle.job_ids.len(),
            "submitted grid jobs"
        );
        Ok(())
    }

    /// Settle or resubmit each report; the flag says whether any job id changed.
    fn record(&mut self, reports: Vec<JobReport>) -> RunResult<(Vec<(usize, JobOutcome)>, bool)> {
        let mut resolved = Vec::new();
        let mut resubmitted = false;
        for report in reports {
            let Some(i) = self.handle.job_ids.iter().position(|id| *id == report.id) else {
                debug!(job = %report.id, "ignoring result of a replaced job");
                continue;
            };
            if self.settled[i] {
                continue;
            }
            if matches!(report.outcome, JobOutcome::Failed(_))
                && self.handle.resubmissions[i] < self.settings.resub_max
            {
                self.handle.resubmissions[i] += 1;
                let ids = self
                    .grid
                    .create_jobs(&self.handle.session, std::slice::from_ref(&self.inputs[i]))?;
                let new_id = ids
                    .into_iter()
                    .next()
                    .ok_or_else(|| RunError::Grid("resubmission created no job".to_string()))?;
                self.grid.start_session(&self.handle.session)?;
                info!(
                    old = %report.id,
                    new = %new_id,
                    attempt = self.handle.resubmissions[i],
                    "resubmitted failed job"
                );
                self.handle.job_ids[i] = new_id;
                resubmitted = true;
                continue;
            }
            resolved.push(self.settle(i, report.outcome));
        }
        Ok((resolved, resubmitted))
    }

    fn settle(&mut self, i: usize, outcome: JobOutcome) -> (usize, JobOutcome) {
        self.settled[i] = true;
        self.unfinished -= 1;
        match outcome {
            JobOutcome::Done(_) => self.success += 1,
            JobOutcome::Failed(_) => self.error += 1,
        }
        (self.handle.rows[i], outcome)
    }

    fn publish(&self, resolved: Vec<(usize, JobOutcome)>) -> RunResult<()> {
        let snapshot = GridSnapshot {
            session: self.handle.session.clone(),
            job_ids: self.handle.job_ids.clone(),
            resubmissions: self.handle.resubmissions.clone(),
            success: self.success,
            error: self.error,
            unfinished: self.unfinished,
            resolved,
        };
        self.events
            .send(GridEvent::Snapshot(snapshot))
            .map_err(|_| RunError::WorkerGone)
    }
}
