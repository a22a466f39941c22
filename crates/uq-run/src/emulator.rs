//! Emulator runs: outputs come from a response surface fitted to training data.
//!
//! Each output marked `NeedToCalculate` goes through two solver sessions. The
//! first trims the training file to that one output. The second evaluates the
//! surface at every sample in input-file mode and leaves `psuadeData` behind.

use crate::backend::RunBackend;
use crate::error::{RunError, RunResult};
use crate::state::StopMode;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uq_core::{EmulatorSetup, Ensemble, OutputStatus, SampleFailure, SurfaceType};
use uq_formats::{RsDataOptions, read_ensemble, write_rsdata};
use uq_script::{AnalysisRequest, BuildContext, EMULATE_OUTPUT, build};
use uq_solver::{ArtifactKey, ArtifactManager, ProcessDriver, SolverError, SolverSession};

/// Evaluate one output (1-based) of `ensemble` through the surface fitted to `training_file`.
///
/// The caller holds `session`, so both phases see an undisturbed working directory.
pub fn emulate_output(
    session: &SolverSession<'_>,
    ensemble: &Ensemble,
    training_file: &Path,
    output: usize,
    ctx: &BuildContext,
    artifacts: &ArtifactManager,
    destination: &Path,
) -> RunResult<Vec<f64>> {
    let request = AnalysisRequest::Emulate {
        output,
        training_file: training_file.to_path_buf(),
    };
    let script = build(&request, ensemble, ctx)?;
    session.invoke(script)?.into_result()?;
    if !ctx.training_file.is_file() {
        return Err(SolverError::ArtifactMissing {
            operation: "emulate".to_string(),
            file_name: ctx.training_file.display().to_string(),
            dir: artifacts.workdir().to_path_buf(),
        }
        .into());
    }

    let training = read_ensemble(&ctx.training_file)?;
    let fitted = training.surface;
    let surface = fitted.map(|f| f.surface).unwrap_or(SurfaceType::Mars);
    let legendre_order = fitted.and_then(|f| f.legendre_order);

    let mut evaluation = Ensemble::new(
        ensemble.name.clone(),
        training.inputs().to_vec(),
        training.outputs().to_vec(),
    )?
    .with_samples(ensemble.input_data().to_vec())?;
    evaluation.sampling = ensemble.sampling;
    evaluation.surface = fitted;

    let stem = match legendre_order {
        Some(order) if surface == SurfaceType::Legendre => {
            format!("{}{}", surface.solver_name().to_lowercase(), order)
        }
        _ => surface.solver_name().to_lowercase(),
    };
    let input_file = artifacts.workdir().join(format!("{}.in", stem));
    let opts = RsDataOptions {
        driver: Some(ctx.training_file.display().to_string()),
        training_points: Some(training.n_samples()),
        ..RsDataOptions::new(1, surface).with_legendre_order(legendre_order)
    };
    write_rsdata(&input_file, &evaluation, &opts)?;

    let stale = artifacts.workdir().join(EMULATE_OUTPUT);
    if stale.is_file() {
        fs::remove_file(&stale)?;
    }
    session
        .invoke_file("emulate", &input_file)?
        .into_result()?;
    let key = ArtifactKey::new(ensemble.id, &format!("emulate_{}", output));
    let produced = artifacts.claim("emulate", EMULATE_OUTPUT, destination, &key)?;

    let result = read_ensemble(&produced)?;
    if result.n_samples() != ensemble.n_samples() || result.n_outputs() == 0 {
        return Err(RunError::ReadBack {
            reason: format!(
                "{} holds {} samples and {} outputs, expected {} samples",
                produced.display(),
                result.n_samples(),
                result.n_outputs(),
                ensemble.n_samples()
            ),
        });
    }
    debug!(output, surface = surface.solver_name(), "emulated output");
    Ok(result.output_data().iter().map(|row| row[0]).collect())
}

enum EmulatorEvent {
    Column {
        column: usize,
        values: Vec<f64>,
        completed_outputs: usize,
    },
    Done,
    Stopped,
    Failed(RunError),
}

pub struct EmulatorBackend {
    events: Receiver<EmulatorEvent>,
    stop_tx: Sender<()>,
    worker: Option<JoinHandle<()>>,
    completed_outputs: usize,
    done: bool,
}

impl EmulatorBackend {
    pub fn launch(
        driver: ProcessDriver,
        ensemble: &Ensemble,
        ctx: BuildContext,
        artifact_dir: PathBuf,
    ) -> RunResult<Self> {
        let setup = ensemble
            .emulator
            .clone()
            .ok_or_else(|| RunError::InvalidBackend {
                backend: "emulator",
                reason: "ensemble has no emulator setup".to_string(),
            })?;
        let (event_tx, events) = unbounded();
        let (stop_tx, stop_rx) = unbounded();
        let snapshot = ensemble.clone();
        let pending = setup
            .output_status
            .iter()
            .filter(|s| **s == OutputStatus::NeedToCalculate)
            .count();

        let worker = thread::Builder::new()
            .name("uq-emulator".to_string())
            .spawn(move || {
                run_worker(driver, snapshot, setup, ctx, artifact_dir, event_tx, stop_rx)
            })?;
        info!(outputs = pending, "emulator run started");
        Ok(Self {
            events,
            stop_tx,
            worker: Some(worker),
            completed_outputs: 0,
            done: false,
        })
    }

    fn apply(&mut self, event: EmulatorEvent, ensemble: &mut Ensemble) -> RunResult<()> {
        match event {
            EmulatorEvent::Column {
                column,
                values,
                completed_outputs,
            } => {
                ensemble.set_output_column(column, &values)?;
                ensemble.mark_output_calculated(column);
                self.completed_outputs = completed_outputs;
            }
            EmulatorEvent::Done => {
                self.done = true;
                let marked = ensemble
                    .resolve_pending_as_failed(&SampleFailure::new(1, "emulator produced no value"));
                if marked > 0 {
                    warn!(marked, "emulated samples without a value");
                }
            }
            EmulatorEvent::Stopped => self.done = true,
            EmulatorEvent::Failed(e) => {
                self.done = true;
                return Err(e);
            }
        }
        Ok(())
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("emulator worker panicked");
            }
        }
    }
}

impl RunBackend for EmulatorBackend {
    fn name(&self) -> &'static str {
        "emulator"
    }

    fn poll(&mut self, ensemble: &mut Ensemble) -> RunResult<()> {
        let mut buffered = Vec::new();
        let mut gone = false;
        loop {
            match self.events.try_recv() {
                Ok(event) => buffered.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    gone = true;
                    break;
                }
            }
        }
        for event in buffered {
            self.apply(event, ensemble)?;
        }
        if gone && !self.done {
            return Err(RunError::WorkerGone);
        }
        Ok(())
    }

    fn finish(&mut self, _ensemble: &mut Ensemble) -> RunResult<()> {
        self.join();
        info!(outputs = self.completed_outputs, "emulator run finished");
        Ok(())
    }

    fn stop(&mut self, mode: StopMode, timeout: Duration, ensemble: &mut Ensemble) -> RunResult<()> {
        let _ = self.stop_tx.send(());
        let deadline = Instant::now() + timeout;
        while !self.done {
            match self.events.recv_deadline(deadline) {
                Ok(event) => {
                    if let Err(e) = self.apply(event, ensemble) {
                        warn!(error = %e, "emulator failed while stopping");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("emulator worker did not acknowledge stop in time");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if self.done {
            self.join();
        }
        if mode == StopMode::Terminate {
            ensemble.resolve_pending_as_failed(&SampleFailure::new(-1, "run was terminated"));
        }
        Ok(())
    }

    fn completed_outputs(&self) -> Option<usize> {
        Some(self.completed_outputs)
    }
}

fn run_worker(
    driver: ProcessDriver,
    ensemble: Ensemble,
    setup: EmulatorSetup,
    ctx: BuildContext,
    artifact_dir: PathBuf,
    events: Sender<EmulatorEvent>,
    stop_rx: Receiver<()>,
) {
    let artifacts = ArtifactManager::new(driver.workdir());
    let mut completed_outputs = 0;
    for (column, status) in setup.output_status.iter().enumerate() {
        if *status != OutputStatus::NeedToCalculate {
            continue;
        }
        if !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty)) {
            let _ = events.send(EmulatorEvent::Stopped);
            return;
        }
        let result = {
            let session = driver.session();
            emulate_output(
                &session,
                &ensemble,
                &setup.training_file,
                column + 1,
                &ctx,
                &artifacts,
                &artifact_dir,
            )
        };
        match result {
            Ok(values) => {
                completed_outputs += 1;
                let event = EmulatorEvent::Column {
                    column,
                    values,
                    completed_outputs,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = events.send(EmulatorEvent::Failed(e));
                return;
            }
        }
    }
    let _ = events.send(EmulatorEvent::Done);
}
