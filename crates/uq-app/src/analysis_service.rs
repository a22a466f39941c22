//! Response-surface, raw-data and design analyses against one solver.
//!
//! The caller's ensemble is never modified. Input files are written from it
//! (or from a prior-adjusted copy) and the solver runs while the working
//! directory lock is held, so nothing else can overwrite them in between.
//! The analysis reaches the history only once every step has succeeded.
//!
//! Sample generation and adaptive refinement go through the same driver and
//! hand back new ensembles.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use uq_core::{Ensemble, PriorSpec, SampleSizeCheck, SamplingMethod, SurfaceType};
use uq_formats::{
    FixedEntry, RSUA_SAMPLE_FILE, RsDataOptions, apply_priors, mean_moments, needs_pdf_conversion,
    read_ensemble, read_rsua_sample, write_design_input, write_ensemble, write_full_index_file,
    write_index_file, write_mcmc_spec, write_rsdata,
};
use uq_results::{AnalysisManifest, AnalysisStore};
use uq_script::{
    AnalysisRequest, BuildContext, CalibrationRole, INFERENCE_FAILURE_FILE, InferenceRequest,
    InputRole, POSTERIOR_SAMPLE_FILE, RawKind, build, effective_surface, fixed_role_entries,
    labels_line, pdfconvert_script,
};
use uq_solver::{
    ArtifactKey, ArtifactManager, CapturedRun, ExpectedShape, ProcessDriver, ResultRecord,
    ResultValue, SolverInfo, WorkdirLocks, parse, parse_odoe_selection,
};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::progress::{AnalysisProgressEvent, AnalysisStage};

/// Fixed-input index file written next to the RS data for mixed UQ and calibration.
const INDEX_FILE: &str = "ensemble.index";

/// Input file asking the solver for a new sample.
const DESIGN_INPUT_FILE: &str = "psuade.in";
/// Where the solver leaves a generated sample.
const DESIGN_DATA_FILE: &str = "psuadeData";
const METIS_INFO_FILE: &str = "psuadeMetisInfo";
/// Unit-hypercube sample carrying the real PDFs, before conversion.
const UNCONVERTED_FILE: &str = "ensemble.unit";

/// What one successful analysis produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub record: ResultRecord,
    pub manifest: AnalysisManifest,
    pub captured: CapturedRun,
}

pub struct AnalysisService {
    config: AppConfig,
    driver: ProcessDriver,
    artifacts: ArtifactManager,
    store: AnalysisStore,
    solver_info: Option<SolverInfo>,
}

impl AnalysisService {
    /// `locks` must be the registry every other service on the same
    /// working directory uses.
    pub fn new(config: AppConfig, locks: &WorkdirLocks) -> AppResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.working_dir)?;
        let driver = ProcessDriver::new(&config.solver_path, &config.working_dir, locks);
        let store = AnalysisStore::new(config.history_dir())?;
        Ok(Self {
            artifacts: ArtifactManager::new(&config.working_dir),
            config,
            driver,
            store,
            solver_info: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn history(&self) -> &AnalysisStore {
        &self.store
    }

    /// Probe the solver once and check it against the required version.
    pub fn check_solver(&mut self) -> AppResult<&SolverInfo> {
        if self.solver_info.is_none() {
            let info = self.driver.probe()?;
            info.require_version(&self.config.required_version)?;
            self.solver_info = Some(info);
        }
        self.solver_info
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("solver probe produced nothing".to_string()))
    }

    pub fn analyze(
        &mut self,
        ensemble: &Ensemble,
        request: &AnalysisRequest,
    ) -> AppResult<AnalysisOutcome> {
        self.analyze_with_progress(ensemble, request, None)
    }

    pub fn analyze_with_progress(
        &mut self,
        ensemble: &Ensemble,
        request: &AnalysisRequest,
        mut progress_cb: Option<&mut dyn FnMut(AnalysisProgressEvent)>,
    ) -> AppResult<AnalysisOutcome> {
        let started = Instant::now();
        let operation = request.operation();
        let mut emit = |stage: AnalysisStage, message: Option<String>| {
            if let Some(cb) = progress_cb.as_deref_mut() {
                cb(AnalysisProgressEvent {
                    operation: operation.clone(),
                    stage,
                    elapsed_wall_s: started.elapsed().as_secs_f64(),
                    message,
                });
            }
        };

        if matches!(request, AnalysisRequest::Emulate { .. }) {
            return Err(AppError::InvalidInput(
                "emulation fills outputs through an emulator run, not a single analysis"
                    .to_string(),
            ));
        }
        let solver_version = self.check_solver()?.version.clone();

        emit(AnalysisStage::BuildingScript, None);
        let ctx = self.resolve_context(request)?;
        let script = build(request, ensemble, &ctx)?;
        let expected = script.artifacts().to_vec();

        let key = ArtifactKey::new(ensemble.id, &operation);
        let destination = self.config.artifact_dir();
        let (captured, claimed) = {
            let session = self.driver.session();
            self.write_inputs(ensemble, request, &ctx)?;
            if matches!(request, AnalysisRequest::Inference(_)) {
                self.artifacts.clear_stale(&[INFERENCE_FAILURE_FILE])?;
            }

            emit(AnalysisStage::InvokingSolver, None);
            let captured = session.invoke(script)?.into_result()?;
            if matches!(request, AnalysisRequest::Inference(_)) {
                self.check_inference(&operation)?;
            }
            emit(
                AnalysisStage::ClaimingArtifacts,
                Some(format!("{} artifact(s)", expected.len())),
            );
            let claimed =
                session.claim(&operation, &expected, &self.artifacts, &destination, &key)?;
            (captured, claimed)
        };

        emit(AnalysisStage::ParsingOutput, None);
        let mut record = parse_output(request, &captured, &claimed)?;
        record.artifacts = claimed;

        emit(AnalysisStage::Recording, None);
        let manifest = self.store.record(
            ensemble,
            request,
            std::slice::from_ref(&record),
            solver_version.as_deref(),
        )?;

        info!(
            operation = %operation,
            analysis = %manifest.analysis_id,
            fields = record.fields.len(),
            artifacts = record.artifacts.len(),
            "analysis finished"
        );
        emit(AnalysisStage::Completed, Some(manifest.analysis_id.clone()));
        Ok(AnalysisOutcome {
            record,
            manifest,
            captured,
        })
    }

    /// Add `added` samples where the surface for `output` is least certain.
    /// The refined ensemble is read back from the claimed artifact.
    pub fn adaptive_refine(
        &mut self,
        ensemble: &Ensemble,
        output: usize,
        initial_size: usize,
        added: usize,
    ) -> AppResult<Ensemble> {
        let request = AnalysisRequest::AdaptiveRefine {
            output,
            initial_size,
            added,
        };
        let outcome = self.analyze(ensemble, &request)?;
        let Some(ResultValue::Path(path)) = outcome.record.fields.get("refined_file") else {
            return Err(AppError::AnalysisFailed {
                operation: request.operation(),
                reason: "no refined sample was recorded".to_string(),
            });
        };
        let mut refined = read_ensemble(path)?;
        refined.name = format!("{}_refined", ensemble.name);
        refined.names_include_nodes = ensemble.names_include_nodes;
        refined.drivers = ensemble.drivers.clone();
        refined.backend = ensemble.backend;
        Ok(refined)
    }

    /// Draw `n_samples` points over `template`'s inputs with `method`.
    ///
    /// Fixed inputs are re-inserted into every row; outputs start out
    /// uncomputed. Schemes other than Monte Carlo sample the unit hypercube,
    /// so non-uniform inputs go through a second `pdfconvert` pass.
    pub fn generate_samples(
        &mut self,
        template: &Ensemble,
        method: SamplingMethod,
        n_samples: usize,
    ) -> AppResult<Ensemble> {
        let n_variable = template.n_variable_inputs();
        if n_variable == 0 {
            return Err(AppError::InvalidInput(
                "every input is fixed, there is nothing to sample".to_string(),
            ));
        }
        let n_samples = match method.validate_sample_size(n_variable, n_samples) {
            SampleSizeCheck::Exact(n) => n,
            SampleSizeCheck::Bracket(below, above) => {
                return Err(AppError::InvalidInput(format!(
                    "{} needs a multiple of {} samples, try {} or {}",
                    method.full_name(),
                    n_variable + 1,
                    below,
                    above
                )));
            }
        };
        if n_samples == 0 {
            return Err(AppError::InvalidInput("no samples requested".to_string()));
        }
        self.check_solver()?;

        let convert = needs_pdf_conversion(template, method);
        let workdir = self.config.working_dir.clone();
        let data_path = workdir.join(DESIGN_DATA_FILE);
        let drawn = {
            let session = self.driver.session();
            let mut stale = vec![DESIGN_DATA_FILE];
            if matches!(method, SamplingMethod::Metis | SamplingMethod::Gmetis) {
                stale.push(METIS_INFO_FILE);
            }
            self.artifacts.clear_stale(&stale)?;

            let input = workdir.join(DESIGN_INPUT_FILE);
            write_design_input(&input, template, method, n_samples, !convert)?;
            session.invoke_file("sample", &input)?.into_result()?;
            let mut drawn = read_generated(&data_path, "sample")?;

            if convert {
                let unit = workdir.join(UNCONVERTED_FILE);
                write_ensemble(&unit, &with_template_pdfs(template, &drawn)?)?;
                fs::remove_file(&data_path)?;
                let script = pdfconvert_script(
                    &unit,
                    &data_path,
                    drawn.n_outputs(),
                    &self.config.build_context(),
                );
                session.invoke(script)?.into_result()?;
                drawn = read_generated(&data_path, "pdfconvert")?;
            }
            drawn
        };

        let rows = drawn
            .input_data()
            .iter()
            .map(|values| full_row(template, values))
            .collect::<AppResult<Vec<_>>>()?;
        let mut sample = Ensemble::new(
            template.name.clone(),
            template.inputs().to_vec(),
            template.outputs().to_vec(),
        )?
        .with_samples(rows)?;
        sample.sampling = method;
        sample.names_include_nodes = template.names_include_nodes;
        sample.drivers = template.drivers.clone();
        sample.backend = template.backend;
        sample.random_seed = template.random_seed;
        info!(
            method = method.solver_name(),
            samples = sample.n_samples(),
            converted = convert,
            "generated sample"
        );
        Ok(sample)
    }

    /// The solver leaves its failure log behind instead of exiting non-zero.
    fn check_inference(&self, operation: &str) -> AppResult<()> {
        let track = self.config.working_dir.join(INFERENCE_FAILURE_FILE);
        if !track.is_file() {
            return Ok(());
        }
        fs::remove_file(&track)?;
        Err(AppError::AnalysisFailed {
            operation: operation.to_string(),
            reason: "the MCMC chains did not finish".to_string(),
        })
    }

    /// Build context for `request`, with the regression labels read in.
    fn resolve_context(&self, request: &AnalysisRequest) -> AppResult<BuildContext> {
        let ctx = self.config.build_context();
        if let Some((SurfaceType::UserRegression, options)) = request.surface() {
            if let Some(file) = &options.regression_file {
                let content = fs::read_to_string(file)?;
                return Ok(ctx.with_regression_labels(labels_line(&content)));
            }
        }
        Ok(ctx)
    }

    /// Write the files the script for `request` loads.
    fn write_inputs(
        &self,
        ensemble: &Ensemble,
        request: &AnalysisRequest,
        ctx: &BuildContext,
    ) -> AppResult<()> {
        if matches!(request, AnalysisRequest::Odoe(_) | AnalysisRequest::OdoeEval(_)) {
            return Ok(());
        }
        write_ensemble(&ctx.data_file, ensemble)?;

        match request {
            AnalysisRequest::UncertaintyAnalysis { output, prior, .. }
            | AnalysisRequest::SensitivityAnalysis { output, prior, .. } => {
                self.write_rsdata(ensemble, request, *output, prior, None, ctx)?;
            }
            AnalysisRequest::AleatoryEpistemicUA { output, roles, .. } => {
                let entries: Vec<FixedEntry> = fixed_role_entries(roles)
                    .into_iter()
                    .map(|(index, value)| FixedEntry { index, value })
                    .collect();
                let index_file = if entries.is_empty() {
                    None
                } else {
                    let path = self.config.working_dir.join(INDEX_FILE);
                    write_index_file(&path, ensemble.n_variable_inputs(), &entries)?;
                    Some(path)
                };
                self.write_rsdata(ensemble, request, *output, &[], index_file, ctx)?;
            }
            AnalysisRequest::Inference(req) => self.write_inference_inputs(ensemble, req, ctx)?,
            _ => {}
        }
        Ok(())
    }

    /// RS data holding only the observed outputs, with priors on the
    /// calibrated inputs, plus the experiment file.
    fn write_inference_inputs(
        &self,
        ensemble: &Ensemble,
        req: &InferenceRequest,
        ctx: &BuildContext,
    ) -> AppResult<()> {
        let observed = req.observed_outputs();
        let unobserved: Vec<usize> = (1..=ensemble.n_outputs())
            .filter(|o| !observed.contains(o))
            .map(|o| o - 1)
            .collect();
        let reduced = ensemble.delete_outputs(&unobserved)?;
        let reduced = if req.prior.is_empty() {
            reduced
        } else {
            let prior: Vec<Option<PriorSpec>> = req
                .prior
                .iter()
                .zip(&req.roles)
                .map(|(p, role)| match role {
                    CalibrationRole::Calibrated => p.clone(),
                    _ => None,
                })
                .collect();
            apply_priors(&reduced, &prior)?
        };

        let entries: Vec<FixedEntry> = req
            .fixed_inputs()
            .into_iter()
            .map(|(index, value)| FixedEntry { index, value })
            .collect();
        let index_file = if entries.is_empty() {
            None
        } else {
            let path = self.config.working_dir.join(INDEX_FILE);
            write_full_index_file(&path, ensemble.n_variable_inputs(), &entries)?;
            Some(path)
        };

        let first = observed
            .first()
            .and_then(|o| req.observed.iter().find(|obs| obs.output == *o))
            .ok_or_else(|| AppError::InvalidInput("no observed outputs".to_string()))?;
        let opts = RsDataOptions::new(1, first.surface)
            .with_legendre_order(first.options.legendre_order)
            .with_index_file(index_file);
        write_rsdata(&ctx.rsdata_file, &reduced, &opts)?;
        write_mcmc_spec(&ctx.mcmc_file, &req.design_inputs(), observed.len(), &req.experiments)?;
        debug!(
            observed = observed.len(),
            experiments = req.experiments.len(),
            "wrote calibration inputs"
        );
        Ok(())
    }

    fn write_rsdata(
        &self,
        ensemble: &Ensemble,
        request: &AnalysisRequest,
        output: usize,
        prior: &[Option<PriorSpec>],
        index_file: Option<PathBuf>,
        ctx: &BuildContext,
    ) -> AppResult<()> {
        let Some(surface) = effective_surface(request) else {
            return Ok(());
        };
        let legendre_order = request.surface().and_then(|(_, o)| o.legendre_order);
        let opts = RsDataOptions::new(output, surface)
            .with_legendre_order(legendre_order)
            .with_index_file(index_file);
        if prior.is_empty() {
            write_rsdata(&ctx.rsdata_file, ensemble, &opts)?;
        } else {
            let adjusted = apply_priors(ensemble, prior)?;
            debug!(
                overrides = prior.iter().filter(|p| p.is_some()).count(),
                "applied prior overrides"
            );
            write_rsdata(&ctx.rsdata_file, &adjusted, &opts)?;
        }
        Ok(())
    }
}

/// Scrape the values `request` reports on stdout, or read them from its
/// claimed artifacts. Analyses whose results live only in their artifacts get
/// an empty record.
fn parse_output(
    request: &AnalysisRequest,
    captured: &CapturedRun,
    claimed: &[PathBuf],
) -> AppResult<ResultRecord> {
    let record = match request {
        AnalysisRequest::ValidateResponseSurface { surface, .. } => {
            if *surface == SurfaceType::UserRegression {
                parse(captured, &ExpectedShape::test_errors()?)?
            } else {
                let mut record = parse(captured, &ExpectedShape::training_errors()?)?;
                record.merge(parse(captured, &ExpectedShape::cv_errors()?)?);
                record
            }
        }
        AnalysisRequest::AleatoryEpistemicUA { roles, .. }
            if !roles.contains(&InputRole::Epistemic) =>
        {
            surface_moments(captured, claimed)?
        }
        AnalysisRequest::UncertaintyAnalysis { .. } => surface_moments(captured, claimed)?,
        AnalysisRequest::RawAnalysis {
            kind: RawKind::Moments,
            ..
        } => parse(captured, &ExpectedShape::sample_moments()?)?,
        AnalysisRequest::PointEvaluation { .. } => {
            parse(captured, &ExpectedShape::point_prediction()?)?
        }
        AnalysisRequest::Odoe(req) => parse_odoe_selection(captured, req.method.command())?,
        AnalysisRequest::AdaptiveRefine { .. } => {
            let mut record = ResultRecord::new(&captured.operation);
            // the refined sample is the only artifact
            if let Some(path) = claimed.first() {
                let refined = read_ensemble(path)?;
                record.insert("n_samples", ResultValue::Number(refined.n_samples() as f64));
                record.insert("refined_file", ResultValue::Path(path.clone()));
            }
            record
        }
        AnalysisRequest::Inference(req) => {
            let mut record = ResultRecord::new(&captured.operation);
            record.insert(
                "n_experiments",
                ResultValue::Number(req.experiments.len() as f64),
            );
            if let Some(path) = find_artifact(claimed, POSTERIOR_SAMPLE_FILE) {
                record.insert("posterior_sample", ResultValue::Path(path.to_path_buf()));
            }
            record
        }
        _ => ResultRecord::new(&captured.operation),
    };
    Ok(record)
}

/// Moments of the surface mean over the sample `rs_ua` drew.
fn surface_moments(captured: &CapturedRun, claimed: &[PathBuf]) -> AppResult<ResultRecord> {
    let path = find_artifact(claimed, RSUA_SAMPLE_FILE).ok_or_else(|| {
        AppError::AnalysisFailed {
            operation: captured.operation.clone(),
            reason: format!("{} was not claimed", RSUA_SAMPLE_FILE),
        }
    })?;
    let moments = mean_moments(&read_rsua_sample(path)?)?;
    let mut record = ResultRecord::new(&captured.operation);
    record.insert("mean", ResultValue::Number(moments.mean));
    record.insert("std_dev", ResultValue::Number(moments.std_dev));
    record.insert("skewness", ResultValue::Number(moments.skewness));
    record.insert("kurtosis", ResultValue::Number(moments.kurtosis));
    Ok(record)
}

fn find_artifact<'a>(claimed: &'a [PathBuf], file_name: &str) -> Option<&'a Path> {
    claimed
        .iter()
        .find(|p| p.file_name().is_some_and(|n| n == file_name))
        .map(PathBuf::as_path)
}

fn read_generated(path: &Path, operation: &str) -> AppResult<Ensemble> {
    if !path.is_file() {
        return Err(AppError::AnalysisFailed {
            operation: operation.to_string(),
            reason: format!("the solver wrote no {}", DESIGN_DATA_FILE),
        });
    }
    Ok(read_ensemble(path)?)
}

/// `drawn` with the template's variable inputs, PDFs included.
fn with_template_pdfs(template: &Ensemble, drawn: &Ensemble) -> AppResult<Ensemble> {
    let inputs = template
        .inputs()
        .iter()
        .filter(|v| !v.is_fixed())
        .cloned()
        .collect();
    let mut out = Ensemble::new(drawn.name.clone(), inputs, drawn.outputs().to_vec())?;
    out.set_data(
        drawn.input_data().to_vec(),
        drawn.output_data().to_vec(),
        drawn.failures().to_vec(),
    )?;
    out.sampling = drawn.sampling;
    Ok(out)
}

/// A generated row of variable-input values, with fixed inputs put back.
fn full_row(template: &Ensemble, values: &[f64]) -> AppResult<Vec<f64>> {
    let n_variable = template.n_variable_inputs();
    if values.len() != n_variable {
        return Err(AppError::AnalysisFailed {
            operation: "sample".to_string(),
            reason: format!(
                "generated rows have {} values for {} variable inputs",
                values.len(),
                n_variable
            ),
        });
    }
    let mut drawn = values.iter();
    let mut row = Vec::with_capacity(template.n_inputs());
    for v in template.inputs() {
        if v.is_fixed() {
            row.push(v.default);
        } else if let Some(x) = drawn.next() {
            row.push(*x);
        }
    }
    Ok(row)
}
