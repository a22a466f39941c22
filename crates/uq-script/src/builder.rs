//! Request + ensemble -> solver script.
//!
//! Each builder mirrors one interactive session with the solver. The answers
//! must come in exactly the order the solver prompts for them, so the
//! functions below read top to bottom like the session transcript.

use crate::design::refine_script;
use crate::error::{ScriptError, ScriptResult};
use crate::inference::inference_script;
use crate::odoe::{odoe_eval_script, odoe_script};
use crate::paths::{IdentityPaths, PathNormalizer};
use crate::raw::raw_script;
use crate::request::{AnalysisRequest, InputRole, SobolOrder};
use crate::script::Script;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uq_core::{Ensemble, MarsOptions, SurfaceOptions, SurfaceType};

/// Default for [`BuildContext::prior_collapse_threshold`].
pub const DEFAULT_PRIOR_COLLAPSE_THRESHOLD: usize = 1000;

/// Samples drawn from the fitted surface during uncertainty analysis.
const UA_SAMPLE_SIZE: usize = 10_000;

/// Bootstrap replicates for sensitivity error bars.
const SA_BOOTSTRAPS: usize = 50;

/// MARS models averaged by the bagged variant.
const MARS_BAG_SIZE: usize = 100;

/// File the second emulation phase leaves in the working directory.
pub const EMULATE_OUTPUT: &str = "psuadeData";

/// Solver-side files and knobs a script may refer to.
#[derive(Clone)]
pub struct BuildContext {
    /// Ensemble file holding the analysed data.
    pub data_file: PathBuf,
    /// RS-data file (data plus priors and analysis block).
    pub rsdata_file: PathBuf,
    /// Where the user-regression test data is written when none is given.
    pub test_file: PathBuf,
    /// Where the first emulation phase writes its single-output training data.
    pub training_file: PathBuf,
    /// Refined sample written by adaptive refinement; must sit in the
    /// working directory so it can be claimed.
    pub refined_file: PathBuf,
    /// Experiment observations for calibration.
    pub mcmc_file: PathBuf,
    /// The `labels=` line of the user regression file, if it has one.
    pub regression_labels: Option<String>,
    /// Prior samples larger than this are collapsed before Fisher ODOE.
    pub prior_collapse_threshold: usize,
    pub paths: Arc<dyn PathNormalizer>,
}

impl BuildContext {
    /// Context with every solver file placed in `dir` under its stock name.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data_file: dir.join("ensemble.dat"),
            rsdata_file: dir.join("ensemble.rsdat"),
            test_file: dir.join("ensemble.testdat"),
            training_file: dir.join("ensemble.traindat"),
            refined_file: dir.join("ensemble.refined"),
            mcmc_file: dir.join("ensemble.mcmc"),
            regression_labels: None,
            prior_collapse_threshold: DEFAULT_PRIOR_COLLAPSE_THRESHOLD,
            paths: Arc::new(IdentityPaths),
        }
    }

    pub fn with_paths(mut self, paths: Arc<dyn PathNormalizer>) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_regression_labels(mut self, labels: Option<String>) -> Self {
        self.regression_labels = labels;
        self
    }

    pub fn with_prior_collapse_threshold(mut self, threshold: usize) -> Self {
        self.prior_collapse_threshold = threshold;
        self
    }

    pub(crate) fn path(&self, path: &Path) -> String {
        self.paths.normalize(path)
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("data_file", &self.data_file)
            .field("rsdata_file", &self.rsdata_file)
            .field("test_file", &self.test_file)
            .field("training_file", &self.training_file)
            .field("refined_file", &self.refined_file)
            .field("mcmc_file", &self.mcmc_file)
            .field("regression_labels", &self.regression_labels)
            .field("prior_collapse_threshold", &self.prior_collapse_threshold)
            .finish_non_exhaustive()
    }
}

/// Build the solver script for `request` against `ensemble`.
pub fn build(
    request: &AnalysisRequest,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let op = request.operation();
    if let Some(output) = request.output() {
        check_output(&op, output, ensemble)?;
    }
    let script = match request {
        AnalysisRequest::ValidateResponseSurface {
            output,
            surface,
            options,
            cv_groups,
            test_file,
            generate_code,
        } => {
            if *surface == SurfaceType::UserRegression {
                validate_user_regression(&op, *output, options, test_file.as_deref(), ensemble, ctx)?
            } else {
                validate_standard(
                    &op,
                    *output,
                    *surface,
                    options,
                    *cv_groups,
                    *generate_code,
                    ensemble,
                    ctx,
                )?
            }
        }
        AnalysisRequest::UncertaintyAnalysis {
            output,
            surface,
            options,
            prior,
        } => {
            check_prior_len(&op, prior.len(), ensemble)?;
            uncertainty(&op, *output, *surface, options, ensemble, ctx)?
        }
        AnalysisRequest::SensitivityAnalysis {
            output,
            surface,
            options,
            order,
            bootstrap,
            prior,
        } => {
            check_prior_len(&op, prior.len(), ensemble)?;
            sensitivity(&op, *output, *surface, options, *order, *bootstrap, ensemble, ctx)?
        }
        AnalysisRequest::PointEvaluation {
            output,
            surface,
            options,
            point,
        } => point_evaluation(&op, *output, *surface, options, point, ensemble, ctx)?,
        AnalysisRequest::AleatoryEpistemicUA {
            output,
            surface,
            options,
            roles,
        } => aleatory_epistemic(&op, *output, *surface, options, roles, ensemble, ctx)?,
        AnalysisRequest::Emulate {
            output,
            training_file,
        } => emulate(&op, *output, training_file, ctx),
        AnalysisRequest::RawAnalysis { output, kind } => {
            raw_script(&op, *output, *kind, ensemble, ctx)?
        }
        AnalysisRequest::Odoe(req) => odoe_script(&op, req, ctx)?,
        AnalysisRequest::OdoeEval(req) => odoe_eval_script(&op, req, ctx)?,
        AnalysisRequest::AdaptiveRefine {
            output,
            initial_size,
            added,
        } => refine_script(&op, *output, *initial_size, *added, ensemble, ctx)?,
        AnalysisRequest::Inference(req) => inference_script(&op, req, ensemble, ctx)?,
    };
    debug!(
        operation = %script.operation(),
        lines = script.lines().len(),
        artifacts = script.artifacts().len(),
        "built solver script"
    );
    Ok(script)
}

/// Surface actually fitted for `request`.
///
/// Bootstrapped sensitivity analysis refits the surface per replicate, which
/// the bagged MARS variant cannot do, so it falls back to plain MARS.
pub fn effective_surface(request: &AnalysisRequest) -> Option<SurfaceType> {
    match request {
        AnalysisRequest::SensitivityAnalysis {
            surface: SurfaceType::MarsBagged,
            bootstrap: true,
            ..
        } => Some(SurfaceType::Mars),
        other => other.surface().map(|(s, _)| s),
    }
}

/// Clamp MARS tuning to what the ensemble supports.
///
/// Fewer than 12 samples cannot carry MARS options at all.
pub fn check_mars_options(
    operation: &str,
    options: MarsOptions,
    ensemble: &Ensemble,
) -> ScriptResult<MarsOptions> {
    let n = ensemble.n_samples();
    if n < 12 {
        return Err(ScriptError::missing(operation, "at least 12 samples for MARS options"));
    }
    let n_variable = ensemble.n_variable_inputs();
    let mut checked = options;
    if !(10..=n).contains(&options.bases) {
        warn!(
            operation,
            bases = options.bases,
            reset_to = n,
            "MARS bases out of range, resetting"
        );
        checked.bases = n;
    }
    if !(2..=n_variable).contains(&options.interactions) {
        warn!(
            operation,
            interactions = options.interactions,
            reset_to = n_variable,
            "MARS interactions out of range, resetting"
        );
        checked.interactions = n_variable;
    }
    Ok(checked)
}

/// The `labels=` line of a user regression module, if present.
pub fn labels_line(content: &str) -> Option<String> {
    content
        .lines()
        .find(|line| {
            let squashed: String = line
                .to_lowercase()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            squashed.starts_with("labels=")
        })
        .map(str::to_string)
}

/// Output name as the user regression module knows it.
///
/// A labels line mentioning the underscored `node_var` form wins; otherwise
/// node-qualified names lose their node prefix.
pub fn regression_output_name(
    name: &str,
    labels: Option<&str>,
    names_include_nodes: bool,
) -> String {
    let underscored = name.replace('.', "_");
    if labels.is_some_and(|l| l.contains(&underscored)) {
        return underscored;
    }
    if names_include_nodes {
        if let Some((_, rest)) = name.split_once('.') {
            return rest.to_string();
        }
    }
    name.to_string()
}

// ---- Shared pieces ----

pub(crate) fn check_output(op: &str, output: usize, ensemble: &Ensemble) -> ScriptResult<()> {
    if output == 0 || output > ensemble.n_outputs() {
        return Err(ScriptError::invalid(
            op,
            format!(
                "output {} out of range (ensemble has {})",
                output,
                ensemble.n_outputs()
            ),
        ));
    }
    Ok(())
}

fn check_prior_len(op: &str, len: usize, ensemble: &Ensemble) -> ScriptResult<()> {
    let expected = ensemble.n_variable_inputs();
    if len != 0 && len != expected {
        return Err(ScriptError::invalid(
            op,
            format!("{} prior entries for {} variable inputs", len, expected),
        ));
    }
    Ok(())
}

/// Surface answers resolved against the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SurfaceSetup {
    Plain,
    Legendre(u32),
    Regression { file: String, name: String },
    Mars { bagged: bool, options: MarsOptions },
}

impl SurfaceSetup {
    pub(crate) fn expert(&self) -> bool {
        matches!(self, SurfaceSetup::Mars { .. })
    }
}

pub(crate) fn resolve_surface(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<SurfaceSetup> {
    match surface {
        SurfaceType::Legendre => options
            .legendre_order
            .map(SurfaceSetup::Legendre)
            .ok_or_else(|| ScriptError::missing(op, "legendre order")),
        SurfaceType::UserRegression => {
            let file = options
                .regression_file
                .as_deref()
                .ok_or_else(|| ScriptError::missing(op, "regression file"))?;
            let name = &ensemble.outputs()[output - 1].name;
            Ok(SurfaceSetup::Regression {
                file: ctx.path(file),
                name: regression_output_name(
                    name,
                    ctx.regression_labels.as_deref(),
                    ensemble.names_include_nodes,
                ),
            })
        }
        s if s.is_mars() => match options.mars {
            Some(m) => Ok(SurfaceSetup::Mars {
                bagged: s == SurfaceType::MarsBagged,
                options: check_mars_options(op, m, ensemble)?,
            }),
            None => Ok(SurfaceSetup::Plain),
        },
        _ => Ok(SurfaceSetup::Plain),
    }
}

fn load_prelude(script: &mut Script, file: String, setup: &SurfaceSetup) {
    script.line(format!("load {}", file));
    if setup.expert() {
        script.line("rs_expert");
    }
}

fn regression_answers(script: &mut Script, file: &str, name: &str) {
    script.line("1").line(file).line("y").line(name);
}

fn mars_answers(script: &mut Script, bagged: bool, bases: usize, interactions: usize) {
    if bagged {
        script.line("0").int(MARS_BAG_SIZE);
    }
    script.int(bases).int(interactions);
    if !bagged {
        script.line("n");
    }
}

pub(crate) fn surface_answers(script: &mut Script, setup: &SurfaceSetup) {
    match setup {
        SurfaceSetup::Plain => {}
        SurfaceSetup::Legendre(order) => {
            script.line(order.to_string());
        }
        SurfaceSetup::Regression { file, name } => regression_answers(script, file, name),
        SurfaceSetup::Mars { bagged, options } => {
            mars_answers(script, *bagged, options.bases, options.interactions)
        }
    }
}

// ---- Validation ----

#[allow(clippy::too_many_arguments)]
fn validate_standard(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    cv_groups: Option<usize>,
    generate_code: bool,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let setup = resolve_surface(op, output, surface, options, ensemble, ctx)?;
    let n = ensemble.n_samples();
    let n_cv = match cv_groups {
        Some(g) if g > 0 && g <= n => g,
        _ => n.min(10),
    };
    if n_cv == 0 {
        return Err(ScriptError::invalid(op, "ensemble has no samples"));
    }

    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(&ctx.data_file)));
    if generate_code {
        s.line("rs_codegen");
    }
    if setup.expert() {
        s.line("rs_expert");
    }
    s.line("rscheck").line(surface.index().to_string()).int(output);
    match &setup {
        SurfaceSetup::Legendre(order) => {
            s.line(order.to_string());
        }
        SurfaceSetup::Mars { bagged, options } => {
            // no input/output transformation
            s.line("0");
            mars_answers(&mut s, *bagged, options.bases, options.interactions);
        }
        _ => {}
    }
    s.line("y").int(n_cv);
    if let SurfaceSetup::Mars { bagged, options } = &setup {
        if *bagged {
            s.line("0").int(MARS_BAG_SIZE);
        }
        let bases = options.bases.min(n - n / n_cv);
        s.int(bases).int(options.interactions);
    }
    s.line("y");
    if let SurfaceSetup::Legendre(order) = &setup {
        s.line(order.to_string());
    }
    s.line("quit");

    s.expect("RSFA_CV_err.m");
    if generate_code {
        s.expect_optional("psuade_rs.py").expect_optional("psuade_rs.info");
    }
    Ok(s)
}

fn validate_user_regression(
    op: &str,
    output: usize,
    options: &SurfaceOptions,
    test_file: Option<&Path>,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let SurfaceSetup::Regression { file, name } =
        resolve_surface(op, output, SurfaceType::UserRegression, options, ensemble, ctx)?
    else {
        return Err(ScriptError::missing(op, "regression file"));
    };
    let data = ctx.path(&ctx.data_file);

    let mut s = Script::new(op);
    s.line(format!("load {}", data));
    let test = match test_file {
        Some(path) => ctx.path(path),
        None => {
            let test = ctx.path(&ctx.test_file);
            s.line(format!("write {}", test));
            if ensemble.n_outputs() > 1 {
                s.line("y").int(output);
            }
            s.line(format!("load {}", data));
            test
        }
    };
    s.line("rstest")
        .line(test)
        .int(output)
        .line(SurfaceType::UserRegression.index().to_string())
        // no discrepancy model
        .line("n");
    regression_answers(&mut s, &file, &name);
    s.line("quit");
    s.expect("RSTest_hs.m");
    Ok(s)
}

// ---- Surface analyses ----

fn point_evaluation(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    point: &[f64],
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let n_variable = ensemble.n_variable_inputs();
    if point.len() != n_variable {
        return Err(ScriptError::invalid(
            op,
            format!("point has {} values for {} variable inputs", point.len(), n_variable),
        ));
    }
    let setup = resolve_surface(op, output, surface, options, ensemble, ctx)?;

    let mut s = Script::new(op);
    load_prelude(&mut s, ctx.path(&ctx.data_file), &setup);
    s.line("rscreate");
    if ensemble.n_outputs() > 1 {
        s.int(output);
    }
    s.line(surface.index().to_string());
    surface_answers(&mut s, &setup);
    s.line("ivec_create");
    for (i, value) in point.iter().enumerate() {
        s.line("ivec_modify").int(i + 1).value(*value);
    }
    // register input, fuzzy evaluation on, no output file
    s.line("ivec_show")
        .line("rseval")
        .line("n")
        .line("y")
        .line("n")
        .line("quit");
    Ok(s)
}

fn uncertainty(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let setup = resolve_surface(op, output, surface, options, ensemble, ctx)?;
    let mut s = Script::new(op);
    load_prelude(&mut s, ctx.path(&ctx.rsdata_file), &setup);
    s.line("rs_ua").int(output).int(UA_SAMPLE_SIZE).line("y");
    surface_answers(&mut s, &setup);
    s.line("quit");
    s.expect("matlabrsua.m").expect("rsua_sample");
    Ok(s)
}

/// Variable inputs pinned by an AEUA request, as 1-based `(index, value)` pairs.
pub fn fixed_role_entries(roles: &[InputRole]) -> Vec<(usize, f64)> {
    roles
        .iter()
        .enumerate()
        .filter_map(|(i, role)| match role {
            InputRole::Fixed(v) => Some((i + 1, *v)),
            _ => None,
        })
        .collect()
}

fn aleatory_epistemic(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    roles: &[InputRole],
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let n_variable = ensemble.n_variable_inputs();
    if roles.len() != n_variable {
        return Err(ScriptError::invalid(
            op,
            format!("{} roles for {} variable inputs", roles.len(), n_variable),
        ));
    }
    let epistemic: Vec<usize> = roles
        .iter()
        .enumerate()
        .filter(|(_, r)| **r == InputRole::Epistemic)
        .map(|(i, _)| i + 1)
        .collect();
    if epistemic.is_empty() {
        warn!(operation = op, "no epistemic inputs, running plain uncertainty analysis");
        return uncertainty(op, output, surface, options, ensemble, ctx);
    }
    if !roles.iter().any(|r| *r == InputRole::Aleatory) {
        return Err(ScriptError::missing(op, "aleatory inputs"));
    }

    let setup = resolve_surface(op, output, surface, options, ensemble, ctx)?;
    let mut s = Script::new(op);
    load_prelude(&mut s, ctx.path(&ctx.rsdata_file), &setup);
    s.line("aeua").int(output);
    surface_answers(&mut s, &setup);
    for index in epistemic {
        s.int(index);
    }
    s.line("0").line("quit");
    s.expect("matlabaeua.m");
    Ok(s)
}

#[allow(clippy::too_many_arguments)]
fn sensitivity(
    op: &str,
    output: usize,
    surface: SurfaceType,
    options: &SurfaceOptions,
    order: SobolOrder,
    bootstrap: bool,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let surface = if bootstrap && surface == SurfaceType::MarsBagged {
        warn!(operation = op, "bagged MARS treated as MARS for bootstrapped sensitivity");
        SurfaceType::Mars
    } else {
        surface
    };
    let setup = resolve_surface(op, output, surface, options, ensemble, ctx)?;
    let replicates = if bootstrap { SA_BOOTSTRAPS } else { 1 };

    let mut s = Script::new(op);
    load_prelude(&mut s, ctx.path(&ctx.rsdata_file), &setup);
    s.line(op).int(output);
    if bootstrap {
        s.int(SA_BOOTSTRAPS);
    }
    match &setup {
        SurfaceSetup::Mars { options, .. } if bootstrap => {
            let bases = options.bases.min(ensemble.n_samples() / 2);
            for _ in 0..replicates {
                s.int(bases).int(options.interactions).line("n");
            }
        }
        SurfaceSetup::Mars { bagged, options } => {
            mars_answers(&mut s, *bagged, options.bases, options.interactions)
        }
        SurfaceSetup::Regression { file, name } => {
            for _ in 0..replicates {
                regression_answers(&mut s, file, name);
            }
        }
        // Legendre order travels in the RS-data file
        SurfaceSetup::Legendre(_) | SurfaceSetup::Plain => {}
    }
    s.line("quit");

    s.expect(format!("matlab{}.m", op));
    if bootstrap {
        s.expect_optional(format!("matlab{}.m", order.command()));
    }
    Ok(s)
}

fn emulate(op: &str, output: usize, training_data: &Path, ctx: &BuildContext) -> Script {
    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(training_data)))
        .line(format!("write {}", ctx.path(&ctx.training_file)))
        // keep a single output
        .line("y")
        .int(output)
        .line("quit");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_core::Variable;

    fn ensemble(n_samples: usize, n_outputs: usize) -> Ensemble {
        let inputs = vec![
            Variable::input("a", 0.0, 1.0),
            Variable::input("b", 0.0, 1.0),
            Variable::fixed("c", 2.0),
            Variable::input("d", -1.0, 1.0),
        ];
        let outputs = (0..n_outputs)
            .map(|i| Variable::output(format!("node.y{}", i + 1)))
            .collect();
        let rows = (0..n_samples)
            .map(|i| {
                let t = i as f64 / n_samples as f64;
                vec![t, 1.0 - t, 2.0, 0.0]
            })
            .collect();
        Ensemble::new("test", inputs, outputs)
            .unwrap()
            .with_samples(rows)
            .unwrap()
    }

    fn ctx() -> BuildContext {
        BuildContext::in_dir(Path::new("/w"))
    }

    fn lines(s: &Script) -> Vec<&str> {
        s.lines().iter().map(String::as_str).collect()
    }

    #[test]
    fn validate_legendre_repeats_order_after_cv() {
        let req = AnalysisRequest::ValidateResponseSurface {
            output: 1,
            surface: SurfaceType::Legendre,
            options: SurfaceOptions {
                legendre_order: Some(2),
                ..Default::default()
            },
            cv_groups: None,
            test_file: None,
            generate_code: false,
        };
        let s = build(&req, &ensemble(20, 1), &ctx()).unwrap();
        assert_eq!(
            lines(&s),
            vec!["load /w/ensemble.dat", "rscheck", "15", "1", "2", "y", "10", "y", "2", "quit"]
        );
        assert_eq!(s.artifacts()[0].file_name, "RSFA_CV_err.m");
    }

    #[test]
    fn validate_bagged_mars_answers_cv_bases() {
        let req = AnalysisRequest::ValidateResponseSurface {
            output: 2,
            surface: SurfaceType::MarsBagged,
            options: SurfaceOptions {
                mars: Some(MarsOptions {
                    bases: 18,
                    interactions: 2,
                }),
                ..Default::default()
            },
            cv_groups: Some(4),
            test_file: None,
            generate_code: true,
        };
        let s = build(&req, &ensemble(20, 2), &ctx()).unwrap();
        assert_eq!(
            lines(&s),
            vec![
                "load /w/ensemble.dat",
                "rs_codegen",
                "rs_expert",
                "rscheck",
                "12",
                "2",
                "0",
                "0",
                "100",
                "18",
                "2",
                "y",
                "4",
                "0",
                "100",
                "15",
                "2",
                "y",
                "quit"
            ]
        );
        assert_eq!(s.artifacts().len(), 3);
        assert!(!s.artifacts()[1].required);
    }

    #[test]
    fn cv_groups_beyond_sample_count_fall_back_to_default() {
        let req = AnalysisRequest::ValidateResponseSurface {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            cv_groups: Some(50),
            test_file: None,
            generate_code: false,
        };
        let s = build(&req, &ensemble(7, 1), &ctx()).unwrap();
        assert_eq!(lines(&s)[5], "7");
    }

    #[test]
    fn user_regression_validation_writes_test_file_when_missing() {
        let req = AnalysisRequest::ValidateResponseSurface {
            output: 2,
            surface: SurfaceType::UserRegression,
            options: SurfaceOptions {
                regression_file: Some(PathBuf::from("/m/reg.py")),
                ..Default::default()
            },
            cv_groups: None,
            test_file: None,
            generate_code: false,
        };
        let mut e = ensemble(20, 2);
        e.names_include_nodes = true;
        let s = build(&req, &e, &ctx()).unwrap();
        assert_eq!(s.operation(), "rstest");
        assert_eq!(
            lines(&s),
            vec![
                "load /w/ensemble.dat",
                "write /w/ensemble.testdat",
                "y",
                "2",
                "load /w/ensemble.dat",
                "rstest",
                "/w/ensemble.testdat",
                "2",
                "16",
                "n",
                "1",
                "/m/reg.py",
                "y",
                "y2",
                "quit"
            ]
        );
    }

    #[test]
    fn point_evaluation_writes_values_in_wire_notation() {
        let req = AnalysisRequest::PointEvaluation {
            output: 1,
            surface: SurfaceType::Quadratic,
            options: SurfaceOptions::default(),
            point: vec![0.5, 0.25, -1.0],
        };
        let s = build(&req, &ensemble(20, 1), &ctx()).unwrap();
        let l = lines(&s);
        assert_eq!(&l[..4], &["load /w/ensemble.dat", "rscreate", "2", "ivec_create"]);
        assert_eq!(&l[4..7], &["ivec_modify", "1", "5.0000000000000000e-01"]);
        assert_eq!(l.last(), Some(&"quit"));
    }

    #[test]
    fn point_evaluation_rejects_wrong_point_width() {
        let req = AnalysisRequest::PointEvaluation {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            point: vec![0.5],
        };
        assert!(matches!(
            build(&req, &ensemble(20, 1), &ctx()),
            Err(ScriptError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn uncertainty_loads_rsdata() {
        let req = AnalysisRequest::UncertaintyAnalysis {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            prior: vec![],
        };
        let s = build(&req, &ensemble(20, 1), &ctx()).unwrap();
        assert_eq!(
            lines(&s),
            vec!["load /w/ensemble.rsdat", "rs_ua", "1", "10000", "y", "quit"]
        );
        assert_eq!(s.artifacts().len(), 2);
    }

    #[test]
    fn aeua_lists_epistemic_inputs_and_falls_back_without_them() {
        let mut req = AnalysisRequest::AleatoryEpistemicUA {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            roles: vec![InputRole::Aleatory, InputRole::Fixed(0.3), InputRole::Epistemic],
        };
        let s = build(&req, &ensemble(20, 1), &ctx()).unwrap();
        assert_eq!(
            lines(&s),
            vec!["load /w/ensemble.rsdat", "aeua", "1", "3", "0", "quit"]
        );

        if let AnalysisRequest::AleatoryEpistemicUA { roles, .. } = &mut req {
            roles[2] = InputRole::Aleatory;
            assert_eq!(fixed_role_entries(roles), vec![(2, 0.3)]);
        }
        let s = build(&req, &ensemble(20, 1), &ctx()).unwrap();
        assert_eq!(s.operation(), "rs_ua");
        assert_eq!(lines(&s)[1], "rs_ua");
    }

    #[test]
    fn aeua_without_aleatory_inputs_is_missing_option() {
        let req = AnalysisRequest::AleatoryEpistemicUA {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            roles: vec![InputRole::Epistemic, InputRole::Fixed(0.3), InputRole::Epistemic],
        };
        assert_eq!(
            build(&req, &ensemble(20, 1), &ctx()).unwrap_err(),
            ScriptError::MissingOption {
                operation: "aeua".to_string(),
                option: "aleatory inputs"
            }
        );
    }

    #[test]
    fn bootstrapped_sensitivity_repeats_mars_answers() {
        let req = AnalysisRequest::SensitivityAnalysis {
            output: 1,
            surface: SurfaceType::MarsBagged,
            options: SurfaceOptions {
                mars: Some(MarsOptions {
                    bases: 20,
                    interactions: 3,
                }),
                ..Default::default()
            },
            order: SobolOrder::First,
            bootstrap: true,
            prior: vec![],
        };
        assert_eq!(effective_surface(&req), Some(SurfaceType::Mars));
        let s = build(&req, &ensemble(30, 1), &ctx()).unwrap();
        let l = lines(&s);
        assert_eq!(&l[..5], &["load /w/ensemble.rsdat", "rs_expert", "rssobol1b", "1", "50"]);
        // 50 x (bases, interactions, n) then quit
        assert_eq!(l.len(), 5 + 150 + 1);
        assert_eq!(&l[5..8], &["15", "3", "n"]);
        assert_eq!(s.artifacts()[0].file_name, "matlabrssobol1b.m");
        assert_eq!(s.artifacts()[1].file_name, "matlabrssobol1.m");
        assert!(!s.artifacts()[1].required);
    }

    #[test]
    fn mars_options_are_clamped() {
        let e = ensemble(30, 1);
        let checked = check_mars_options(
            "rscheck",
            MarsOptions {
                bases: 5,
                interactions: 9,
            },
            &e,
        )
        .unwrap();
        assert_eq!(
            checked,
            MarsOptions {
                bases: 30,
                interactions: 3
            }
        );
        assert!(matches!(
            check_mars_options("rscheck", checked, &ensemble(11, 1)),
            Err(ScriptError::MissingOption { .. })
        ));
    }

    #[test]
    fn regression_names_follow_labels_line() {
        let content = "import x\nlabels = ['node_y1', 'b']\n";
        let labels = labels_line(content);
        assert_eq!(labels.as_deref(), Some("labels = ['node_y1', 'b']"));
        assert_eq!(regression_output_name("node.y1", labels.as_deref(), true), "node_y1");
        assert_eq!(regression_output_name("node.y2", labels.as_deref(), true), "y2");
        assert_eq!(regression_output_name("node.y2", None, false), "node.y2");
    }

    #[test]
    fn emulate_writes_single_output_training_file() {
        let req = AnalysisRequest::Emulate {
            output: 2,
            training_file: PathBuf::from("/data/train.psu"),
        };
        let s = build(&req, &ensemble(20, 2), &ctx()).unwrap();
        assert_eq!(
            lines(&s),
            vec![
                "load /data/train.psu",
                "write /w/ensemble.traindat",
                "y",
                "2",
                "quit"
            ]
        );
    }

    #[test]
    fn output_index_is_checked() {
        let req = AnalysisRequest::UncertaintyAnalysis {
            output: 3,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            prior: vec![],
        };
        assert!(matches!(
            build(&req, &ensemble(20, 2), &ctx()),
            Err(ScriptError::InvalidRequest { .. })
        ));
    }
}
