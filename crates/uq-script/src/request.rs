//! Analysis requests.
//!
//! Output indices are 1-based, as the solver counts them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uq_core::{PriorSpec, SurfaceOptions, SurfaceType};
use uq_formats::Experiment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SobolOrder {
    First,
    Second,
    Total,
}

impl SobolOrder {
    pub fn command(self) -> &'static str {
        match self {
            SobolOrder::First => "rssobol1",
            SobolOrder::Second => "rssobol2",
            SobolOrder::Total => "rssoboltsi",
        }
    }
}

/// Role of a variable input in mixed aleatory-epistemic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputRole {
    Aleatory,
    Epistemic,
    /// Pinned at the given value.
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreeningMethod {
    Moat,
    Lsa,
    MarsScreen,
    SumOfTreesScreen,
    DeltaTest,
    GpScreen,
}

impl ScreeningMethod {
    pub fn command(self) -> &'static str {
        match self {
            ScreeningMethod::Moat => "moat",
            ScreeningMethod::Lsa => "lsa",
            ScreeningMethod::MarsScreen => "mars_sa",
            ScreeningMethod::SumOfTreesScreen => "sot_sa",
            ScreeningMethod::DeltaTest => "delta_test",
            ScreeningMethod::GpScreen => "gp_sa",
        }
    }

    pub fn artifact(self) -> &'static str {
        match self {
            ScreeningMethod::Moat => "matlabmoatbs.m",
            ScreeningMethod::Lsa => "matlablsa.m",
            ScreeningMethod::MarsScreen => "matlabmarsa.m",
            ScreeningMethod::SumOfTreesScreen => "matlabsot.m",
            ScreeningMethod::DeltaTest => "matlabdelta.m",
            ScreeningMethod::GpScreen => "matlabkrisa.m",
        }
    }
}

/// Analyses run directly on ensemble data, without a response surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawKind {
    Moments,
    Correlation,
    MainEffect,
    InteractionEffect,
    TotalSensitivity,
    Screen(ScreeningMethod),
}

impl RawKind {
    pub fn command(self) -> &'static str {
        match self {
            RawKind::Moments => "ua",
            RawKind::Correlation => "ca",
            RawKind::MainEffect => "me",
            RawKind::InteractionEffect => "ie",
            RawKind::TotalSensitivity => "tsi",
            RawKind::Screen(m) => m.command(),
        }
    }

    pub fn artifact(self) -> &'static str {
        match self {
            RawKind::Moments => "matlabua.m",
            RawKind::Correlation => "matlabca.m",
            RawKind::MainEffect => "matlabme.m",
            RawKind::InteractionEffect => "matlabaie.m",
            RawKind::TotalSensitivity => "matlabtsi.m",
            RawKind::Screen(m) => m.artifact(),
        }
    }

    /// Fewest samples the solver accepts for this analysis.
    pub fn min_samples(self) -> usize {
        match self {
            RawKind::MainEffect | RawKind::InteractionEffect => 1000,
            RawKind::TotalSensitivity => 10000,
            _ => 0,
        }
    }

    pub fn max_inputs(self) -> Option<usize> {
        match self {
            RawKind::TotalSensitivity => Some(10),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OdoeMethod {
    Fisher,
    Bayesian,
}

impl OdoeMethod {
    pub fn command(self) -> &'static str {
        match self {
            OdoeMethod::Fisher => "odoeu_foptn",
            OdoeMethod::Bayesian => "odoeu_boptn",
        }
    }
}

/// Optimality criterion; the solver numbers them G=1 through E=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OdoeCriterion {
    G,
    I,
    D,
    A,
    E,
}

impl OdoeCriterion {
    pub fn index(self) -> u32 {
        match self {
            OdoeCriterion::G => 1,
            OdoeCriterion::I => 2,
            OdoeCriterion::D => 3,
            OdoeCriterion::A => 4,
            OdoeCriterion::E => 5,
        }
    }
}

/// Optimal design of experiments: pick `design_size` of the candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdoeRequest {
    pub method: OdoeMethod,
    pub criterion: OdoeCriterion,
    pub n_candidates: usize,
    pub design_size: usize,
    /// Must lie in `[100, 1000]`.
    pub max_iters: usize,
    pub multi_starts: usize,
    /// RS training data in ensemble-file form.
    pub rs_file: PathBuf,
    /// 1-based input indices of the uncertain variables in the prior sample.
    pub prior_inputs: Vec<usize>,
    pub prior_file: PathBuf,
    pub n_prior: usize,
    pub candidate_file: PathBuf,
    pub evaluation_file: PathBuf,
    /// Surface for each output, in output order.
    pub output_surfaces: Vec<SurfaceType>,
}

/// Evaluate fitted surfaces over a candidate set under prior uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdoeEvalRequest {
    pub rs_file: PathBuf,
    pub prior_inputs: Vec<usize>,
    pub prior_file: PathBuf,
    pub candidate_file: PathBuf,
    pub output_surfaces: Vec<SurfaceType>,
}

/// An observed output and the surface that stands in for the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOutput {
    pub output: usize,
    pub surface: SurfaceType,
    #[serde(default)]
    pub options: SurfaceOptions,
}

/// Role of a variable input during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CalibrationRole {
    /// Has a prior and gets a posterior.
    Calibrated,
    /// Set per experiment.
    Design,
    Fixed(f64),
}

/// Bayesian calibration of the uncertain inputs against experiments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Outputs with observations; the rest are dropped before calibration.
    pub observed: Vec<ObservedOutput>,
    /// One role per variable input.
    pub roles: Vec<CalibrationRole>,
    /// Prior overrides, one per variable input; only calibrated inputs use theirs.
    #[serde(default)]
    pub prior: Vec<Option<PriorSpec>>,
    /// Observations in ascending observed-output order.
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub posterior_sample: bool,
    #[serde(default)]
    pub discrepancy: bool,
}

impl InferenceRequest {
    /// 1-based variable-input indices of the design inputs.
    pub fn design_inputs(&self) -> Vec<usize> {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == CalibrationRole::Design)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Pinned variable inputs as 1-based `(index, value)` pairs.
    pub fn fixed_inputs(&self) -> Vec<(usize, f64)> {
        self.roles
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r {
                CalibrationRole::Fixed(v) => Some((i + 1, *v)),
                _ => None,
            })
            .collect()
    }

    /// Observed outputs, ascending.
    pub fn observed_outputs(&self) -> Vec<usize> {
        let mut outputs: Vec<usize> = self.observed.iter().map(|o| o.output).collect();
        outputs.sort_unstable();
        outputs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request")]
pub enum AnalysisRequest {
    ValidateResponseSurface {
        output: usize,
        surface: SurfaceType,
        #[serde(default)]
        options: SurfaceOptions,
        /// Cross-validation groups; defaults to `min(nSamples, 10)`.
        cv_groups: Option<usize>,
        /// Held-out data for user-regression validation.
        test_file: Option<PathBuf>,
        #[serde(default)]
        generate_code: bool,
    },
    UncertaintyAnalysis {
        output: usize,
        surface: SurfaceType,
        #[serde(default)]
        options: SurfaceOptions,
        #[serde(default)]
        prior: Vec<Option<PriorSpec>>,
    },
    SensitivityAnalysis {
        output: usize,
        surface: SurfaceType,
        #[serde(default)]
        options: SurfaceOptions,
        order: SobolOrder,
        #[serde(default)]
        bootstrap: bool,
        #[serde(default)]
        prior: Vec<Option<PriorSpec>>,
    },
    PointEvaluation {
        output: usize,
        surface: SurfaceType,
        #[serde(default)]
        options: SurfaceOptions,
        /// One value per variable input.
        point: Vec<f64>,
    },
    AleatoryEpistemicUA {
        output: usize,
        surface: SurfaceType,
        #[serde(default)]
        options: SurfaceOptions,
        /// One role per variable input.
        roles: Vec<InputRole>,
    },
    Emulate {
        output: usize,
        training_file: PathBuf,
    },
    RawAnalysis {
        output: usize,
        kind: RawKind,
    },
    Odoe(OdoeRequest),
    OdoeEval(OdoeEvalRequest),
    /// Add `added` points where the surface for `output` is least certain.
    AdaptiveRefine {
        output: usize,
        /// Size of the sample the refinement started from.
        initial_size: usize,
        added: usize,
    },
    Inference(InferenceRequest),
}

impl AnalysisRequest {
    /// Short operation name used in logs, errors and history records.
    pub fn operation(&self) -> String {
        match self {
            AnalysisRequest::ValidateResponseSurface { surface, .. } => {
                if *surface == SurfaceType::UserRegression {
                    "rstest".to_string()
                } else {
                    "rscheck".to_string()
                }
            }
            AnalysisRequest::UncertaintyAnalysis { .. } => "rs_ua".to_string(),
            AnalysisRequest::SensitivityAnalysis {
                order, bootstrap, ..
            } => {
                if *bootstrap {
                    format!("{}b", order.command())
                } else {
                    order.command().to_string()
                }
            }
            AnalysisRequest::PointEvaluation { .. } => "rseval".to_string(),
            AnalysisRequest::AleatoryEpistemicUA { roles, .. } => {
                if roles.iter().any(|r| *r == InputRole::Epistemic) {
                    "aeua".to_string()
                } else {
                    "rs_ua".to_string()
                }
            }
            AnalysisRequest::Emulate { .. } => "emulate".to_string(),
            AnalysisRequest::RawAnalysis { kind, .. } => kind.command().to_string(),
            AnalysisRequest::Odoe(req) => req.method.command().to_string(),
            AnalysisRequest::OdoeEval(_) => "odoeu_rseval".to_string(),
            AnalysisRequest::AdaptiveRefine { .. } => "a_refine".to_string(),
            AnalysisRequest::Inference(_) => "rsmcmc".to_string(),
        }
    }

    /// The 1-based output the request analyses, when it has one.
    pub fn output(&self) -> Option<usize> {
        match self {
            AnalysisRequest::ValidateResponseSurface { output, .. }
            | AnalysisRequest::UncertaintyAnalysis { output, .. }
            | AnalysisRequest::SensitivityAnalysis { output, .. }
            | AnalysisRequest::PointEvaluation { output, .. }
            | AnalysisRequest::AleatoryEpistemicUA { output, .. }
            | AnalysisRequest::Emulate { output, .. }
            | AnalysisRequest::RawAnalysis { output, .. }
            | AnalysisRequest::AdaptiveRefine { output, .. } => Some(*output),
            AnalysisRequest::Odoe(_)
            | AnalysisRequest::OdoeEval(_)
            | AnalysisRequest::Inference(_) => None,
        }
    }

    /// Surface and options, for requests that fit a response surface.
    pub fn surface(&self) -> Option<(SurfaceType, &SurfaceOptions)> {
        match self {
            AnalysisRequest::ValidateResponseSurface {
                surface, options, ..
            }
            | AnalysisRequest::UncertaintyAnalysis {
                surface, options, ..
            }
            | AnalysisRequest::SensitivityAnalysis {
                surface, options, ..
            }
            | AnalysisRequest::PointEvaluation {
                surface, options, ..
            }
            | AnalysisRequest::AleatoryEpistemicUA {
                surface, options, ..
            } => Some((*surface, options)),
            _ => None,
        }
    }
}
