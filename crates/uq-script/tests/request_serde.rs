use std::path::PathBuf;
use uq_core::{Distribution, MarsOptions, PriorSpec, SurfaceOptions, SurfaceType};
use uq_formats::Experiment;
use uq_script::{
    AnalysisRequest, CalibrationRole, InferenceRequest, InputRole, ObservedOutput, OdoeCriterion,
    OdoeEvalRequest, OdoeMethod, OdoeRequest, RawKind, ScreeningMethod, SobolOrder,
};

fn mars() -> SurfaceOptions {
    SurfaceOptions {
        mars: Some(MarsOptions {
            bases: 20,
            interactions: 2,
        }),
        ..Default::default()
    }
}

fn every_request() -> Vec<AnalysisRequest> {
    vec![
        AnalysisRequest::ValidateResponseSurface {
            output: 1,
            surface: SurfaceType::Legendre,
            options: SurfaceOptions {
                legendre_order: Some(3),
                ..Default::default()
            },
            cv_groups: Some(5),
            test_file: Some(PathBuf::from("/data/test.dat")),
            generate_code: true,
        },
        AnalysisRequest::UncertaintyAnalysis {
            output: 2,
            surface: SurfaceType::Quadratic,
            options: SurfaceOptions::default(),
            prior: vec![Some(PriorSpec::Uniform { min: 0.25, max: 0.75 }), None],
        },
        AnalysisRequest::SensitivityAnalysis {
            output: 1,
            surface: SurfaceType::MarsBagged,
            options: mars(),
            order: SobolOrder::Second,
            bootstrap: true,
            prior: vec![
                None,
                Some(PriorSpec::Pdf {
                    distribution: Distribution::Normal {
                        mean: 0.5,
                        std_dev: 0.125,
                    },
                }),
            ],
        },
        AnalysisRequest::PointEvaluation {
            output: 1,
            surface: SurfaceType::UserRegression,
            options: SurfaceOptions {
                regression_file: Some(PathBuf::from("/m/reg.py")),
                ..Default::default()
            },
            point: vec![0.5, -0.25],
        },
        AnalysisRequest::AleatoryEpistemicUA {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            roles: vec![InputRole::Aleatory, InputRole::Epistemic, InputRole::Fixed(0.5)],
        },
        AnalysisRequest::Emulate {
            output: 3,
            training_file: PathBuf::from("/data/train.psu"),
        },
        AnalysisRequest::RawAnalysis {
            output: 1,
            kind: RawKind::Moments,
        },
        AnalysisRequest::RawAnalysis {
            output: 2,
            kind: RawKind::Screen(ScreeningMethod::Moat),
        },
        AnalysisRequest::Odoe(OdoeRequest {
            method: OdoeMethod::Bayesian,
            criterion: OdoeCriterion::D,
            n_candidates: 40,
            design_size: 4,
            max_iters: 200,
            multi_starts: 3,
            rs_file: PathBuf::from("/d/rs.dat"),
            prior_inputs: vec![1, 3],
            prior_file: PathBuf::from("/d/prior.smp"),
            n_prior: 100,
            candidate_file: PathBuf::from("/d/cand.smp"),
            evaluation_file: PathBuf::from("/d/eval.smp"),
            output_surfaces: vec![SurfaceType::Mars, SurfaceType::GaussianProcess],
        }),
        AnalysisRequest::OdoeEval(OdoeEvalRequest {
            rs_file: PathBuf::from("/d/rs.dat"),
            prior_inputs: vec![2],
            prior_file: PathBuf::from("/d/prior.smp"),
            candidate_file: PathBuf::from("/d/cand.smp"),
            output_surfaces: vec![SurfaceType::Linear],
        }),
        AnalysisRequest::AdaptiveRefine {
            output: 1,
            initial_size: 50,
            added: 25,
        },
        AnalysisRequest::Inference(InferenceRequest {
            observed: vec![ObservedOutput {
                output: 2,
                surface: SurfaceType::Mars,
                options: mars(),
            }],
            roles: vec![
                CalibrationRole::Calibrated,
                CalibrationRole::Design,
                CalibrationRole::Fixed(0.5),
            ],
            prior: vec![Some(PriorSpec::Uniform { min: 0.0, max: 0.5 }), None, None],
            experiments: vec![Experiment {
                design: vec![0.75],
                observed: vec![(1.5, 0.25)],
            }],
            posterior_sample: true,
            discrepancy: true,
        }),
    ]
}

#[test]
fn every_request_survives_json() {
    for request in every_request() {
        let json = serde_json::to_string(&request).unwrap();
        let back: AnalysisRequest = serde_json::from_str(&json)
            .unwrap_or_else(|e| panic!("{} did not read back: {}\n{}", request.operation(), e, json));
        assert_eq!(back, request);
    }
}

#[test]
fn raw_analysis_keeps_its_kind_field() {
    let request = AnalysisRequest::RawAnalysis {
        output: 1,
        kind: RawKind::Correlation,
    };
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["request"], "RawAnalysis");
    assert_eq!(value["kind"], "Correlation");
}

#[test]
fn optional_fields_default_when_absent() {
    let json = r#"{"request":"UncertaintyAnalysis","output":1,"surface":"Linear"}"#;
    let request: AnalysisRequest = serde_json::from_str(json).unwrap();
    assert_eq!(
        request,
        AnalysisRequest::UncertaintyAnalysis {
            output: 1,
            surface: SurfaceType::Linear,
            options: SurfaceOptions::default(),
            prior: vec![],
        }
    );
}
