//! Bayesian calibration against experiment observations.
//!
//! The analysed data file holds only the observed outputs, in ascending
//! order, so the surface answers follow that order.

use crate::builder::{BuildContext, SurfaceSetup, check_output, resolve_surface, surface_answers};
use crate::error::{ScriptError, ScriptResult};
use crate::request::{CalibrationRole, InferenceRequest, ObservedOutput};
use crate::script::Script;
use uq_core::Ensemble;

/// MCMC sample increment.
const MCMC_INCREMENT: usize = 5000;
const HISTOGRAM_BINS: usize = 20;
/// Samples used to build the proposal distribution.
const PROPOSAL_SAMPLES: usize = 60;
const MCMC_CHAINS: usize = 3;
/// Surface index of the discrepancy model (Kriging).
const DISCREPANCY_SURFACE: usize = 18;

/// Written by the solver when the chains could not continue.
pub const INFERENCE_FAILURE_FILE: &str = "psTrack.m";
pub const POSTERIOR_SAMPLE_FILE: &str = "MCMCPostSample";
pub const DISCREPANCY_FILE: &str = "psDiscrepancyModel";

pub(crate) fn inference_script(
    op: &str,
    req: &InferenceRequest,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let observed = sorted_observed(op, req, ensemble)?;
    check_roles(op, req, ensemble)?;
    check_experiments(op, req, observed.len())?;

    let setups = observed
        .iter()
        .map(|o| resolve_surface(op, o.output, o.surface, &o.options, ensemble, ctx))
        .collect::<ScriptResult<Vec<SurfaceSetup>>>()?;
    let expert = setups.iter().any(SurfaceSetup::expert);

    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(&ctx.rsdata_file)));
    if expert {
        s.line("rs_expert");
    }
    // non-uniform priors need analysis expert mode
    s.line("ana_expert")
        .line("rsmcmc")
        .line(ctx.path(&ctx.mcmc_file))
        // include surface uncertainty
        .line("y");
    for (o, setup) in observed.iter().zip(&setups) {
        s.line(o.surface.index().to_string());
        surface_answers(&mut s, setup);
    }
    s.int(MCMC_INCREMENT)
        .int(HISTOGRAM_BINS)
        // posterior plots for every input
        .line("-1")
        .line(yes_no(req.discrepancy))
        .line(yes_no(req.posterior_sample))
        .int(PROPOSAL_SAMPLES);
    if req.discrepancy {
        // no nominal values for the other inputs
        s.int(DISCREPANCY_SURFACE).line("n");
        if expert {
            // slow Kriging mode and its tolerance
            s.line("3").line("1e-4");
        }
    }
    s.int(MCMC_CHAINS).line("1.05").line("quit");

    s.expect("matlabmcmc2.m").expect_optional("matlabmcmc.m");
    if req.posterior_sample {
        s.expect(POSTERIOR_SAMPLE_FILE);
    }
    if req.discrepancy {
        s.expect(DISCREPANCY_FILE);
    }
    Ok(s)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "y" } else { "n" }
}

fn sorted_observed<'a>(
    op: &str,
    req: &'a InferenceRequest,
    ensemble: &Ensemble,
) -> ScriptResult<Vec<&'a ObservedOutput>> {
    if req.observed.is_empty() {
        return Err(ScriptError::missing(op, "observed outputs"));
    }
    let mut observed: Vec<&ObservedOutput> = req.observed.iter().collect();
    observed.sort_by_key(|o| o.output);
    for pair in observed.windows(2) {
        if pair[0].output == pair[1].output {
            return Err(ScriptError::invalid(
                op,
                format!("output {} is observed twice", pair[0].output),
            ));
        }
    }
    for o in &observed {
        check_output(op, o.output, ensemble)?;
    }
    Ok(observed)
}

fn check_roles(op: &str, req: &InferenceRequest, ensemble: &Ensemble) -> ScriptResult<()> {
    let n_variable = ensemble.n_variable_inputs();
    if req.roles.len() != n_variable {
        return Err(ScriptError::invalid(
            op,
            format!("{} roles for {} variable inputs", req.roles.len(), n_variable),
        ));
    }
    if !req.prior.is_empty() && req.prior.len() != n_variable {
        return Err(ScriptError::invalid(
            op,
            format!("{} prior entries for {} variable inputs", req.prior.len(), n_variable),
        ));
    }
    if !req.roles.contains(&CalibrationRole::Calibrated) {
        return Err(ScriptError::missing(op, "calibrated inputs"));
    }
    Ok(())
}

fn check_experiments(op: &str, req: &InferenceRequest, n_observed: usize) -> ScriptResult<()> {
    if req.experiments.is_empty() {
        return Err(ScriptError::missing(op, "experiments"));
    }
    let n_design = req.design_inputs().len();
    for (k, e) in req.experiments.iter().enumerate() {
        if e.design.len() != n_design || e.observed.len() != n_observed {
            return Err(ScriptError::invalid(
                op,
                format!(
                    "experiment {} needs {} design values and {} observations",
                    k + 1,
                    n_design,
                    n_observed
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::request::AnalysisRequest;
    use std::path::Path;
    use uq_core::{MarsOptions, SurfaceOptions, SurfaceType, Variable};
    use uq_formats::Experiment;

    fn ensemble() -> Ensemble {
        let inputs = vec![
            Variable::input("k", 0.0, 1.0),
            Variable::input("t", 300.0, 400.0),
        ];
        let outputs = vec![
            Variable::output("y1"),
            Variable::output("y2"),
            Variable::output("y3"),
        ];
        let rows = (0..20).map(|i| vec![i as f64 / 20.0, 300.0 + i as f64]).collect();
        Ensemble::new("cal", inputs, outputs)
            .unwrap()
            .with_samples(rows)
            .unwrap()
    }

    fn observed(output: usize, surface: SurfaceType, options: SurfaceOptions) -> ObservedOutput {
        ObservedOutput {
            output,
            surface,
            options,
        }
    }

    fn request() -> InferenceRequest {
        InferenceRequest {
            observed: vec![
                observed(3, SurfaceType::Quadratic, SurfaceOptions::default()),
                observed(
                    1,
                    SurfaceType::Legendre,
                    SurfaceOptions {
                        legendre_order: Some(2),
                        ..Default::default()
                    },
                ),
            ],
            roles: vec![CalibrationRole::Calibrated, CalibrationRole::Design],
            prior: vec![],
            experiments: vec![Experiment {
                design: vec![350.0],
                observed: vec![(1.0, 0.1), (2.0, 0.2)],
            }],
            posterior_sample: true,
            discrepancy: false,
        }
    }

    fn lines(req: InferenceRequest) -> ScriptResult<(Vec<String>, Vec<(String, bool)>)> {
        let s = build(
            &AnalysisRequest::Inference(req),
            &ensemble(),
            &BuildContext::in_dir(Path::new("/w")),
        )?;
        let artifacts = s
            .artifacts()
            .iter()
            .map(|a| (a.file_name.clone(), a.required))
            .collect();
        Ok((s.lines().to_vec(), artifacts))
    }

    #[test]
    fn surfaces_follow_ascending_output_order() {
        let (l, artifacts) = lines(request()).unwrap();
        assert_eq!(
            l,
            vec![
                "load /w/ensemble.rsdat",
                "ana_expert",
                "rsmcmc",
                "/w/ensemble.mcmc",
                "y",
                "15",
                "2",
                "2",
                "5000",
                "20",
                "-1",
                "n",
                "y",
                "60",
                "3",
                "1.05",
                "quit"
            ]
        );
        assert_eq!(
            artifacts,
            vec![
                ("matlabmcmc2.m".to_string(), true),
                ("matlabmcmc.m".to_string(), false),
                ("MCMCPostSample".to_string(), true)
            ]
        );
    }

    #[test]
    fn discrepancy_with_mars_asks_for_slow_kriging() {
        let mut req = request();
        req.observed = vec![observed(
            2,
            SurfaceType::Mars,
            SurfaceOptions {
                mars: Some(MarsOptions {
                    bases: 15,
                    interactions: 2,
                }),
                ..Default::default()
            },
        )];
        req.experiments[0].observed = vec![(1.0, 0.1)];
        req.posterior_sample = false;
        req.discrepancy = true;
        let (l, artifacts) = lines(req).unwrap();
        assert_eq!(&l[..3], &["load /w/ensemble.rsdat", "rs_expert", "ana_expert"]);
        assert_eq!(l[6], "0");
        let tail: Vec<&str> = l[7..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "15", "2", "n", "5000", "20", "-1", "y", "n", "60", "18", "n", "3", "1e-4",
                "3", "1.05", "quit"
            ]
        );
        assert_eq!(artifacts.last().unwrap().0, "psDiscrepancyModel");
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let mut twice = request();
        twice.observed[0].output = 1;
        assert!(matches!(lines(twice), Err(ScriptError::InvalidRequest { .. })));

        let mut nothing_to_calibrate = request();
        nothing_to_calibrate.roles = vec![CalibrationRole::Fixed(0.5), CalibrationRole::Design];
        assert!(matches!(
            lines(nothing_to_calibrate),
            Err(ScriptError::MissingOption { option: "calibrated inputs", .. })
        ));

        let mut short = request();
        short.experiments[0].design.clear();
        assert!(lines(short).is_err());

        let mut none = request();
        none.experiments.clear();
        assert!(lines(none).is_err());
    }

    #[test]
    fn role_helpers_number_variable_inputs_from_one() {
        let mut req = request();
        req.roles = vec![CalibrationRole::Fixed(0.5), CalibrationRole::Design];
        assert_eq!(req.design_inputs(), vec![2]);
        assert_eq!(req.fixed_inputs(), vec![(1, 0.5)]);
        assert_eq!(req.observed_outputs(), vec![1, 3]);
    }
}
