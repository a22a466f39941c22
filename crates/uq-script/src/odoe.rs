//! Optimal design of experiments under uncertainty.

use crate::builder::BuildContext;
use crate::error::{ScriptError, ScriptResult};
use crate::request::{OdoeEvalRequest, OdoeMethod, OdoeRequest};
use crate::script::Script;
use std::ops::RangeInclusive;
use uq_core::SurfaceType;

/// Surfaces the design optimizer can refit.
pub const ODOE_SURFACES: [SurfaceType; 5] = [
    SurfaceType::Mars,
    SurfaceType::Linear,
    SurfaceType::Quadratic,
    SurfaceType::Cubic,
    SurfaceType::GaussianProcess,
];

const MAX_ITERS: RangeInclusive<usize> = 100..=1000;

/// File the `odoeu_rseval` command writes.
pub const RSEVAL_OUTPUT: &str = "odoeu_rseval.out";

/// 1-based positions of the prior sample's variables among the RS inputs.
pub fn prior_input_indices(
    operation: &str,
    rs_inputs: &[&str],
    prior_inputs: &[&str],
) -> ScriptResult<Vec<usize>> {
    prior_inputs
        .iter()
        .map(|name| {
            rs_inputs
                .iter()
                .position(|n| n == name)
                .map(|i| i + 1)
                .ok_or_else(|| {
                    ScriptError::invalid(
                        operation,
                        format!("prior variable {} is not an input of the RS data", name),
                    )
                })
        })
        .collect()
}

fn check_common(op: &str, prior_inputs: &[usize], surfaces: &[SurfaceType]) -> ScriptResult<()> {
    if prior_inputs.is_empty() {
        return Err(ScriptError::missing(op, "prior inputs"));
    }
    if prior_inputs.contains(&0) {
        return Err(ScriptError::invalid(op, "prior input indices are 1-based"));
    }
    if surfaces.is_empty() {
        return Err(ScriptError::missing(op, "output surfaces"));
    }
    if let Some(bad) = surfaces.iter().find(|s| !ODOE_SURFACES.contains(s)) {
        return Err(ScriptError::invalid(
            op,
            format!("{} is not supported for design optimization", bad),
        ));
    }
    Ok(())
}

pub(crate) fn odoe_script(op: &str, req: &OdoeRequest, ctx: &BuildContext) -> ScriptResult<Script> {
    check_common(op, &req.prior_inputs, &req.output_surfaces)?;
    if !MAX_ITERS.contains(&req.max_iters) {
        return Err(ScriptError::invalid(
            op,
            format!("max iterations {} outside [100, 1000]", req.max_iters),
        ));
    }
    if req.design_size == 0 || req.design_size > req.n_candidates {
        return Err(ScriptError::invalid(
            op,
            format!(
                "design size {} does not fit {} candidates",
                req.design_size, req.n_candidates
            ),
        ));
    }

    let mut s = Script::new(op);
    s.line(req.method.command())
        .line("y")
        .line(req.criterion.index().to_string())
        .int(req.n_candidates)
        .int(req.design_size)
        .int(req.max_iters)
        // multi-start optimization
        .line("y")
        .int(req.multi_starts)
        .line(ctx.path(&req.rs_file));
    for index in &req.prior_inputs {
        s.int(*index);
    }
    s.line("0").line(ctx.path(&req.prior_file));
    if req.method == OdoeMethod::Fisher {
        if req.n_prior > ctx.prior_collapse_threshold {
            s.line("y").line("2").int(ctx.prior_collapse_threshold);
        } else {
            s.line("n");
        }
    }
    s.line(ctx.path(&req.candidate_file))
        .line(ctx.path(&req.evaluation_file));
    for surface in &req.output_surfaces {
        s.line(surface.index().to_string());
    }
    s.line("quit");
    Ok(s)
}

pub(crate) fn odoe_eval_script(
    op: &str,
    req: &OdoeEvalRequest,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    check_common(op, &req.prior_inputs, &req.output_surfaces)?;
    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(&req.rs_file)))
        .line("odoeu_rseval")
        .line("y");
    for index in &req.prior_inputs {
        s.int(*index);
    }
    s.line("0")
        .line(ctx.path(&req.prior_file))
        .line(ctx.path(&req.candidate_file));
    for surface in &req.output_surfaces {
        s.line(surface.index().to_string());
    }
    s.line("quit");
    s.expect(RSEVAL_OUTPUT);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::OdoeCriterion;
    use std::path::{Path, PathBuf};

    fn request(method: OdoeMethod, n_prior: usize) -> OdoeRequest {
        OdoeRequest {
            method,
            criterion: OdoeCriterion::D,
            n_candidates: 40,
            design_size: 4,
            max_iters: 100,
            multi_starts: 20,
            rs_file: PathBuf::from("/w/RSTrainData"),
            prior_inputs: vec![2, 3],
            prior_file: PathBuf::from("/w/PriorSample"),
            n_prior,
            candidate_file: PathBuf::from("/w/CandidateSet"),
            evaluation_file: PathBuf::from("/w/EvaluationSet"),
            output_surfaces: vec![SurfaceType::Mars, SurfaceType::GaussianProcess],
        }
    }

    fn ctx() -> BuildContext {
        BuildContext::in_dir(Path::new("/w"))
    }

    #[test]
    fn fisher_collapses_large_priors() {
        let s = odoe_script("odoeu_foptn", &request(OdoeMethod::Fisher, 5000), &ctx()).unwrap();
        let lines: Vec<&str> = s.lines().iter().map(String::as_str).collect();
        assert_eq!(
            lines,
            vec![
                "odoeu_foptn",
                "y",
                "3",
                "40",
                "4",
                "100",
                "y",
                "20",
                "/w/RSTrainData",
                "2",
                "3",
                "0",
                "/w/PriorSample",
                "y",
                "2",
                "1000",
                "/w/CandidateSet",
                "/w/EvaluationSet",
                "0",
                "8",
                "quit"
            ]
        );
    }

    #[test]
    fn small_priors_and_bayesian_skip_collapse() {
        let fisher = odoe_script("odoeu_foptn", &request(OdoeMethod::Fisher, 500), &ctx()).unwrap();
        assert_eq!(fisher.lines()[13], "n");
        let bayes = odoe_script("odoeu_boptn", &request(OdoeMethod::Bayesian, 5000), &ctx()).unwrap();
        assert_eq!(bayes.lines()[0], "odoeu_boptn");
        assert_eq!(bayes.lines()[13], "/w/CandidateSet");
    }

    #[test]
    fn threshold_is_configurable() {
        let ctx = ctx().with_prior_collapse_threshold(200);
        let s = odoe_script("odoeu_foptn", &request(OdoeMethod::Fisher, 500), &ctx).unwrap();
        assert_eq!(&s.lines()[13..16], &["y", "2", "200"]);
    }

    #[test]
    fn out_of_range_requests_are_rejected() {
        let mut req = request(OdoeMethod::Fisher, 10);
        req.max_iters = 99;
        assert!(odoe_script("odoeu_foptn", &req, &ctx()).is_err());

        let mut req = request(OdoeMethod::Fisher, 10);
        req.output_surfaces = vec![SurfaceType::Kriging];
        assert!(matches!(
            odoe_script("odoeu_foptn", &req, &ctx()),
            Err(ScriptError::InvalidRequest { .. })
        ));

        let mut req = request(OdoeMethod::Fisher, 10);
        req.prior_inputs.clear();
        assert!(matches!(
            odoe_script("odoeu_foptn", &req, &ctx()),
            Err(ScriptError::MissingOption { option: "prior inputs", .. })
        ));
    }

    #[test]
    fn rseval_expects_its_output_file() {
        let req = OdoeEvalRequest {
            rs_file: PathBuf::from("/w/RSTrainData"),
            prior_inputs: vec![1],
            prior_file: PathBuf::from("/w/PriorSample"),
            candidate_file: PathBuf::from("/w/CandidateSet"),
            output_surfaces: vec![SurfaceType::Linear],
        };
        let s = odoe_eval_script("odoeu_rseval", &req, &ctx()).unwrap();
        assert_eq!(s.lines()[0], "load /w/RSTrainData");
        assert_eq!(s.lines().last().map(String::as_str), Some("quit"));
        assert_eq!(s.artifacts()[0].file_name, RSEVAL_OUTPUT);
    }

    #[test]
    fn prior_indices_follow_rs_input_order() {
        let idx = prior_input_indices("odoeu_foptn", &["a", "b", "c"], &["c", "a"]).unwrap();
        assert_eq!(idx, vec![3, 1]);
        assert!(prior_input_indices("odoeu_foptn", &["a"], &["z"]).is_err());
    }
}
