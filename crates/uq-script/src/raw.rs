//! Analyses run straight on the ensemble data.

use crate::builder::BuildContext;
use crate::error::{ScriptError, ScriptResult};
use crate::request::{RawKind, ScreeningMethod};
use crate::script::Script;
use uq_core::Ensemble;

pub(crate) fn raw_script(
    op: &str,
    output: usize,
    kind: RawKind,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let n = ensemble.n_samples();
    if n < kind.min_samples() {
        return Err(ScriptError::invalid(
            op,
            format!("needs at least {} samples, ensemble has {}", kind.min_samples(), n),
        ));
    }
    if let Some(max) = kind.max_inputs() {
        let n_variable = ensemble.n_variable_inputs();
        if n_variable > max {
            return Err(ScriptError::invalid(
                op,
                format!("supports at most {} inputs, ensemble has {}", max, n_variable),
            ));
        }
    }

    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(&ctx.data_file)))
        .line(kind.command())
        .int(output);
    match kind {
        // Gaussian process flavour for the screening fit
        RawKind::Screen(ScreeningMethod::GpScreen) => {
            s.line("3");
        }
        // no plots, no scatter file, write the bootstrap script
        RawKind::Screen(ScreeningMethod::Moat) => {
            s.line("n").line("n").line("y");
        }
        RawKind::Screen(ScreeningMethod::MarsScreen) => {
            s.line("0");
        }
        _ => {}
    }
    s.line("quit");
    s.expect(kind.artifact());
    Ok(s)
}

#[cfg(test)]
mod tests {
    use crate::builder::{BuildContext, build};
    use crate::error::ScriptError;
    use crate::request::{AnalysisRequest, RawKind, ScreeningMethod};
    use std::path::Path;
    use uq_core::{Ensemble, Variable};

    fn ensemble(n_inputs: usize, n_samples: usize) -> Ensemble {
        let inputs = (0..n_inputs)
            .map(|i| Variable::input(format!("x{}", i), 0.0, 1.0))
            .collect();
        Ensemble::new("raw", inputs, vec![Variable::output("y")])
            .unwrap()
            .with_samples(vec![vec![0.5; n_inputs]; n_samples])
            .unwrap()
    }

    fn build_raw(kind: RawKind, e: &Ensemble) -> Result<Vec<String>, ScriptError> {
        let req = AnalysisRequest::RawAnalysis { output: 1, kind };
        build(&req, e, &BuildContext::in_dir(Path::new("/w"))).map(|s| s.lines().to_vec())
    }

    #[test]
    fn moat_answers_its_prompts() {
        let lines = build_raw(RawKind::Screen(ScreeningMethod::Moat), &ensemble(3, 40)).unwrap();
        assert_eq!(lines, vec!["load /w/ensemble.dat", "moat", "1", "n", "n", "y", "quit"]);
    }

    #[test]
    fn moments_need_no_extras() {
        let req = AnalysisRequest::RawAnalysis {
            output: 1,
            kind: RawKind::Moments,
        };
        let s = build(&req, &ensemble(2, 5), &BuildContext::in_dir(Path::new("/w"))).unwrap();
        assert_eq!(s.lines(), &["load /w/ensemble.dat", "ua", "1", "quit"]);
        assert_eq!(s.artifacts()[0].file_name, "matlabua.m");
    }

    #[test]
    fn sample_floors_are_enforced() {
        assert!(build_raw(RawKind::MainEffect, &ensemble(2, 999)).is_err());
        assert!(build_raw(RawKind::MainEffect, &ensemble(2, 1000)).is_ok());
        assert!(build_raw(RawKind::TotalSensitivity, &ensemble(11, 10000)).is_err());
        assert!(build_raw(RawKind::TotalSensitivity, &ensemble(10, 10000)).is_ok());
    }
}
