//! Scripts that reshape a sample rather than analyse it.

use crate::builder::BuildContext;
use crate::error::{ScriptError, ScriptResult};
use crate::script::Script;
use std::path::Path;
use tracing::warn;
use uq_core::Ensemble;

/// Refinement slows down sharply past this many samples.
const REFINE_SLOW_SAMPLES: usize = 1000;

pub(crate) fn refine_script(
    op: &str,
    output: usize,
    initial_size: usize,
    added: usize,
    ensemble: &Ensemble,
    ctx: &BuildContext,
) -> ScriptResult<Script> {
    let n = ensemble.n_samples();
    if initial_size == 0 || initial_size > n {
        return Err(ScriptError::invalid(
            op,
            format!("initial size {} does not fit {} samples", initial_size, n),
        ));
    }
    if added == 0 {
        return Err(ScriptError::invalid(op, "nothing to add"));
    }
    if n > REFINE_SLOW_SAMPLES {
        warn!(operation = op, samples = n, "adaptive refinement of a large sample is slow");
    }
    let refined = ctx
        .refined_file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| ScriptError::missing(op, "refined file name"))?;

    let mut s = Script::new(op);
    s.line(format!("load {}", ctx.path(&ctx.data_file)))
        .line("a_refine")
        .int(output)
        .int(initial_size)
        .int(added)
        .line(format!("write {}", ctx.path(&ctx.refined_file)));
    if ensemble.n_outputs() > 1 {
        // keep every output
        s.line("n");
    }
    s.line("quit");
    s.expect(refined);
    Ok(s)
}

/// Convert a unit-hypercube sample in `data_file` to its input PDFs and
/// write the result to `output_file`.
pub fn pdfconvert_script(
    data_file: &Path,
    output_file: &Path,
    n_outputs: usize,
    ctx: &BuildContext,
) -> Script {
    let mut s = Script::new("pdfconvert");
    s.line(format!("load {}", ctx.path(data_file)))
        .line("pdfconvert")
        .line(format!("write {}", ctx.path(output_file)));
    if n_outputs > 1 {
        s.line("n");
    }
    s.line("quit");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::request::AnalysisRequest;
    use uq_core::Variable;

    fn ensemble(n_outputs: usize) -> Ensemble {
        let outputs = (0..n_outputs)
            .map(|i| Variable::output(format!("y{}", i + 1)))
            .collect();
        Ensemble::new("refine", vec![Variable::input("x", 0.0, 1.0)], outputs)
            .unwrap()
            .with_samples(vec![vec![0.5]; 20])
            .unwrap()
    }

    fn refine(output: usize, initial_size: usize, added: usize) -> AnalysisRequest {
        AnalysisRequest::AdaptiveRefine {
            output,
            initial_size,
            added,
        }
    }

    #[test]
    fn refinement_writes_every_output() {
        let ctx = BuildContext::in_dir(Path::new("/w"));
        let s = build(&refine(2, 10, 5), &ensemble(2), &ctx).unwrap();
        assert_eq!(s.operation(), "a_refine");
        assert_eq!(
            s.lines(),
            &[
                "load /w/ensemble.dat",
                "a_refine",
                "2",
                "10",
                "5",
                "write /w/ensemble.refined",
                "n",
                "quit"
            ]
        );
        assert_eq!(s.artifacts()[0].file_name, "ensemble.refined");

        let single = build(&refine(1, 20, 5), &ensemble(1), &ctx).unwrap();
        assert!(!single.lines().contains(&"n".to_string()));
    }

    #[test]
    fn refinement_sizes_are_checked() {
        let ctx = BuildContext::in_dir(Path::new("/w"));
        assert!(matches!(
            build(&refine(1, 21, 5), &ensemble(1), &ctx),
            Err(ScriptError::InvalidRequest { .. })
        ));
        assert!(build(&refine(1, 10, 0), &ensemble(1), &ctx).is_err());
        assert!(build(&refine(3, 10, 5), &ensemble(2), &ctx).is_err());
    }

    #[test]
    fn pdfconvert_round_trips_through_the_data_file() {
        let ctx = BuildContext::in_dir(Path::new("/w"));
        let s = pdfconvert_script(Path::new("/w/tmp"), Path::new("/w/psuadeData"), 2, &ctx);
        assert_eq!(
            s.lines(),
            &["load /w/tmp", "pdfconvert", "write /w/psuadeData", "n", "quit"]
        );
        assert!(s.artifacts().is_empty());
    }
}
