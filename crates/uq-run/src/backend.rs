//! What every execution backend provides to the run manager.

use crate::error::RunResult;
use crate::grid::GridHandle;
use crate::state::StopMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uq_core::{Ensemble, SampleFailure};

/// How one sample ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Done(Vec<f64>),
    Failed(SampleFailure),
}

pub(crate) trait RunBackend: Send {
    fn name(&self) -> &'static str;

    /// Apply whatever completed since the last poll.
    fn poll(&mut self, ensemble: &mut Ensemble) -> RunResult<()>;

    /// Final read-back and cleanup once every row is attempted.
    fn finish(&mut self, ensemble: &mut Ensemble) -> RunResult<()>;

    fn stop(&mut self, mode: StopMode, timeout: Duration, ensemble: &mut Ensemble) -> RunResult<()>;

    fn completed_outputs(&self) -> Option<usize> {
        None
    }

    fn grid_handle(&self) -> Option<&GridHandle> {
        None
    }
}

/// Apply a batch of resolved rows. Rows that were already attempted are left
/// alone, so a failed row is never reattempted by a later poll.
pub(crate) fn apply_resolved(
    ensemble: &mut Ensemble,
    resolved: &[(usize, JobOutcome)],
) -> RunResult<usize> {
    let mut applied = 0;
    for (row, outcome) in resolved {
        if ensemble.run_state().get(*row).copied().unwrap_or(true) {
            continue;
        }
        match outcome {
            JobOutcome::Done(values) => ensemble.set_row_outputs(*row, values)?,
            JobOutcome::Failed(failure) => {
                debug!(row, code = failure.code, "sample failed");
                ensemble.mark_failed(*row, failure.clone())?
            }
        }
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_core::Variable;

    fn ensemble() -> Ensemble {
        Ensemble::new(
            "e",
            vec![Variable::input("x", 0.0, 1.0)],
            vec![Variable::output("y")],
        )
        .unwrap()
        .with_samples(vec![vec![0.1], vec![0.2], vec![0.3]])
        .unwrap()
    }

    #[test]
    fn failed_rows_are_not_overwritten() {
        let mut e = ensemble();
        let first = vec![
            (0, JobOutcome::Done(vec![1.0])),
            (1, JobOutcome::Failed(SampleFailure::new(2, "boom"))),
        ];
        assert_eq!(apply_resolved(&mut e, &first).unwrap(), 2);

        let again = vec![(1, JobOutcome::Done(vec![5.0])), (2, JobOutcome::Done(vec![3.0]))];
        assert_eq!(apply_resolved(&mut e, &again).unwrap(), 1);
        assert_eq!(e.failure(1).unwrap().code, 2);
        assert!(e.output_data()[1][0].is_nan());
        assert_eq!(e.unfinished_count(), 0);
    }
}
