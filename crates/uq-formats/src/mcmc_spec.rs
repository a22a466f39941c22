//! Observation files for Bayesian calibration.
//!
//! ```text
//! PSUADE_BEGIN
//! <nExperiments> <nOutputs> <nDesign> <design input ids...>
//! <k> <design values...> <mean 1> <std dev 1> ... <mean n> <std dev n>
//! PSUADE_END
//! ```

use crate::{FormatError, FormatResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::Path;
use uq_core::{WIRE_PRECISION, sci};

/// One experiment: where it was run and what was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// One value per design input.
    pub design: Vec<f64>,
    /// `(mean, std dev)` per observed output.
    pub observed: Vec<(f64, f64)>,
}

/// `design_inputs` are 1-based variable-input indices.
pub fn render_mcmc_spec(
    design_inputs: &[usize],
    n_outputs: usize,
    experiments: &[Experiment],
) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "PSUADE_BEGIN")?;
    let mut header = vec![
        experiments.len().to_string(),
        n_outputs.to_string(),
        design_inputs.len().to_string(),
    ];
    header.extend(design_inputs.iter().map(usize::to_string));
    writeln!(out, "{}", header.join(" "))?;
    for (k, e) in experiments.iter().enumerate() {
        if e.design.len() != design_inputs.len() || e.observed.len() != n_outputs {
            return Err(FormatError::Invalid {
                what: "experiment",
                reason: format!(
                    "experiment {} has {} design values and {} observations, expected {} and {}",
                    k + 1,
                    e.design.len(),
                    e.observed.len(),
                    design_inputs.len(),
                    n_outputs
                ),
            });
        }
        if let Some((_, sd)) = e.observed.iter().find(|(_, sd)| !sd.is_finite() || *sd <= 0.0) {
            return Err(FormatError::Invalid {
                what: "experiment",
                reason: format!("experiment {} has std dev {}", k + 1, sd),
            });
        }
        let mut fields = vec![(k + 1).to_string()];
        fields.extend(e.design.iter().map(|v| sci(*v, WIRE_PRECISION)));
        for (mean, sd) in &e.observed {
            fields.push(sci(*mean, WIRE_PRECISION));
            fields.push(sci(*sd, WIRE_PRECISION));
        }
        writeln!(out, "{}", fields.join(" "))?;
    }
    writeln!(out, "PSUADE_END")?;
    Ok(out)
}

pub fn write_mcmc_spec(
    path: &Path,
    design_inputs: &[usize],
    n_outputs: usize,
    experiments: &[Experiment],
) -> FormatResult<()> {
    std::fs::write(path, render_mcmc_spec(design_inputs, n_outputs, experiments)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_numbered_rows() {
        let experiments = vec![
            Experiment {
                design: vec![0.5],
                observed: vec![(2.0, 0.25)],
            },
            Experiment {
                design: vec![1.0],
                observed: vec![(3.0, 0.5)],
            },
        ];
        let text = render_mcmc_spec(&[2], 1, &experiments).unwrap();
        assert_eq!(
            text,
            "PSUADE_BEGIN\n2 1 1 2\n\
             1 5.0000000000000000e-01 2.0000000000000000e+00 2.5000000000000000e-01\n\
             2 1.0000000000000000e+00 3.0000000000000000e+00 5.0000000000000000e-01\n\
             PSUADE_END\n"
        );
    }

    #[test]
    fn no_design_inputs_leaves_a_bare_header() {
        let e = Experiment {
            design: vec![],
            observed: vec![(1.0, 0.5), (4.0, 1.0)],
        };
        let text = render_mcmc_spec(&[], 2, &[e]).unwrap();
        assert!(text.starts_with("PSUADE_BEGIN\n1 2 0\n1 1.0"));
    }

    #[test]
    fn mismatched_rows_and_zero_spread_are_rejected() {
        let short = Experiment {
            design: vec![],
            observed: vec![(1.0, 0.5)],
        };
        assert!(render_mcmc_spec(&[1], 1, std::slice::from_ref(&short)).is_err());
        let flat = Experiment {
            design: vec![],
            observed: vec![(1.0, 0.0)],
        };
        assert!(matches!(
            render_mcmc_spec(&[], 1, &[flat]),
            Err(FormatError::Invalid { .. })
        ));
    }
}
