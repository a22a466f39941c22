//! Sampling schemes known to the solver.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SamplingMethod {
    #[default]
    Mc,
    Lptau,
    Lh,
    Oa,
    Moat,
    Gmoat,
    Lsa,
    Metis,
    Gmetis,
    Fact,
}

/// Outcome of checking a requested sample size against a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSizeCheck {
    /// The scheme will produce exactly this many samples.
    Exact(usize),
    /// The size is not a valid multiple; the nearest valid sizes below and above.
    Bracket(usize, usize),
}

impl SamplingMethod {
    pub const ALL: [SamplingMethod; 10] = [
        SamplingMethod::Mc,
        SamplingMethod::Lptau,
        SamplingMethod::Lh,
        SamplingMethod::Oa,
        SamplingMethod::Moat,
        SamplingMethod::Gmoat,
        SamplingMethod::Lsa,
        SamplingMethod::Metis,
        SamplingMethod::Gmetis,
        SamplingMethod::Fact,
    ];

    pub fn full_name(self) -> &'static str {
        match self {
            SamplingMethod::Mc | SamplingMethod::Gmetis => "Monte Carlo",
            SamplingMethod::Lptau => "Quasi Monte Carlo",
            SamplingMethod::Lh => "Latin Hypercube",
            SamplingMethod::Oa => "Orthogonal Array",
            SamplingMethod::Moat => "Morris Design",
            SamplingMethod::Gmoat => "Generalized Morris Design",
            SamplingMethod::Lsa => "Gradient Sample",
            SamplingMethod::Metis => "METIS",
            SamplingMethod::Fact => "Full Factorial Design",
        }
    }

    pub fn solver_name(self) -> &'static str {
        match self {
            SamplingMethod::Mc => "MC",
            SamplingMethod::Lptau => "LPTAU",
            SamplingMethod::Lh => "LH",
            SamplingMethod::Oa => "OA",
            SamplingMethod::Moat => "MOAT",
            SamplingMethod::Gmoat => "GMOAT",
            SamplingMethod::Lsa => "LSA",
            SamplingMethod::Metis => "METIS",
            SamplingMethod::Gmetis => "GMETIS",
            SamplingMethod::Fact => "FACT",
        }
    }

    /// Solver names are matched first since two schemes share a full name.
    pub fn from_name(name: &str) -> CoreResult<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.solver_name() == name)
            .or_else(|| Self::ALL.into_iter().find(|m| m.full_name() == name))
            .ok_or_else(|| CoreError::UnknownName {
                what: "sampling method",
                name: name.to_string(),
            })
    }

    pub fn validate_sample_size(self, n_inputs: usize, n_samples: usize) -> SampleSizeCheck {
        match self {
            SamplingMethod::Lsa => SampleSizeCheck::Exact(n_inputs + 1),
            SamplingMethod::Moat | SamplingMethod::Gmoat => {
                let m = n_inputs + 1;
                let below = (n_samples / m) * m;
                let above = n_samples.div_ceil(m) * m;
                if below == above {
                    SampleSizeCheck::Exact(n_samples)
                } else {
                    SampleSizeCheck::Bracket(below, above)
                }
            }
            _ => SampleSizeCheck::Exact(n_samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmetis_resolves_by_solver_name() {
        assert_eq!(SamplingMethod::from_name("GMETIS").unwrap(), SamplingMethod::Gmetis);
        assert_eq!(SamplingMethod::from_name("Monte Carlo").unwrap(), SamplingMethod::Mc);
    }

    #[test]
    fn moat_brackets_non_multiples() {
        assert_eq!(
            SamplingMethod::Moat.validate_sample_size(3, 10),
            SampleSizeCheck::Bracket(8, 12)
        );
        assert_eq!(
            SamplingMethod::Gmoat.validate_sample_size(3, 12),
            SampleSizeCheck::Exact(12)
        );
        assert_eq!(SamplingMethod::Lsa.validate_sample_size(4, 99), SampleSizeCheck::Exact(5));
        assert_eq!(SamplingMethod::Lh.validate_sample_size(4, 99), SampleSizeCheck::Exact(99));
    }
}
