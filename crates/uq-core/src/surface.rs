//! Response-surface types and the options each one needs.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceType {
    Mars,
    Linear,
    Quadratic,
    Cubic,
    Quartic,
    GaussianProcess,
    Svm,
    MarsBagged,
    SumOfTrees,
    Legendre,
    UserRegression,
    Kriging,
    Knn,
    Rbf,
}

/// What a surface type requires beyond its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionRequirement {
    None,
    LegendreOrder,
    RegressionFile,
    /// Optional MARS tuning (bases, interactions).
    MarsTunable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarsOptions {
    pub bases: usize,
    pub interactions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceOptions {
    #[serde(default)]
    pub legendre_order: Option<u32>,
    #[serde(default)]
    pub mars: Option<MarsOptions>,
    #[serde(default)]
    pub regression_file: Option<PathBuf>,
}

/// Surface recorded on an ensemble once it has been fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedSurface {
    pub surface: SurfaceType,
    pub legendre_order: Option<u32>,
}

impl SurfaceType {
    pub const ALL: [SurfaceType; 14] = [
        SurfaceType::Mars,
        SurfaceType::Linear,
        SurfaceType::Quadratic,
        SurfaceType::Cubic,
        SurfaceType::Quartic,
        SurfaceType::GaussianProcess,
        SurfaceType::Svm,
        SurfaceType::MarsBagged,
        SurfaceType::SumOfTrees,
        SurfaceType::Legendre,
        SurfaceType::UserRegression,
        SurfaceType::Kriging,
        SurfaceType::Knn,
        SurfaceType::Rbf,
    ];

    /// Numeric code the solver's interactive prompts expect.
    pub fn index(self) -> u32 {
        match self {
            SurfaceType::Mars => 0,
            SurfaceType::Linear => 1,
            SurfaceType::Quadratic => 2,
            SurfaceType::Cubic => 3,
            SurfaceType::Quartic => 4,
            SurfaceType::GaussianProcess => 8,
            SurfaceType::Svm => 9,
            SurfaceType::MarsBagged => 12,
            SurfaceType::SumOfTrees => 14,
            SurfaceType::Legendre => 15,
            SurfaceType::UserRegression => 16,
            SurfaceType::Kriging => 18,
            SurfaceType::Knn => 20,
            SurfaceType::Rbf => 21,
        }
    }

    pub fn solver_name(self) -> &'static str {
        match self {
            SurfaceType::Mars => "MARS",
            SurfaceType::Linear => "linear",
            SurfaceType::Quadratic => "quadratic",
            SurfaceType::Cubic => "cubic",
            SurfaceType::Quartic => "quartic",
            SurfaceType::GaussianProcess => "GP3",
            SurfaceType::Svm => "SVM",
            SurfaceType::MarsBagged => "MARSBag",
            SurfaceType::SumOfTrees => "sum_of_trees",
            SurfaceType::Legendre => "Legendre",
            SurfaceType::UserRegression => "user_regression",
            SurfaceType::Kriging => "Kriging",
            SurfaceType::Knn => "KNN",
            SurfaceType::Rbf => "RBF",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            SurfaceType::Mars => "MARS",
            SurfaceType::Linear => "Linear Regression",
            SurfaceType::Quadratic => "Quadratic Regression",
            SurfaceType::Cubic => "Cubic Regression",
            SurfaceType::Quartic => "Quartic Regression",
            SurfaceType::GaussianProcess => "Gaussian Process",
            SurfaceType::Svm => "Support Vector Machine",
            SurfaceType::MarsBagged => "MARS with Bagging",
            SurfaceType::SumOfTrees => "Sum of Trees",
            SurfaceType::Legendre => "Legendre Polynomial Regression",
            SurfaceType::UserRegression => "User Regression",
            SurfaceType::Kriging => "Kriging",
            SurfaceType::Knn => "K Nearest Neighbors",
            SurfaceType::Rbf => "Radial Basis Function",
        }
    }

    pub fn from_index(index: u32) -> CoreResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.index() == index)
            .ok_or_else(|| CoreError::UnknownName {
                what: "response surface index",
                name: index.to_string(),
            })
    }

    /// Accepts the solver name, the full name or a numeric index.
    pub fn from_name(name: &str) -> CoreResult<Self> {
        let name = name.trim();
        if let Ok(index) = name.parse::<u32>() {
            return Self::from_index(index);
        }
        Self::ALL
            .into_iter()
            .find(|s| s.solver_name() == name || s.full_name() == name)
            .ok_or_else(|| CoreError::UnknownName {
                what: "response surface",
                name: name.to_string(),
            })
    }

    pub fn is_mars(self) -> bool {
        matches!(self, SurfaceType::Mars | SurfaceType::MarsBagged)
    }

    pub fn is_polynomial(self) -> bool {
        matches!(
            self,
            SurfaceType::Linear
                | SurfaceType::Quadratic
                | SurfaceType::Cubic
                | SurfaceType::Quartic
                | SurfaceType::Legendre
        )
    }

    /// Fixed polynomial degree, `None` for Legendre (user chosen) and non-polynomials.
    pub fn polynomial_order(self) -> Option<u32> {
        match self {
            SurfaceType::Linear => Some(1),
            SurfaceType::Quadratic => Some(2),
            SurfaceType::Cubic => Some(3),
            SurfaceType::Quartic => Some(4),
            _ => None,
        }
    }

    pub fn requirement(self) -> OptionRequirement {
        match self {
            SurfaceType::Legendre => OptionRequirement::LegendreOrder,
            SurfaceType::UserRegression => OptionRequirement::RegressionFile,
            SurfaceType::Mars | SurfaceType::MarsBagged => OptionRequirement::MarsTunable,
            SurfaceType::Linear
            | SurfaceType::Quadratic
            | SurfaceType::Cubic
            | SurfaceType::Quartic
            | SurfaceType::GaussianProcess
            | SurfaceType::Svm
            | SurfaceType::SumOfTrees
            | SurfaceType::Kriging
            | SurfaceType::Knn
            | SurfaceType::Rbf => OptionRequirement::None,
        }
    }

    /// Smallest ensemble this surface can be fitted on.
    pub fn min_sample_size(self, n_inputs: usize, legendre_order: Option<u32>) -> CoreResult<u128> {
        let order = match self {
            SurfaceType::Legendre => Some(legendre_order.ok_or_else(|| CoreError::InvalidArg {
                what: "Legendre surface needs an order".to_string(),
            })?),
            other => other.polynomial_order(),
        };
        Ok(match (self, order) {
            (_, Some(p)) => binomial(p as usize + n_inputs, p as usize),
            (SurfaceType::Mars | SurfaceType::MarsBagged, None) => 50,
            (SurfaceType::Kriging, None) => 10,
            _ => 100,
        })
    }
}

impl std::fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.full_name())
    }
}

/// Largest Legendre order `p` with C(p + n_inputs, p) <= n_samples.
pub fn legendre_max_order(n_inputs: usize, n_samples: usize) -> Option<u32> {
    if n_inputs == 0 || n_samples == 0 {
        return None;
    }
    let mut p: u32 = 0;
    while binomial(p as usize + 1 + n_inputs, p as usize + 1) <= n_samples as u128 {
        p += 1;
    }
    Some(p)
}

fn binomial(n: usize, k: usize) -> u128 {
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc.saturating_mul((n - i) as u128) / (i as u128 + 1);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_round_trip() {
        for s in SurfaceType::ALL {
            assert_eq!(SurfaceType::from_index(s.index()).unwrap(), s);
            assert_eq!(SurfaceType::from_name(s.solver_name()).unwrap(), s);
        }
        assert!(SurfaceType::from_index(5).is_err());
    }

    #[test]
    fn requirements_are_exhaustive() {
        assert_eq!(SurfaceType::Legendre.requirement(), OptionRequirement::LegendreOrder);
        assert_eq!(SurfaceType::UserRegression.requirement(), OptionRequirement::RegressionFile);
        assert_eq!(SurfaceType::MarsBagged.requirement(), OptionRequirement::MarsTunable);
        assert_eq!(SurfaceType::Kriging.requirement(), OptionRequirement::None);
    }

    #[test]
    fn min_sample_sizes() {
        assert_eq!(SurfaceType::Quadratic.min_sample_size(3, None).unwrap(), 10);
        assert_eq!(SurfaceType::Legendre.min_sample_size(2, Some(3)).unwrap(), 10);
        assert_eq!(SurfaceType::Mars.min_sample_size(8, None).unwrap(), 50);
        assert_eq!(SurfaceType::Kriging.min_sample_size(8, None).unwrap(), 10);
        assert_eq!(SurfaceType::Svm.min_sample_size(8, None).unwrap(), 100);
        assert!(SurfaceType::Legendre.min_sample_size(2, None).is_err());
    }

    #[test]
    fn legendre_max_order_fits_sample_count() {
        // C(2+2,2) = 6 <= 9 < C(3+2,3) = 10
        assert_eq!(legendre_max_order(2, 9), Some(2));
        assert_eq!(legendre_max_order(2, 10), Some(3));
        assert_eq!(legendre_max_order(0, 10), None);
    }
}
