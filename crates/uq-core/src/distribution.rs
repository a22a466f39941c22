//! Input probability distributions.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionKind {
    Uniform,
    Normal,
    Lognormal,
    Triangle,
    Gamma,
    Beta,
    Exponential,
    Weibull,
    Sample,
}

impl DistributionKind {
    pub const ALL: [DistributionKind; 9] = [
        DistributionKind::Uniform,
        DistributionKind::Normal,
        DistributionKind::Lognormal,
        DistributionKind::Triangle,
        DistributionKind::Gamma,
        DistributionKind::Beta,
        DistributionKind::Exponential,
        DistributionKind::Weibull,
        DistributionKind::Sample,
    ];

    pub fn full_name(self) -> &'static str {
        match self {
            DistributionKind::Uniform => "Uniform",
            DistributionKind::Normal => "Normal",
            DistributionKind::Lognormal => "Lognormal",
            DistributionKind::Triangle => "Triangle",
            DistributionKind::Gamma => "Gamma",
            DistributionKind::Beta => "Beta",
            DistributionKind::Exponential => "Exponential",
            DistributionKind::Weibull => "Weibull",
            DistributionKind::Sample => "Sample",
        }
    }

    /// One-letter code used in `PDF` lines.
    pub fn code(self) -> char {
        match self {
            DistributionKind::Uniform => 'U',
            DistributionKind::Normal => 'N',
            DistributionKind::Lognormal => 'L',
            DistributionKind::Triangle => 'T',
            DistributionKind::Gamma => 'G',
            DistributionKind::Beta => 'B',
            DistributionKind::Exponential => 'E',
            DistributionKind::Weibull => 'W',
            DistributionKind::Sample => 'S',
        }
    }

    pub fn parameter_names(self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            DistributionKind::Uniform | DistributionKind::Sample => (None, None),
            DistributionKind::Normal | DistributionKind::Lognormal => {
                (Some("Mean"), Some("Std Dev"))
            }
            DistributionKind::Triangle => (Some("Mode"), Some("Width")),
            DistributionKind::Gamma | DistributionKind::Beta => (Some("Alpha"), Some("Beta")),
            DistributionKind::Exponential => (Some("Lambda"), None),
            DistributionKind::Weibull => (Some("Lambda"), Some("k")),
        }
    }

    /// Look up a kind by full name or by one-letter code.
    pub fn from_name(name: &str) -> CoreResult<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.full_name().eq_ignore_ascii_case(name) || k.code().to_string() == name)
            .ok_or_else(|| CoreError::UnknownName {
                what: "distribution",
                name: name.to_string(),
            })
    }
}

/// A distribution with typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum Distribution {
    #[default]
    Uniform,
    Normal {
        mean: f64,
        std_dev: f64,
    },
    Lognormal {
        mean: f64,
        std_dev: f64,
    },
    Triangle {
        mode: f64,
        width: f64,
    },
    Gamma {
        alpha: f64,
        beta: f64,
    },
    Beta {
        alpha: f64,
        beta: f64,
    },
    Exponential {
        lambda: f64,
    },
    Weibull {
        lambda: f64,
        k: f64,
    },
    /// Draw from column `column` (1-based) of an external sample file.
    Sample {
        file: PathBuf,
        column: usize,
    },
}

impl Distribution {
    pub fn kind(&self) -> DistributionKind {
        match self {
            Distribution::Uniform => DistributionKind::Uniform,
            Distribution::Normal { .. } => DistributionKind::Normal,
            Distribution::Lognormal { .. } => DistributionKind::Lognormal,
            Distribution::Triangle { .. } => DistributionKind::Triangle,
            Distribution::Gamma { .. } => DistributionKind::Gamma,
            Distribution::Beta { .. } => DistributionKind::Beta,
            Distribution::Exponential { .. } => DistributionKind::Exponential,
            Distribution::Weibull { .. } => DistributionKind::Weibull,
            Distribution::Sample { .. } => DistributionKind::Sample,
        }
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, Distribution::Uniform)
    }

    /// Numeric parameters in `PDF` line order.
    pub fn parameters(&self) -> (Option<f64>, Option<f64>) {
        match *self {
            Distribution::Uniform | Distribution::Sample { .. } => (None, None),
            Distribution::Normal { mean, std_dev } | Distribution::Lognormal { mean, std_dev } => {
                (Some(mean), Some(std_dev))
            }
            Distribution::Triangle { mode, width } => (Some(mode), Some(width)),
            Distribution::Gamma { alpha, beta } | Distribution::Beta { alpha, beta } => {
                (Some(alpha), Some(beta))
            }
            Distribution::Exponential { lambda } => (Some(lambda), None),
            Distribution::Weibull { lambda, k } => (Some(lambda), Some(k)),
        }
    }

    /// Build a numeric distribution from a kind and its parameters.
    ///
    /// `Sample` cannot be built this way because it refers to a file.
    pub fn from_parameters(
        kind: DistributionKind,
        p1: Option<f64>,
        p2: Option<f64>,
    ) -> CoreResult<Self> {
        let need = |p: Option<f64>, which: &str| {
            p.ok_or_else(|| CoreError::InvalidArg {
                what: format!("{} distribution needs parameter {}", kind.full_name(), which),
            })
        };
        let dist = match kind {
            DistributionKind::Uniform => Distribution::Uniform,
            DistributionKind::Normal => Distribution::Normal {
                mean: need(p1, "1")?,
                std_dev: need(p2, "2")?,
            },
            DistributionKind::Lognormal => Distribution::Lognormal {
                mean: need(p1, "1")?,
                std_dev: need(p2, "2")?,
            },
            DistributionKind::Triangle => Distribution::Triangle {
                mode: need(p1, "1")?,
                width: need(p2, "2")?,
            },
            DistributionKind::Gamma => Distribution::Gamma {
                alpha: need(p1, "1")?,
                beta: need(p2, "2")?,
            },
            DistributionKind::Beta => Distribution::Beta {
                alpha: need(p1, "1")?,
                beta: need(p2, "2")?,
            },
            DistributionKind::Exponential => Distribution::Exponential {
                lambda: need(p1, "1")?,
            },
            DistributionKind::Weibull => Distribution::Weibull {
                lambda: need(p1, "1")?,
                k: need(p2, "2")?,
            },
            DistributionKind::Sample => {
                return Err(CoreError::InvalidArg {
                    what: "Sample distribution needs a file and a column".to_string(),
                });
            }
        };
        dist.validate()?;
        Ok(dist)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let positive = |v: f64, what: &str| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(CoreError::invariant(format!(
                    "{} of {} distribution must be positive (got {})",
                    what,
                    self.kind().full_name(),
                    v
                )))
            }
        };
        let finite = |v: f64, what: &str| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(CoreError::invariant(format!(
                    "{} of {} distribution must be finite",
                    what,
                    self.kind().full_name()
                )))
            }
        };
        match *self {
            Distribution::Uniform => Ok(()),
            Distribution::Normal { mean, std_dev } | Distribution::Lognormal { mean, std_dev } => {
                finite(mean, "mean")?;
                positive(std_dev, "std dev")
            }
            Distribution::Triangle { mode, width } => {
                finite(mode, "mode")?;
                positive(width, "width")
            }
            Distribution::Gamma { alpha, beta } | Distribution::Beta { alpha, beta } => {
                positive(alpha, "alpha")?;
                positive(beta, "beta")
            }
            Distribution::Exponential { lambda } => positive(lambda, "lambda"),
            Distribution::Weibull { lambda, k } => {
                positive(lambda, "lambda")?;
                positive(k, "k")
            }
            Distribution::Sample { column, .. } => {
                if column == 0 {
                    Err(CoreError::invariant("sample distribution column is 1-based"))
                } else {
                    Ok(())
                }
            }
        }
    }
}
