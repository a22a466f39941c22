//! Per-input prior overrides used by uncertainty and sensitivity analyses.

use crate::distribution::Distribution;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PriorSpec {
    /// Uniform prior over new bounds.
    Uniform { min: f64, max: f64 },
    /// Keep the bounds, replace the distribution.
    Pdf { distribution: Distribution },
}

impl PriorSpec {
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            PriorSpec::Uniform { min, max } => {
                if min.is_finite() && max.is_finite() && min <= max {
                    Ok(())
                } else {
                    Err(CoreError::InvalidArg {
                        what: format!("uniform prior bounds [{}, {}]", min, max),
                    })
                }
            }
            PriorSpec::Pdf { distribution } => distribution.validate(),
        }
    }
}
