//! Model variables: bounded inputs, fixed constants and outputs.

use crate::distribution::Distribution;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    /// Sampled between `min` and `max`.
    Variable,
    /// Held at `default` for every sample.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub role: Role,
    pub kind: VariableKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    #[serde(default)]
    pub distribution: Distribution,
}

impl Variable {
    /// A sampled input; the default sits at the midpoint of the bounds.
    pub fn input(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            role: Role::Input,
            kind: VariableKind::Variable,
            min,
            max,
            default: 0.5 * (min + max),
            distribution: Distribution::Uniform,
        }
    }

    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            role: Role::Input,
            kind: VariableKind::Fixed,
            min: value,
            max: value,
            default: value,
            distribution: Distribution::Uniform,
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: Role::Output,
            kind: VariableKind::Variable,
            min: 0.0,
            max: 0.0,
            default: 0.0,
            distribution: Distribution::Uniform,
        }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = default;
        self
    }

    pub fn is_fixed(&self) -> bool {
        self.kind == VariableKind::Fixed
    }

    /// Name with any `node.` prefix removed.
    pub fn short_name(&self) -> &str {
        match self.name.split_once('.') {
            Some((_, rest)) => rest,
            None => &self.name,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::invariant("variable name is empty"));
        }
        if self.role == Role::Output {
            if self.is_fixed() {
                return Err(CoreError::invariant(format!(
                    "output {} cannot be fixed",
                    self.name
                )));
            }
            return Ok(());
        }
        if self.is_fixed() {
            if self.min != self.max || self.default != self.min {
                return Err(CoreError::invariant(format!(
                    "fixed input {} must have min == max == default",
                    self.name
                )));
            }
            if !self.distribution.is_uniform() {
                return Err(CoreError::invariant(format!(
                    "fixed input {} cannot carry a distribution",
                    self.name
                )));
            }
            return Ok(());
        }
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(CoreError::invariant(format!(
                "input {} has invalid bounds [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        self.distribution.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_constructor_satisfies_invariant() {
        let v = Variable::fixed("flow.T", 300.0);
        assert!(v.is_fixed());
        assert_eq!((v.min, v.max, v.default), (300.0, 300.0, 300.0));
        v.validate().unwrap();
    }

    #[test]
    fn fixed_with_distribution_is_rejected() {
        let v = Variable::fixed("x", 1.0).with_distribution(Distribution::Exponential { lambda: 1.0 });
        assert!(matches!(v.validate(), Err(CoreError::Invariant { .. })));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(Variable::input("x", 2.0, 1.0).validate().is_err());
    }

    #[test]
    fn short_name_strips_node() {
        assert_eq!(Variable::output("node1.y").short_name(), "y");
        assert_eq!(Variable::output("y").short_name(), "y");
    }
}
