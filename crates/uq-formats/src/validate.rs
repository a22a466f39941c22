//! Structural validation of an ensemble before it is written for the solver.

use std::collections::HashSet;
use uq_core::{CoreError, Ensemble};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Ensemble has no {what}")]
    Empty { what: String },

    #[error("Input {name} value {value} in sample {row} lies outside [{min}, {max}]")]
    OutOfBounds {
        name: String,
        row: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Inconsistent ensemble: {0}")]
    Model(#[from] CoreError),
}

pub fn validate_ensemble(ensemble: &Ensemble) -> Result<(), ValidationError> {
    ensemble.validate()?;

    if ensemble.n_inputs() == 0 {
        return Err(ValidationError::Empty {
            what: "inputs".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for v in ensemble.inputs().iter().chain(ensemble.outputs()) {
        // names are whitespace-delimited tokens in every solver file
        if v.name.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidName {
                name: v.name.clone(),
                reason: "contains whitespace".to_string(),
            });
        }
        if !seen.insert(v.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: v.name.clone(),
                context: "variables".to_string(),
            });
        }
    }

    for (row, values) in ensemble.input_data().iter().enumerate() {
        for (v, &value) in ensemble.inputs().iter().zip(values) {
            if v.is_fixed() || !v.distribution.is_uniform() {
                continue;
            }
            if !(v.min..=v.max).contains(&value) {
                return Err(ValidationError::OutOfBounds {
                    name: v.name.clone(),
                    row: row + 1,
                    value,
                    min: v.min,
                    max: v.max,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uq_core::Variable;

    #[test]
    fn duplicate_names_are_rejected() {
        let e = Ensemble::new(
            "d",
            vec![Variable::input("x", 0.0, 1.0)],
            vec![Variable::output("x")],
        )
        .unwrap();
        assert!(matches!(
            validate_ensemble(&e),
            Err(ValidationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn uniform_samples_stay_in_bounds() {
        let e = Ensemble::new("d", vec![Variable::input("x", 0.0, 1.0)], vec![Variable::output("y")])
            .unwrap()
            .with_samples(vec![vec![0.5], vec![1.5]])
            .unwrap();
        assert!(matches!(
            validate_ensemble(&e),
            Err(ValidationError::OutOfBounds { row: 2, .. })
        ));
    }
}
