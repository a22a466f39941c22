//! The in-memory sample set.
//!
//! An [`Ensemble`] owns the variable definitions, the input and output
//! matrices (one row per sample), and per-row run bookkeeping. Output cells
//! that have not been computed hold `f64::NAN`.
//!
//! Row-count invariant: input data, output data, run state and failure
//! diagnostics always have the same length. Every mutator checks it.
//!
//! Run-state invariant: a row without a failure is "attempted" iff none of its
//! outputs is NaN. A failed row is always attempted and carries its
//! [`SampleFailure`].

use crate::error::{CoreError, CoreResult};
use crate::sampling::SamplingMethod;
use crate::surface::FittedSurface;
use crate::variable::{Role, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;

/// Where the outputs of an ensemble come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Backend {
    #[default]
    Local,
    Grid,
    Emulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStatus {
    NeedToCalculate,
    Calculated,
}

/// Emulator backend configuration: a training ensemble and which outputs to fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorSetup {
    pub training_file: PathBuf,
    pub output_status: Vec<OutputStatus>,
}

/// Diagnostic attached to a sample whose evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFailure {
    pub code: i32,
    pub message: String,
}

impl SampleFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Driver programs named in the APPLICATION block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drivers {
    pub driver: Option<String>,
    pub opt_driver: Option<String>,
    pub ensemble_opt_driver: Option<String>,
    pub aux_opt_driver: Option<String>,
}

/// Serializable summary of an ensemble; carries no NaN-bearing matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleMetadata {
    pub id: Uuid,
    pub name: String,
    pub inputs: Vec<Variable>,
    pub output_names: Vec<String>,
    pub n_samples: usize,
    pub n_unfinished: usize,
    pub n_failed: usize,
    pub sampling: SamplingMethod,
    pub surface: Option<FittedSurface>,
    pub backend: Backend,
    pub names_include_nodes: bool,
}

#[derive(Debug, Clone)]
pub struct Ensemble {
    pub id: Uuid,
    pub name: String,
    inputs: Vec<Variable>,
    outputs: Vec<Variable>,
    input_data: Vec<Vec<f64>>,
    output_data: Vec<Vec<f64>>,
    run_state: Vec<bool>,
    failures: Vec<Option<SampleFailure>>,
    /// Variable names are `node.variable` paths.
    pub names_include_nodes: bool,
    pub sampling: SamplingMethod,
    pub surface: Option<FittedSurface>,
    pub backend: Backend,
    pub emulator: Option<EmulatorSetup>,
    pub drivers: Drivers,
    pub random_seed: Option<u64>,
}

impl Ensemble {
    /// An empty ensemble over the given variables.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Variable>,
        outputs: Vec<Variable>,
    ) -> CoreResult<Self> {
        for v in &inputs {
            if v.role != Role::Input {
                return Err(CoreError::invariant(format!("{} is not an input", v.name)));
            }
            v.validate()?;
        }
        for v in &outputs {
            if v.role != Role::Output {
                return Err(CoreError::invariant(format!("{} is not an output", v.name)));
            }
            v.validate()?;
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            inputs,
            outputs,
            input_data: Vec::new(),
            output_data: Vec::new(),
            run_state: Vec::new(),
            failures: Vec::new(),
            names_include_nodes: false,
            sampling: SamplingMethod::default(),
            surface: None,
            backend: Backend::default(),
            emulator: None,
            drivers: Drivers::default(),
            random_seed: None,
        })
    }

    /// Replace the sample rows; every output starts out uncomputed.
    pub fn with_samples(mut self, input_rows: Vec<Vec<f64>>) -> CoreResult<Self> {
        let n = input_rows.len();
        let outputs = vec![vec![f64::NAN; self.outputs.len()]; n];
        self.set_data(input_rows, outputs, vec![None; n])?;
        Ok(self)
    }

    /// Install complete data. Run state is derived from the outputs and failures.
    pub fn set_data(
        &mut self,
        input_data: Vec<Vec<f64>>,
        output_data: Vec<Vec<f64>>,
        failures: Vec<Option<SampleFailure>>,
    ) -> CoreResult<()> {
        let n = input_data.len();
        check_len("output rows", n, output_data.len())?;
        check_len("failure rows", n, failures.len())?;
        for row in &input_data {
            check_len("input row width", self.inputs.len(), row.len())?;
        }
        for row in &output_data {
            check_len("output row width", self.outputs.len(), row.len())?;
        }
        self.run_state = output_data
            .iter()
            .zip(&failures)
            .map(|(row, failure)| failure.is_some() || row_complete(row))
            .collect();
        self.input_data = input_data;
        self.output_data = output_data;
        self.failures = failures;
        Ok(())
    }

    // ---- Accessors ----

    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Variable] {
        &self.outputs
    }

    pub fn input_data(&self) -> &[Vec<f64>] {
        &self.input_data
    }

    pub fn output_data(&self) -> &[Vec<f64>] {
        &self.output_data
    }

    pub fn run_state(&self) -> &[bool] {
        &self.run_state
    }

    pub fn failures(&self) -> &[Option<SampleFailure>] {
        &self.failures
    }

    pub fn failure(&self, row: usize) -> Option<&SampleFailure> {
        self.failures.get(row).and_then(|f| f.as_ref())
    }

    pub fn n_samples(&self) -> usize {
        self.input_data.len()
    }

    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|v| v.name.as_str()).collect()
    }

    /// Indices (into `inputs`) of the sampled, non-fixed inputs.
    pub fn variable_input_indices(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_fixed())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn n_variable_inputs(&self) -> usize {
        self.inputs.iter().filter(|v| !v.is_fixed()).count()
    }

    /// `(input index, value)` for every fixed input.
    pub fn fixed_values(&self) -> Vec<(usize, f64)> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_fixed())
            .map(|(i, v)| (i, v.default))
            .collect()
    }

    pub fn output_index(&self, name: &str) -> CoreResult<usize> {
        self.outputs
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| CoreError::UnknownName {
                what: "output",
                name: name.to_string(),
            })
    }

    pub fn unfinished_count(&self) -> usize {
        self.run_state.iter().filter(|done| !**done).count()
    }

    pub fn unfinished_rows(&self) -> Vec<usize> {
        self.run_state
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn failed_rows(&self) -> Vec<usize> {
        self.failures
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    // ---- Mutators ----

    pub fn set_input_variable(&mut self, index: usize, variable: Variable) -> CoreResult<()> {
        let len = self.inputs.len();
        let slot = self.inputs.get_mut(index).ok_or(CoreError::IndexOob {
            what: "input",
            index,
            len,
        })?;
        if variable.role != Role::Input || variable.is_fixed() != slot.is_fixed() {
            return Err(CoreError::invariant(format!(
                "replacement for input {} changes its role or kind",
                slot.name
            )));
        }
        variable.validate()?;
        *slot = variable;
        Ok(())
    }

    /// Store computed outputs for one row and clear any earlier failure.
    pub fn set_row_outputs(&mut self, row: usize, values: &[f64]) -> CoreResult<()> {
        self.check_row(row)?;
        check_len("output row width", self.outputs.len(), values.len())?;
        self.output_data[row].copy_from_slice(values);
        self.failures[row] = None;
        self.run_state[row] = row_complete(values);
        Ok(())
    }

    /// Record a per-sample failure; the row counts as attempted from now on.
    pub fn mark_failed(&mut self, row: usize, failure: SampleFailure) -> CoreResult<()> {
        self.check_row(row)?;
        self.failures[row] = Some(failure);
        self.run_state[row] = true;
        Ok(())
    }

    /// Overwrite one output column (emulator fill). Failed rows keep their diagnostic.
    pub fn set_output_column(&mut self, column: usize, values: &[f64]) -> CoreResult<()> {
        if column >= self.outputs.len() {
            return Err(CoreError::IndexOob {
                what: "output column",
                index: column,
                len: self.outputs.len(),
            });
        }
        check_len("output column", self.n_samples(), values.len())?;
        for (row, value) in values.iter().enumerate() {
            self.output_data[row][column] = *value;
            if self.failures[row].is_none() {
                self.run_state[row] = row_complete(&self.output_data[row]);
            }
        }
        Ok(())
    }

    /// Forget all results: outputs back to NaN, no failures.
    pub fn clear_run_state(&mut self) {
        for row in &mut self.output_data {
            row.fill(f64::NAN);
        }
        self.failures.fill(None);
        self.run_state.fill(false);
    }

    /// Mark every unattempted row failed with `failure`. Returns how many rows changed.
    pub fn resolve_pending_as_failed(&mut self, failure: &SampleFailure) -> usize {
        let pending = self.unfinished_rows();
        for &row in &pending {
            self.failures[row] = Some(failure.clone());
            self.run_state[row] = true;
        }
        pending.len()
    }

    pub fn mark_output_calculated(&mut self, column: usize) {
        if let Some(status) = self
            .emulator
            .as_mut()
            .and_then(|e| e.output_status.get_mut(column))
        {
            *status = OutputStatus::Calculated;
        }
    }

    // ---- Derived ensembles (the receiver is never modified) ----

    /// Rows that were attempted, did not fail, and have every output.
    pub fn valid_rows(&self) -> Ensemble {
        let keep: Vec<usize> = (0..self.n_samples())
            .filter(|&r| {
                self.run_state[r] && self.failures[r].is_none() && row_complete(&self.output_data[r])
            })
            .collect();
        self.pick_rows(&keep)
    }

    /// A new ensemble with the given rows, in the given order.
    pub fn sub_ensemble(&self, rows: &[usize]) -> CoreResult<Ensemble> {
        for &r in rows {
            self.check_row(r)?;
        }
        Ok(self.pick_rows(rows))
    }

    /// A new ensemble without the given input columns.
    pub fn delete_inputs(&self, indices: &[usize]) -> CoreResult<Ensemble> {
        let drop = self.index_set("input", indices, self.inputs.len())?;
        let mut out = self.clone();
        out.id = Uuid::new_v4();
        out.inputs = filter_indexed(&self.inputs, &drop);
        out.input_data = self
            .input_data
            .iter()
            .map(|row| filter_indexed(row, &drop))
            .collect();
        Ok(out)
    }

    /// A new ensemble without the given output columns.
    pub fn delete_outputs(&self, indices: &[usize]) -> CoreResult<Ensemble> {
        let drop = self.index_set("output", indices, self.outputs.len())?;
        let mut out = self.clone();
        out.id = Uuid::new_v4();
        out.outputs = filter_indexed(&self.outputs, &drop);
        let outputs: Vec<Vec<f64>> = self
            .output_data
            .iter()
            .map(|row| filter_indexed(row, &drop))
            .collect();
        if let Some(emu) = out.emulator.as_mut() {
            emu.output_status = filter_indexed(&emu.output_status, &drop);
        }
        out.set_data(self.input_data.clone(), outputs, self.failures.clone())?;
        Ok(out)
    }

    // ---- Checks ----

    pub fn validate(&self) -> CoreResult<()> {
        let n = self.input_data.len();
        check_len("output rows", n, self.output_data.len())?;
        check_len("run state", n, self.run_state.len())?;
        check_len("failure rows", n, self.failures.len())?;
        let fixed = self.fixed_values();
        for (r, row) in self.input_data.iter().enumerate() {
            check_len("input row width", self.inputs.len(), row.len())?;
            for &(i, value) in &fixed {
                if row[i] != value {
                    return Err(CoreError::invariant(format!(
                        "row {} holds {} for fixed input {} (expected {})",
                        r, row[i], self.inputs[i].name, value
                    )));
                }
            }
        }
        for (r, row) in self.output_data.iter().enumerate() {
            check_len("output row width", self.outputs.len(), row.len())?;
            let expected = self.failures[r].is_some() || row_complete(row);
            if self.run_state[r] != expected {
                return Err(CoreError::invariant(format!(
                    "run state of row {} disagrees with its outputs",
                    r
                )));
            }
        }
        if let Some(emu) = &self.emulator {
            check_len("emulator output status", self.outputs.len(), emu.output_status.len())?;
        }
        Ok(())
    }

    pub fn metadata(&self) -> EnsembleMetadata {
        EnsembleMetadata {
            id: self.id,
            name: self.name.clone(),
            inputs: self.inputs.clone(),
            output_names: self.outputs.iter().map(|v| v.name.clone()).collect(),
            n_samples: self.n_samples(),
            n_unfinished: self.unfinished_count(),
            n_failed: self.failed_rows().len(),
            sampling: self.sampling,
            surface: self.surface,
            backend: self.backend,
            names_include_nodes: self.names_include_nodes,
        }
    }

    fn check_row(&self, row: usize) -> CoreResult<()> {
        if row >= self.n_samples() {
            return Err(CoreError::IndexOob {
                what: "sample row",
                index: row,
                len: self.n_samples(),
            });
        }
        Ok(())
    }

    fn index_set(&self, what: &'static str, indices: &[usize], len: usize) -> CoreResult<BTreeSet<usize>> {
        indices
            .iter()
            .map(|&i| {
                if i < len {
                    Ok(i)
                } else {
                    Err(CoreError::IndexOob { what, index: i, len })
                }
            })
            .collect()
    }

    fn pick_rows(&self, rows: &[usize]) -> Ensemble {
        let mut out = self.clone();
        out.id = Uuid::new_v4();
        out.input_data = rows.iter().map(|&r| self.input_data[r].clone()).collect();
        out.output_data = rows.iter().map(|&r| self.output_data[r].clone()).collect();
        out.run_state = rows.iter().map(|&r| self.run_state[r]).collect();
        out.failures = rows.iter().map(|&r| self.failures[r].clone()).collect();
        out
    }
}

fn row_complete(row: &[f64]) -> bool {
    !row.iter().any(|v| v.is_nan())
}

fn check_len(what: &'static str, expected: usize, found: usize) -> CoreResult<()> {
    if expected != found {
        return Err(CoreError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn filter_indexed<T: Clone>(items: &[T], drop: &BTreeSet<usize>) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, v)| v.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ensemble {
        let inputs = vec![
            Variable::input("x1", 0.0, 1.0),
            Variable::fixed("x2", 5.0),
            Variable::input("x3", -1.0, 1.0),
        ];
        let outputs = vec![Variable::output("y1"), Variable::output("y2")];
        Ensemble::new("demo", inputs, outputs)
            .unwrap()
            .with_samples(vec![
                vec![0.1, 5.0, 0.0],
                vec![0.2, 5.0, 0.5],
                vec![0.3, 5.0, -0.5],
                vec![0.4, 5.0, 0.9],
            ])
            .unwrap()
    }

    #[test]
    fn fresh_samples_are_unfinished() {
        let e = sample();
        assert_eq!(e.n_samples(), 4);
        assert_eq!(e.unfinished_count(), 4);
        e.validate().unwrap();
    }

    #[test]
    fn run_state_follows_nan_outputs() {
        let mut e = sample();
        e.set_row_outputs(0, &[1.0, 2.0]).unwrap();
        e.set_row_outputs(1, &[1.0, f64::NAN]).unwrap();
        assert_eq!(e.run_state(), &[true, false, false, false]);
        e.validate().unwrap();
    }

    #[test]
    fn failed_rows_are_attempted() {
        let mut e = sample();
        e.mark_failed(2, SampleFailure::new(-1, "diverged")).unwrap();
        assert!(e.run_state()[2]);
        assert_eq!(e.failed_rows(), vec![2]);
        assert_eq!(e.unfinished_count(), 3);
        e.validate().unwrap();
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut e = sample();
        assert!(matches!(
            e.set_row_outputs(0, &[1.0]),
            Err(CoreError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            e.mark_failed(9, SampleFailure::new(1, "x")),
            Err(CoreError::IndexOob { .. })
        ));
    }

    #[test]
    fn derived_ensembles_leave_source_untouched() {
        let mut e = sample();
        e.set_row_outputs(0, &[1.0, 2.0]).unwrap();
        e.set_row_outputs(3, &[3.0, 4.0]).unwrap();
        e.mark_failed(1, SampleFailure::new(2, "bad")).unwrap();

        let valid = e.valid_rows();
        assert_eq!(valid.n_samples(), 2);
        assert_ne!(valid.id, e.id);
        assert_eq!(e.n_samples(), 4);

        let sub = e.sub_ensemble(&[3, 0]).unwrap();
        assert_eq!(sub.input_data()[0][0], 0.4);

        let fewer = e.delete_inputs(&[1]).unwrap();
        assert_eq!(fewer.n_inputs(), 2);
        assert_eq!(fewer.input_data()[0].len(), 2);
        assert_eq!(e.n_inputs(), 3);

        let one_out = e.delete_outputs(&[1]).unwrap();
        assert_eq!(one_out.output_names(), vec!["y1"]);
        one_out.validate().unwrap();
    }

    #[test]
    fn terminate_resolves_pending_rows() {
        let mut e = sample();
        e.set_row_outputs(0, &[1.0, 2.0]).unwrap();
        let changed = e.resolve_pending_as_failed(&SampleFailure::new(-9, "cancelled"));
        assert_eq!(changed, 3);
        assert_eq!(e.unfinished_count(), 0);
        assert_eq!(e.failed_rows(), vec![1, 2, 3]);
    }

    #[test]
    fn fixed_and_variable_indices() {
        let e = sample();
        assert_eq!(e.variable_input_indices(), vec![0, 2]);
        assert_eq!(e.fixed_values(), vec![(1, 5.0)]);
    }

    #[test]
    fn emulator_column_fill_updates_run_state() {
        let mut e = sample();
        e.backend = Backend::Emulator;
        e.emulator = Some(EmulatorSetup {
            training_file: PathBuf::from("train.dat"),
            output_status: vec![OutputStatus::NeedToCalculate, OutputStatus::NeedToCalculate],
        });
        e.set_output_column(0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(e.unfinished_count(), 4);
        e.set_output_column(1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        e.mark_output_calculated(1);
        assert_eq!(e.unfinished_count(), 0);
        assert_eq!(
            e.emulator.as_ref().unwrap().output_status[1],
            OutputStatus::Calculated
        );
    }
}
