//! Index files pin selected variable inputs at constant values during mixed
//! aleatory-epistemic analysis and calibration.

use crate::FormatResult;
use std::fmt::Write;
use std::path::Path;

/// A variable input (1-based among variable inputs) held at `value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedEntry {
    pub index: usize,
    pub value: f64,
}

pub fn render_index_file(n_variable_inputs: usize, entries: &[FixedEntry]) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "{}", n_variable_inputs)?;
    for entry in entries {
        writeln!(out, "{} 0 {:.6}", entry.index, entry.value)?;
    }
    Ok(out)
}

/// Calibration form: every variable input gets a line, `k k 0` when it
/// varies and `k 0 <value>` when pinned.
pub fn render_full_index_file(
    n_variable_inputs: usize,
    entries: &[FixedEntry],
) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "{}", n_variable_inputs)?;
    for k in 1..=n_variable_inputs {
        match entries.iter().find(|e| e.index == k) {
            Some(entry) => writeln!(out, "{} 0 {:.6}", k, entry.value)?,
            None => writeln!(out, "{} {} 0", k, k)?,
        }
    }
    Ok(out)
}

pub fn write_full_index_file(
    path: &Path,
    n_variable_inputs: usize,
    entries: &[FixedEntry],
) -> FormatResult<()> {
    std::fs::write(path, render_full_index_file(n_variable_inputs, entries)?)?;
    Ok(())
}

pub fn write_index_file(
    path: &Path,
    n_variable_inputs: usize,
    entries: &[FixedEntry],
) -> FormatResult<()> {
    std::fs::write(path, render_index_file(n_variable_inputs, entries)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_count_then_entries() {
        let text = render_index_file(3, &[FixedEntry { index: 2, value: 0.5 }]).unwrap();
        assert_eq!(text, "3\n2 0 0.500000\n");
    }

    #[test]
    fn full_form_lists_every_input() {
        let text = render_full_index_file(3, &[FixedEntry { index: 2, value: 0.25 }]).unwrap();
        assert_eq!(text, "3\n1 1 0\n2 0 0.250000\n3 3 0\n");
    }
}
