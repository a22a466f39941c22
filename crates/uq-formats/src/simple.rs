//! Simple sample tables: a `nSamples nInputs [nOutputs]` header followed by
//! one whitespace-separated row per sample, optionally prefixed by a 1-based
//! row number. `#` and `%` comments and `PSUADE_BEGIN`/`PSUADE_END` markers
//! are ignored.

use crate::{FormatResult, parse_error};
use std::fmt::Write;
use std::path::Path;
use uq_core::{Ensemble, sci};

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleSample {
    pub inputs: Vec<Vec<f64>>,
    /// Empty rows when the header declares no outputs.
    pub outputs: Vec<Vec<f64>>,
    pub n_outputs: usize,
}

impl SimpleSample {
    pub fn n_samples(&self) -> usize {
        self.inputs.len()
    }

    /// Variable-input columns of an ensemble, as written for candidate and prior sets.
    pub fn from_ensemble_inputs(ensemble: &Ensemble) -> Self {
        let variable = ensemble.variable_input_indices();
        let inputs = ensemble
            .input_data()
            .iter()
            .map(|row| variable.iter().map(|&i| row[i]).collect())
            .collect::<Vec<Vec<f64>>>();
        let outputs = vec![Vec::new(); inputs.len()];
        Self {
            inputs,
            outputs,
            n_outputs: 0,
        }
    }
}

pub fn parse_simple(text: &str, has_row_numbers: bool) -> FormatResult<SimpleSample> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.split(['#', '%']).next().unwrap_or("").trim()))
        .filter(|(_, l)| !l.is_empty())
        .filter(|(_, l)| !l.starts_with("PSUADE_BEGIN") && !l.starts_with("PSUADE_END"));

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| parse_error(1, "empty sample file"))?;
    let counts: Vec<usize> = header
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| parse_error(header_line, "header must be integer counts"))?;
    let (n_samples, n_inputs, n_outputs) = match counts.as_slice() {
        [s, i] => (*s, *i, 0),
        [s, i, o] => (*s, *i, *o),
        _ => return Err(parse_error(header_line, "expected nSamples nInputs [nOutputs]")),
    };

    let offset = usize::from(has_row_numbers);
    let width = offset + n_inputs + n_outputs;
    let mut inputs = Vec::with_capacity(n_samples);
    let mut outputs = Vec::with_capacity(n_samples);
    for (line_no, line) in lines {
        let values: Vec<f64> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| parse_error(line_no, "non-numeric value"))?;
        if values.len() != width {
            return Err(parse_error(
                line_no,
                format!("expected {} columns, found {}", width, values.len()),
            ));
        }
        inputs.push(values[offset..offset + n_inputs].to_vec());
        outputs.push(values[offset + n_inputs..].to_vec());
    }
    if inputs.len() != n_samples {
        return Err(parse_error(
            header_line,
            format!("header declares {} samples, found {}", n_samples, inputs.len()),
        ));
    }
    Ok(SimpleSample {
        inputs,
        outputs,
        n_outputs,
    })
}

pub fn read_simple(path: &Path, has_row_numbers: bool) -> FormatResult<SimpleSample> {
    parse_simple(&std::fs::read_to_string(path)?, has_row_numbers)
}

/// Render with `%1.18e` values; `row_numbers` prefixes each row with its 1-based index.
pub fn render_simple(sample: &SimpleSample, row_numbers: bool) -> FormatResult<String> {
    let mut out = String::new();
    let n_inputs = sample.inputs.first().map_or(0, Vec::len);
    if sample.n_outputs > 0 {
        writeln!(out, "{} {} {}", sample.n_samples(), n_inputs, sample.n_outputs)?;
    } else {
        writeln!(out, "{} {}", sample.n_samples(), n_inputs)?;
    }
    for (i, (ins, outs)) in sample.inputs.iter().zip(&sample.outputs).enumerate() {
        let mut fields: Vec<String> = Vec::with_capacity(ins.len() + outs.len() + 1);
        if row_numbers {
            fields.push((i + 1).to_string());
        }
        fields.extend(ins.iter().chain(outs).map(|v| sci(*v, 18)));
        writeln!(out, "{}", fields.join(" "))?;
    }
    Ok(out)
}

pub fn write_simple(path: &Path, sample: &SimpleSample, row_numbers: bool) -> FormatResult<()> {
    std::fs::write(path, render_simple(sample, row_numbers)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_markers() {
        let text = "# candidate set\nPSUADE_BEGIN\n2 2 1\n1 0.1 0.2 5.0\n2 0.3 0.4 6.0 # last\nPSUADE_END\n";
        let s = parse_simple(text, true).unwrap();
        assert_eq!(s.inputs, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(s.outputs, vec![vec![5.0], vec![6.0]]);
    }

    #[test]
    fn rejects_short_rows_and_wrong_counts() {
        assert!(parse_simple("2 2\n0.1 0.2\n", false).is_err());
        assert!(parse_simple("1 2\n0.1\n", false).is_err());
    }

    #[test]
    fn renders_row_numbers_and_wide_precision() {
        let s = SimpleSample {
            inputs: vec![vec![1.0, -2.0]],
            outputs: vec![vec![]],
            n_outputs: 0,
        };
        let text = render_simple(&s, true).unwrap();
        assert_eq!(text, "1 2\n1 1.000000000000000000e+00 -2.000000000000000000e+00\n");
        assert_eq!(parse_simple(&text, true).unwrap().inputs, s.inputs);
    }
}
