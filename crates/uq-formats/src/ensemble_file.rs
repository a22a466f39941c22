//! The full ensemble file.
//!
//! Layout: an optional `# NAMESHAVENODES` marker, a `PSUADE_IO` data section
//! (one `<index> <runflag>` line per sample followed by one value per line for
//! each variable input and output), then the `PSUADE` metadata section with
//! INPUT, OUTPUT, METHOD, APPLICATION and ANALYSIS blocks.
//!
//! Fixed inputs are not part of the data rows; they are listed in the INPUT
//! block and re-inserted into every row on read. Uncomputed outputs are written
//! as the unset sentinel and read back as NaN.

use crate::{FormatResult, parse_error, validate::validate_ensemble};
use std::fmt::Write;
use std::path::Path;
use tracing::debug;
use uq_core::{
    Distribution, DistributionKind, Drivers, Ensemble, FittedSurface, SampleFailure,
    SamplingMethod, SurfaceType, UNSET_SENTINEL_TEXT, Variable, WIRE_PRECISION, parse_value,
    sci_padded,
};

pub(crate) const IO_HEADER: &str = "PSUADE_IO (Note : inputs not true inputs if pdf ~=U)";
pub(crate) const NODES_MARKER: &str = "# NAMESHAVENODES";

/// Run flag that marks a row as completed.
const FLAG_DONE: i32 = 1;

// ---- Writing ----

pub fn render_ensemble(ensemble: &Ensemble) -> FormatResult<String> {
    let mut out = String::new();
    if ensemble.names_include_nodes {
        writeln!(out, "{}", NODES_MARKER)?;
    }
    write_data_section(&mut out, ensemble)?;
    writeln!(out, "PSUADE")?;
    write_input_block(&mut out, ensemble)?;
    write_output_block(&mut out, ensemble)?;
    write_method_block(&mut out, ensemble)?;

    writeln!(out, "APPLICATION")?;
    let d = &ensemble.drivers;
    writeln!(out, "   driver = {}", driver_or_none(&d.driver))?;
    writeln!(out, "   opt_driver = {}", driver_or_none(&d.opt_driver))?;
    writeln!(out, "   ensemble_opt_driver = {}", driver_or_none(&d.ensemble_opt_driver))?;
    writeln!(out, "   aux_opt_driver = {}", driver_or_none(&d.aux_opt_driver))?;
    writeln!(out, "   max_job_wait_time = 1000000")?;
    writeln!(out, "   save_frequency = 1")?;
    writeln!(out, "END")?;

    writeln!(out, "ANALYSIS")?;
    writeln!(out, "   analyzer output_id  = 1")?;
    let surface = ensemble.surface.map(|s| s.surface).unwrap_or(SurfaceType::Mars);
    writeln!(out, "   analyzer rstype = {}", surface.solver_name())?;
    if let Some(order) = ensemble.surface.and_then(|s| s.legendre_order) {
        writeln!(out, "   analyzer rs_legendre_order = {}", order)?;
    }
    writeln!(out, "   analyzer threshold = 1.000000e+00")?;
    writeln!(out, "   diagnostics 1")?;
    writeln!(out, "END")?;
    writeln!(out, "END")?;
    Ok(out)
}

/// Write `ensemble` for the solver to load.
///
/// Run flags are written as 0 (pending) or 1 (attempted). A failed row goes
/// out as 1, so its failure code and message do not survive the file; read
/// back, it is a failure with code 1 when an output is missing and a plain
/// completed row otherwise.
pub fn write_ensemble(path: &Path, ensemble: &Ensemble) -> FormatResult<()> {
    validate_ensemble(ensemble)?;
    let content = render_ensemble(ensemble)?;
    std::fs::write(path, content)?;
    debug!(path = %path.display(), samples = ensemble.n_samples(), "wrote ensemble file");
    Ok(())
}

/// The run flag is the attempted bit only; failure diagnostics are dropped.
pub(crate) fn write_data_section(out: &mut String, ensemble: &Ensemble) -> std::fmt::Result {
    let variable = ensemble.variable_input_indices();
    writeln!(out, "{}", IO_HEADER)?;
    writeln!(
        out,
        "{} {} {}",
        variable.len(),
        ensemble.n_outputs(),
        ensemble.n_samples()
    )?;
    let rows = ensemble.input_data().iter().zip(ensemble.output_data());
    for (r, (inputs, outputs)) in rows.enumerate() {
        writeln!(out, "{} {}", r + 1, u8::from(ensemble.run_state()[r]))?;
        for &i in &variable {
            writeln!(out, "{}", sci_padded(inputs[i], WIRE_PRECISION))?;
        }
        for &v in outputs {
            if v.is_nan() {
                writeln!(out, " {}", UNSET_SENTINEL_TEXT)?;
            } else {
                writeln!(out, "{}", sci_padded(v, WIRE_PRECISION))?;
            }
        }
    }
    writeln!(out, "PSUADE_IO")
}

pub(crate) fn write_input_block(out: &mut String, ensemble: &Ensemble) -> std::fmt::Result {
    let n_variable = ensemble.n_variable_inputs();
    let n_fixed = ensemble.n_inputs() - n_variable;
    writeln!(out, "INPUT")?;
    if n_fixed > 0 {
        writeln!(out, "   num_fixed {}", n_fixed)?;
    }
    writeln!(out, "   dimension = {}", n_variable)?;
    let mut variable_k = 1;
    let mut fixed_k = 1;
    for v in ensemble.inputs() {
        if v.is_fixed() {
            writeln!(
                out,
                "   fixed {} {} = {}",
                fixed_k,
                v.name,
                sci_padded(v.default, WIRE_PRECISION)
            )?;
            fixed_k += 1;
        } else {
            writeln!(
                out,
                "   variable {} {}  =  {}  {}",
                variable_k,
                v.name,
                sci_padded(v.min, WIRE_PRECISION),
                sci_padded(v.max, WIRE_PRECISION)
            )?;
            write_pdf_line(out, variable_k, &v.distribution)?;
            variable_k += 1;
        }
    }
    writeln!(out, "END")
}

/// `PDF <k> <code> ...` where `k` counts variable inputs only.
fn write_pdf_line(out: &mut String, k: usize, dist: &Distribution) -> std::fmt::Result {
    match dist {
        Distribution::Uniform => Ok(()),
        Distribution::Sample { file, column } => {
            writeln!(out, "   PDF {} S {} {}", k, file.display(), column)
        }
        other => {
            write!(out, "   PDF {} {}", k, other.kind().code())?;
            let (p1, p2) = other.parameters();
            for p in [p1, p2].into_iter().flatten() {
                write!(out, " {}", sci_padded(p, WIRE_PRECISION))?;
            }
            writeln!(out)
        }
    }
}

pub(crate) fn write_output_block(out: &mut String, ensemble: &Ensemble) -> std::fmt::Result {
    writeln!(out, "OUTPUT")?;
    writeln!(out, "   dimension = {}", ensemble.n_outputs())?;
    for (i, v) in ensemble.outputs().iter().enumerate() {
        writeln!(out, "   variable {} {}", i + 1, v.name)?;
    }
    writeln!(out, "END")
}

pub(crate) fn write_method_block(out: &mut String, ensemble: &Ensemble) -> std::fmt::Result {
    writeln!(out, "METHOD")?;
    writeln!(out, "   sampling = {}", ensemble.sampling.solver_name())?;
    writeln!(out, "   num_samples = {}", ensemble.n_samples())?;
    writeln!(out, "   num_replications = 1")?;
    writeln!(out, "   num_refinements = 0")?;
    writeln!(out, "   refinement_size = 10000000")?;
    writeln!(out, "   reference_num_refinements = 0")?;
    if let Some(seed) = ensemble.random_seed {
        writeln!(out, "   random_seed = {}", seed)?;
    }
    writeln!(out, "END")
}

fn driver_or_none(driver: &Option<String>) -> &str {
    driver.as_deref().unwrap_or("NONE")
}

// ---- Reading ----

#[derive(Default)]
struct DataSection {
    n_variable: usize,
    n_outputs: usize,
    /// `(run flag, variable input values, output values)` per sample.
    rows: Vec<Option<(i32, Vec<f64>, Vec<f64>)>>,
}

struct PendingSample {
    row: usize,
    flag: i32,
    values: Vec<f64>,
}

#[derive(Default)]
struct Parsed {
    names_include_nodes: bool,
    data: Option<DataSection>,
    inputs: Vec<Variable>,
    /// Indexed by variable-input position.
    pdfs: Vec<(usize, Distribution)>,
    outputs: Vec<Variable>,
    sampling: Option<SamplingMethod>,
    drivers: Drivers,
    surface: Option<SurfaceType>,
    legendre_order: Option<u32>,
    random_seed: Option<u64>,
}

/// Parse ensemble file text. `name` becomes the ensemble's name.
pub fn parse_ensemble(text: &str, name: &str) -> FormatResult<Ensemble> {
    let mut parsed = Parsed::default();
    let mut in_data = false;
    let mut in_inputs = false;
    let mut in_outputs = false;
    let mut pending: Option<PendingSample> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if line.contains("NAMESHAVENODES") {
                parsed.names_include_nodes = true;
            }
            continue;
        }
        if line.starts_with("PSUADE_IO") {
            if in_data {
                if pending.is_some() {
                    return Err(parse_error(line_no, "data section ends inside a sample"));
                }
            } else if parsed.data.is_some() {
                return Err(parse_error(line_no, "more than one data section"));
            }
            in_data = !in_data;
            continue;
        }
        if in_data {
            read_data_line(&mut parsed, &mut pending, line, line_no)?;
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens[0] {
            "INPUT" => in_inputs = true,
            "OUTPUT" => in_outputs = true,
            "END" => {
                in_inputs = false;
                in_outputs = false;
            }
            _ if in_inputs => read_input_line(&mut parsed, &tokens, line_no)?,
            _ if in_outputs => {
                if tokens[0] == "variable" {
                    let name = token(&tokens, 2, line_no)?;
                    parsed.outputs.push(Variable::output(name));
                }
            }
            _ => read_setting_line(&mut parsed, &tokens, line_no)?,
        }
    }
    if in_data {
        return Err(parse_error(text.lines().count(), "unterminated data section"));
    }
    assemble(parsed, name)
}

fn read_data_line(
    parsed: &mut Parsed,
    pending: &mut Option<PendingSample>,
    line: &str,
    line_no: usize,
) -> FormatResult<()> {
    if parsed.data.is_none() {
        let nums = parse_counts(line, line_no, 3)?;
        parsed.data = Some(DataSection {
            n_variable: nums[0],
            n_outputs: nums[1],
            rows: vec![None; nums[2]],
        });
        return Ok(());
    }
    let Some(data) = parsed.data.as_mut() else {
        return Ok(());
    };
    let width = data.n_variable + data.n_outputs;
    match pending.take() {
        None => {
            let mut it = line.split_whitespace();
            let index: usize = it
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| parse_error(line_no, "expected sample index"))?;
            let flag: i32 = it
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| parse_error(line_no, "expected run flag"))?;
            if index == 0 || index > data.rows.len() {
                return Err(parse_error(
                    line_no,
                    format!("sample index {} outside 1..={}", index, data.rows.len()),
                ));
            }
            let sample = PendingSample {
                row: index - 1,
                flag,
                values: Vec::with_capacity(width),
            };
            if width == 0 {
                data.rows[sample.row] = Some((flag, Vec::new(), Vec::new()));
            } else {
                *pending = Some(sample);
            }
        }
        Some(mut sample) => {
            let value = parse_value(line)
                .ok_or_else(|| parse_error(line_no, format!("invalid number {:?}", line)))?;
            sample.values.push(value);
            if sample.values.len() == width {
                let outputs = sample.values.split_off(data.n_variable);
                data.rows[sample.row] = Some((sample.flag, sample.values, outputs));
            } else {
                *pending = Some(sample);
            }
        }
    }
    Ok(())
}

fn read_input_line(parsed: &mut Parsed, tokens: &[&str], line_no: usize) -> FormatResult<()> {
    match tokens[0] {
        // variable <k> <name> = <lb> <ub>
        "variable" => {
            let name = token(tokens, 2, line_no)?;
            let min = number(tokens, 4, line_no)?;
            let max = number(tokens, 5, line_no)?;
            parsed.inputs.push(Variable::input(name, min, max));
        }
        // fixed <k> <name> = <value>
        "fixed" => {
            let name = token(tokens, 2, line_no)?;
            let value = number(tokens, 4, line_no)?;
            parsed.inputs.push(Variable::fixed(name, value));
        }
        // PDF <k> <code> [p1 [p2]] | PDF <k> S <file> <column>
        "PDF" => {
            let k: usize = token(tokens, 1, line_no)?
                .parse()
                .map_err(|_| parse_error(line_no, "PDF index is not an integer"))?;
            let kind = DistributionKind::from_name(token(tokens, 2, line_no)?)
                .map_err(|e| parse_error(line_no, e.to_string()))?;
            let dist = if kind == DistributionKind::Sample {
                let file = token(tokens, 3, line_no)?;
                let column = token(tokens, 4, line_no)?
                    .parse()
                    .map_err(|_| parse_error(line_no, "sample column is not an integer"))?;
                Distribution::Sample {
                    file: file.into(),
                    column,
                }
            } else {
                let p1 = tokens.get(3).map(|_| number(tokens, 3, line_no)).transpose()?;
                let p2 = tokens.get(4).map(|_| number(tokens, 4, line_no)).transpose()?;
                Distribution::from_parameters(kind, p1, p2)
                    .map_err(|e| parse_error(line_no, e.to_string()))?
            };
            if k == 0 {
                return Err(parse_error(line_no, "PDF index is 1-based"));
            }
            parsed.pdfs.push((k - 1, dist));
        }
        _ => {}
    }
    Ok(())
}

fn read_setting_line(parsed: &mut Parsed, tokens: &[&str], line_no: usize) -> FormatResult<()> {
    let driver = |tokens: &[&str]| -> FormatResult<Option<String>> {
        let value = token(tokens, 2, line_no)?;
        Ok((value != "NONE").then(|| value.to_string()))
    };
    match tokens[0] {
        "sampling" => {
            let method = SamplingMethod::from_name(token(tokens, 2, line_no)?)
                .map_err(|e| parse_error(line_no, e.to_string()))?;
            parsed.sampling = Some(method);
        }
        "driver" => parsed.drivers.driver = driver(tokens)?,
        "opt_driver" => parsed.drivers.opt_driver = driver(tokens)?,
        "ensemble_opt_driver" => parsed.drivers.ensemble_opt_driver = driver(tokens)?,
        "aux_opt_driver" => parsed.drivers.aux_opt_driver = driver(tokens)?,
        "random_seed" => {
            parsed.random_seed = token(tokens, 2, line_no)?.parse().ok();
        }
        "analyzer" if tokens.len() > 3 => match tokens[1] {
            "rstype" => {
                let surface = SurfaceType::from_name(tokens[3])
                    .map_err(|e| parse_error(line_no, e.to_string()))?;
                parsed.surface = Some(surface);
            }
            "rs_legendre_order" => {
                let order = tokens[3]
                    .parse()
                    .map_err(|_| parse_error(line_no, "Legendre order is not an integer"))?;
                parsed.legendre_order = Some(order);
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

fn assemble(parsed: Parsed, name: &str) -> FormatResult<Ensemble> {
    let Parsed {
        names_include_nodes,
        data,
        mut inputs,
        pdfs,
        outputs,
        sampling,
        drivers,
        surface,
        legendre_order,
        random_seed,
    } = parsed;

    let variable_positions: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_fixed())
        .map(|(i, _)| i)
        .collect();
    for (k, dist) in pdfs {
        let &pos = variable_positions.get(k).ok_or_else(|| {
            parse_error(0, format!("PDF refers to variable input {} of {}", k + 1, variable_positions.len()))
        })?;
        inputs[pos].distribution = dist;
    }

    let fixed: Vec<(usize, f64)> = inputs
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_fixed())
        .map(|(i, v)| (i, v.default))
        .collect();
    let n_inputs = inputs.len();
    let n_outputs = outputs.len();

    let mut ensemble = Ensemble::new(name, inputs, outputs)?;
    ensemble.names_include_nodes = names_include_nodes;
    ensemble.sampling = sampling.unwrap_or_default();
    ensemble.drivers = drivers;
    ensemble.random_seed = random_seed;
    ensemble.surface = surface.map(|surface| FittedSurface {
        surface,
        legendre_order,
    });

    let Some(data) = data else {
        return Ok(ensemble);
    };
    if data.n_variable != variable_positions.len() {
        return Err(parse_error(
            0,
            format!(
                "data section has {} variable inputs, INPUT block declares {}",
                data.n_variable,
                variable_positions.len()
            ),
        ));
    }
    if data.n_outputs != n_outputs {
        return Err(parse_error(
            0,
            format!(
                "data section has {} outputs, OUTPUT block declares {}",
                data.n_outputs, n_outputs
            ),
        ));
    }

    let n = data.rows.len();
    let mut input_data = Vec::with_capacity(n);
    let mut output_data = Vec::with_capacity(n);
    let mut failures = Vec::with_capacity(n);
    for (r, row) in data.rows.into_iter().enumerate() {
        let (flag, values, outs) =
            row.ok_or_else(|| parse_error(0, format!("sample {} is missing", r + 1)))?;
        let mut full = vec![0.0; n_inputs];
        for (&pos, value) in variable_positions.iter().zip(values) {
            full[pos] = value;
        }
        for &(pos, value) in &fixed {
            full[pos] = value;
        }
        failures.push(failure_for_flag(flag, &outs));
        input_data.push(full);
        output_data.push(outs);
    }
    ensemble.set_data(input_data, output_data, failures)?;
    Ok(ensemble)
}

/// Flag 0 is pending, 1 is done; anything else (or done without outputs) is a failure.
pub(crate) fn failure_for_flag(flag: i32, outputs: &[f64]) -> Option<SampleFailure> {
    match flag {
        0 => None,
        FLAG_DONE if outputs.iter().any(|v| v.is_nan()) => Some(SampleFailure::new(
            FLAG_DONE,
            "sample reported done without all outputs",
        )),
        FLAG_DONE => None,
        other => Some(SampleFailure::new(
            other,
            format!("sample finished with run flag {}", other),
        )),
    }
}

/// Read an ensemble file. Relative driver paths that exist next to the file are resolved.
pub fn read_ensemble(path: &Path) -> FormatResult<Ensemble> {
    let content = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut ensemble = parse_ensemble(&content, &name)?;
    if let Some(dir) = path.parent() {
        let d = &mut ensemble.drivers;
        for slot in [
            &mut d.driver,
            &mut d.opt_driver,
            &mut d.ensemble_opt_driver,
            &mut d.aux_opt_driver,
        ] {
            resolve_driver(slot, dir);
        }
    }
    debug!(path = %path.display(), samples = ensemble.n_samples(), "read ensemble file");
    Ok(ensemble)
}

fn resolve_driver(slot: &mut Option<String>, dir: &Path) {
    if let Some(driver) = slot.as_ref() {
        if driver == "PSUADE_LOCAL" || Path::new(driver).exists() {
            return;
        }
        let sibling = dir.join(driver);
        if sibling.exists() {
            *slot = Some(sibling.to_string_lossy().into_owned());
        }
    }
}

fn parse_counts(line: &str, line_no: usize, n: usize) -> FormatResult<Vec<usize>> {
    let nums: Vec<usize> = line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| parse_error(line_no, "expected integer counts"))?;
    if nums.len() < n {
        return Err(parse_error(line_no, format!("expected {} counts", n)));
    }
    Ok(nums)
}

fn token<'a>(tokens: &[&'a str], i: usize, line_no: usize) -> FormatResult<&'a str> {
    tokens
        .get(i)
        .copied()
        .ok_or_else(|| parse_error(line_no, format!("missing field {}", i + 1)))
}

fn number(tokens: &[&str], i: usize, line_no: usize) -> FormatResult<f64> {
    let t = token(tokens, i, line_no)?;
    parse_value(t).ok_or_else(|| parse_error(line_no, format!("invalid number {:?}", t)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Ensemble {
        let inputs = vec![
            Variable::input("x1", 0.0, 1.0).with_distribution(Distribution::Normal {
                mean: 0.5,
                std_dev: 0.25,
            }),
            Variable::fixed("x2", 2.5),
            Variable::input("x3", -1.0, 1.0),
        ];
        let outputs = vec![Variable::output("y")];
        let mut e = Ensemble::new("demo", inputs, outputs)
            .unwrap()
            .with_samples(vec![vec![0.25, 2.5, 0.0], vec![0.75, 2.5, -0.5]])
            .unwrap();
        e.set_row_outputs(0, &[3.0]).unwrap();
        e
    }

    #[test]
    fn writes_fixed_inputs_only_in_metadata() {
        let text = render_ensemble(&demo()).unwrap();
        assert!(text.starts_with(IO_HEADER));
        assert!(text.contains("2 1 2\n"));
        assert!(text.contains("   num_fixed 1\n"));
        assert!(text.contains("   fixed 1 x2 =  2.5000000000000000e+00\n"));
        assert!(text.contains("   PDF 1 N  5.0000000000000000e-01  2.5000000000000000e-01\n"));
        assert!(text.contains("2 0\n 7.5000000000000000e-01\n-5.0000000000000000e-01\n 9.9999999999999997e+34\n"));
        assert!(text.contains("   driver = NONE\n"));
    }

    #[test]
    fn round_trip_restores_fixed_values_and_nan() {
        let e = demo();
        let back = parse_ensemble(&render_ensemble(&e).unwrap(), "demo").unwrap();
        assert_eq!(back.n_samples(), 2);
        assert_eq!(back.input_names(), vec!["x1", "x2", "x3"]);
        assert_eq!(back.input_data()[1], vec![0.75, 2.5, -0.5]);
        assert!(back.output_data()[1][0].is_nan());
        assert_eq!(back.run_state(), &[true, false]);
        assert_eq!(back.inputs()[0].distribution, e.inputs()[0].distribution);
        back.validate().unwrap();
    }

    #[test]
    fn failed_rows_are_written_as_attempted() {
        let mut e = demo();
        e.mark_failed(1, SampleFailure::new(7, "diverged")).unwrap();
        let text = render_ensemble(&e).unwrap();
        assert!(text.contains("2 1\n 7.5000000000000000e-01\n"));

        let back = parse_ensemble(&text, "demo").unwrap();
        assert_eq!(back.run_state(), &[true, true]);
        // the diagnostic is gone; only the missing output marks the failure
        let failure = back.failure(1).unwrap();
        assert_eq!(failure.code, 1);
        assert_ne!(failure.message, "diverged");
        assert!(back.failure(0).is_none());
    }

    #[test]
    fn accepts_three_digit_sentinel_exponent() {
        let text = "PSUADE_IO\n1 1 1\n1 0\n 1.0e+00\n 9.9999999999999997e+034\nPSUADE_IO\nPSUADE\nINPUT\n   dimension = 1\n   variable 1 x  =  0.0  2.0\nEND\nOUTPUT\n   dimension = 1\n   variable 1 y\nEND\nEND\n";
        let e = parse_ensemble(text, "t").unwrap();
        assert!(e.output_data()[0][0].is_nan());
        assert_eq!(e.unfinished_count(), 1);
    }

    #[test]
    fn unusual_run_flags_mark_failures() {
        assert!(failure_for_flag(0, &[f64::NAN]).is_none());
        assert!(failure_for_flag(1, &[1.0]).is_none());
        assert_eq!(failure_for_flag(1, &[f64::NAN]).unwrap().code, 1);
        assert_eq!(failure_for_flag(-3, &[1.0]).unwrap().code, -3);
    }

    #[test]
    fn truncated_sample_is_rejected() {
        let text = "PSUADE_IO\n1 1 1\n1 0\n 1.0e+00\nPSUADE_IO\n";
        assert!(matches!(
            parse_ensemble(text, "t"),
            Err(crate::FormatError::Parse { .. })
        ));
    }
}
