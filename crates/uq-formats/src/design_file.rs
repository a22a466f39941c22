//! Input files that ask the solver to draw a fresh sample.
//!
//! The file carries only the metadata blocks: INPUT (variable inputs, and
//! their PDFs when the scheme can sample them directly), OUTPUT, METHOD,
//! APPLICATION and ANALYSIS. The solver answers with `psuadeData`.

use crate::FormatResult;
use std::fmt::Write;
use std::path::Path;
use tracing::debug;
use uq_core::{Distribution, Ensemble, SamplingMethod, WIRE_PRECISION, sci_padded};

/// Output named when the template has none; the solver needs at least one.
pub const PLACEHOLDER_OUTPUT: &str = "ghostOuput";

/// Only Monte Carlo samples non-uniform PDFs directly; other schemes sample
/// the unit hypercube and convert afterwards. Sample-file PDFs always go in.
pub fn needs_pdf_conversion(template: &Ensemble, method: SamplingMethod) -> bool {
    method != SamplingMethod::Mc
        && template
            .inputs()
            .iter()
            .filter(|v| !v.is_fixed())
            .any(|v| !matches!(v.distribution, Distribution::Uniform | Distribution::Sample { .. }))
}

pub fn render_design_input(
    template: &Ensemble,
    method: SamplingMethod,
    n_samples: usize,
    include_pdfs: bool,
) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "PSUADE")?;
    writeln!(out, "INPUT")?;
    let variable: Vec<_> = template.inputs().iter().filter(|v| !v.is_fixed()).collect();
    writeln!(out, "   dimension = {}", variable.len())?;
    for (k, v) in variable.iter().enumerate() {
        writeln!(
            out,
            "   variable {} {} = {} {}",
            k + 1,
            v.name,
            sci_padded(v.min, WIRE_PRECISION),
            sci_padded(v.max, WIRE_PRECISION)
        )?;
    }
    for (k, v) in variable.iter().enumerate() {
        match &v.distribution {
            Distribution::Uniform => {}
            Distribution::Sample { file, column } => {
                writeln!(out, "   PDF {} S {} {}", k + 1, file.display(), column)?;
            }
            other if include_pdfs => {
                write!(out, "   PDF {} {}", k + 1, other.kind().code())?;
                let (p1, p2) = other.parameters();
                for p in [p1, p2].into_iter().flatten() {
                    write!(out, " {}", sci_padded(p, WIRE_PRECISION))?;
                }
                writeln!(out)?;
            }
            _ => {}
        }
    }
    writeln!(out, "END")?;

    writeln!(out, "OUTPUT")?;
    if template.n_outputs() == 0 {
        writeln!(out, "   dimension = 1")?;
        writeln!(out, "   variable 1 {}", PLACEHOLDER_OUTPUT)?;
    } else {
        writeln!(out, "   dimension = {}", template.n_outputs())?;
        for (i, v) in template.outputs().iter().enumerate() {
            writeln!(out, "   variable {} {}", i + 1, v.name)?;
        }
    }
    writeln!(out, "END")?;

    writeln!(out, "METHOD")?;
    writeln!(out, "   sampling = {}", method.solver_name())?;
    writeln!(out, "   num_samples = {}", n_samples)?;
    if method != SamplingMethod::Gmoat {
        writeln!(out, "   randomize")?;
    }
    writeln!(out, "END")?;

    writeln!(out, "APPLICATION")?;
    writeln!(out, "   driver = NONE")?;
    writeln!(out, "   save_frequency = 1")?;
    writeln!(out, "END")?;

    writeln!(out, "ANALYSIS")?;
    writeln!(out, "   diagnostics 2")?;
    writeln!(out, "END")?;
    writeln!(out, "END")?;
    Ok(out)
}

pub fn write_design_input(
    path: &Path,
    template: &Ensemble,
    method: SamplingMethod,
    n_samples: usize,
    include_pdfs: bool,
) -> FormatResult<()> {
    std::fs::write(path, render_design_input(template, method, n_samples, include_pdfs)?)?;
    debug!(path = %path.display(), method = method.solver_name(), n_samples, "wrote design input");
    Ok(())
}
