//! Side files the local backend writes next to the driver ensemble.

use crate::FormatResult;
use std::fmt::Write;
use std::path::Path;
use uq_core::{Ensemble, sci};

/// `config.txt`: section headers plus input and output name maps.
pub fn render_config_txt(ensemble: &Ensemble, solver_path: &Path) -> FormatResult<String> {
    let mut out = String::new();
    for section in ["[Logging]", "[Consumer]", "[Session]", "[Job]", "[Simulation]"] {
        writeln!(out, "{}", section)?;
    }
    writeln!(out, "name={}", ensemble.name)?;
    writeln!(out, "[Application]")?;
    writeln!(out, "[PSUADE]")?;
    writeln!(out, "PSUADE={}", solver_path.display())?;
    writeln!(out, "[Inputs]")?;
    for (i, name) in ensemble.input_names().iter().enumerate() {
        writeln!(out, "{}={}", name, i)?;
    }
    writeln!(out, "[Outputs]")?;
    for (i, name) in ensemble.output_names().iter().enumerate() {
        writeln!(out, "var{}={}", i + 1, name)?;
    }
    writeln!(out, "[OutputsOrder]")?;
    for i in 0..ensemble.n_outputs() {
        writeln!(out, "{}=var{}", i, i + 1)?;
    }
    Ok(out)
}

/// `selectedVars`: every input (fixed ones included) with bounds and PDFs.
pub fn render_selected_vars(ensemble: &Ensemble) -> FormatResult<String> {
    let mut out = String::new();
    writeln!(out, "PSUADE")?;
    writeln!(out, "INPUT")?;
    writeln!(out, "   dimension = {}", ensemble.n_inputs())?;
    for (i, v) in ensemble.inputs().iter().enumerate() {
        writeln!(out, "   variable {} {} = {} {}", i + 1, v.name, sci(v.min, 6), sci(v.max, 6))?;
    }
    for (i, v) in ensemble.inputs().iter().enumerate() {
        let (p1, p2) = v.distribution.parameters();
        if let Some(p1) = p1 {
            write!(out, "   PDF {} {} {}", i + 1, v.distribution.kind().code(), sci(p1, 6))?;
            if let Some(p2) = p2 {
                write!(out, " {}", sci(p2, 6))?;
            }
            writeln!(out)?;
        }
    }
    writeln!(out, "END")?;
    writeln!(out, "OUTPUT")?;
    writeln!(out, "   dimension = {}", ensemble.n_outputs())?;
    for (i, name) in ensemble.output_names().iter().enumerate() {
        writeln!(out, "   variable {} {}", i + 1, name)?;
    }
    writeln!(out, "END")?;
    writeln!(out, "END")?;
    Ok(out)
}
