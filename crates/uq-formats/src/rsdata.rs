//! RS-data files: the ensemble file variant the solver's response-surface
//! analyses load. The ANALYSIS block names the surface and output to analyse.

use crate::ensemble_file::{write_data_section, write_input_block, write_method_block, write_output_block};
use crate::{FormatError, FormatResult};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uq_core::{CoreError, Distribution, Ensemble, PriorSpec, SurfaceType, Variable};

/// Point count above which the solver must be told how many points to keep.
const MAX_POINTS_THRESHOLD: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct RsDataOptions {
    /// 1-based output to analyse.
    pub output: usize,
    pub surface: SurfaceType,
    pub legendre_order: Option<u32>,
    /// Write only the metadata section (emulation input files).
    pub omit_data: bool,
    /// Overrides the ensemble's own driver.
    pub driver: Option<String>,
    /// Training points behind `driver`, when larger than the ensemble itself.
    pub training_points: Option<usize>,
    pub save_frequency: Option<u32>,
    pub index_file: Option<PathBuf>,
}

impl RsDataOptions {
    pub fn new(output: usize, surface: SurfaceType) -> Self {
        Self {
            output,
            surface,
            legendre_order: None,
            omit_data: false,
            driver: None,
            training_points: None,
            save_frequency: None,
            index_file: None,
        }
    }

    pub fn with_legendre_order(mut self, order: Option<u32>) -> Self {
        self.legendre_order = order;
        self
    }

    pub fn with_index_file(mut self, path: Option<PathBuf>) -> Self {
        self.index_file = path;
        self
    }
}

pub fn render_rsdata(ensemble: &Ensemble, opts: &RsDataOptions) -> FormatResult<String> {
    if opts.output == 0 || opts.output > ensemble.n_outputs() {
        return Err(CoreError::IndexOob {
            what: "analysed output (1-based)",
            index: opts.output,
            len: ensemble.n_outputs(),
        }
        .into());
    }
    if opts.surface == SurfaceType::Legendre && opts.legendre_order.is_none() {
        return Err(FormatError::MissingOption {
            context: "RS data file",
            option: "Legendre order",
        });
    }

    let mut out = String::new();
    if !opts.omit_data {
        write_data_section(&mut out, ensemble)?;
    }
    writeln!(out, "PSUADE")?;
    write_input_block(&mut out, ensemble)?;
    write_output_block(&mut out, ensemble)?;
    write_method_block(&mut out, ensemble)?;

    writeln!(out, "APPLICATION")?;
    let driver = opts
        .driver
        .as_deref()
        .or(ensemble.drivers.driver.as_deref())
        .unwrap_or("NONE");
    writeln!(out, "   driver = {}", driver)?;
    writeln!(out, "   opt_driver = NONE")?;
    writeln!(out, "   aux_opt_driver = NONE")?;
    writeln!(out, "   max_job_wait_time = 1000000")?;
    if let Some(freq) = opts.save_frequency.filter(|f| *f > 0) {
        writeln!(out, "   save_frequency = {}", freq)?;
    }
    writeln!(out, "END")?;

    writeln!(out, "ANALYSIS")?;
    writeln!(out, "   analyzer output_id  = {}", opts.output)?;
    writeln!(out, "   analyzer rstype = {}", opts.surface.solver_name())?;
    writeln!(out, "   use_input_pdfs")?;
    if let (SurfaceType::Legendre, Some(order)) = (opts.surface, opts.legendre_order) {
        writeln!(out, "   analyzer rs_legendre_order = {}", order)?;
    }
    writeln!(out, "   analyzer threshold = 1.000000e+00")?;
    let points = ensemble.n_samples().max(opts.training_points.unwrap_or(0));
    if points > MAX_POINTS_THRESHOLD {
        writeln!(out, "   rs_max_pts = {}", points)?;
    }
    if let Some(index_file) = &opts.index_file {
        writeln!(out, "   analyzer rs_index_file = {}", index_file.display())?;
    }
    writeln!(out, "   printlevel 1")?;
    writeln!(out, "END")?;
    writeln!(out, "END")?;
    Ok(out)
}

pub fn write_rsdata(path: &Path, ensemble: &Ensemble, opts: &RsDataOptions) -> FormatResult<()> {
    let content = render_rsdata(ensemble, opts)?;
    std::fs::write(path, content)?;
    debug!(
        path = %path.display(),
        surface = opts.surface.solver_name(),
        output = opts.output,
        "wrote RS data file"
    );
    Ok(())
}

/// Apply one optional prior per variable input; returns a new ensemble.
///
/// A uniform prior replaces the bounds. Any other prior replaces the distribution.
pub fn apply_priors(ensemble: &Ensemble, priors: &[Option<PriorSpec>]) -> FormatResult<Ensemble> {
    let variable = ensemble.variable_input_indices();
    if priors.len() != variable.len() {
        return Err(FormatError::PriorCount {
            expected: variable.len(),
            found: priors.len(),
        });
    }
    let mut out = ensemble.clone();
    for (&index, prior) in variable.iter().zip(priors) {
        let Some(prior) = prior else { continue };
        prior.validate()?;
        let current = &ensemble.inputs()[index];
        let replacement = match prior {
            PriorSpec::Uniform { min, max } => Variable {
                min: *min,
                max: *max,
                default: current.default.clamp(*min, *max),
                distribution: Distribution::Uniform,
                ..current.clone()
            },
            PriorSpec::Pdf { distribution } => current.clone().with_distribution(distribution.clone()),
        };
        out.set_input_variable(index, replacement)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo(n: usize) -> Ensemble {
        let inputs = vec![
            Variable::input("a", 0.0, 1.0),
            Variable::fixed("b", 1.0),
            Variable::input("c", 0.0, 10.0),
        ];
        let rows = (0..n).map(|i| vec![i as f64 / n as f64, 1.0, 5.0]).collect();
        Ensemble::new("d", inputs, vec![Variable::output("y1"), Variable::output("y2")])
            .unwrap()
            .with_samples(rows)
            .unwrap()
    }

    #[test]
    fn analysis_block_names_output_and_surface() {
        let opts = RsDataOptions::new(2, SurfaceType::Quadratic)
            .with_index_file(Some(PathBuf::from("/tmp/indexfile")));
        let text = render_rsdata(&demo(3), &opts).unwrap();
        assert!(text.contains("   analyzer output_id  = 2\n"));
        assert!(text.contains("   analyzer rstype = quadratic\n"));
        assert!(text.contains("   use_input_pdfs\n"));
        assert!(text.contains("   analyzer rs_index_file = /tmp/indexfile\n"));
        assert!(!text.contains("rs_max_pts"));
        assert!(text.ends_with("   printlevel 1\nEND\nEND\n"));
    }

    #[test]
    fn legendre_needs_order() {
        let opts = RsDataOptions::new(1, SurfaceType::Legendre);
        assert!(matches!(
            render_rsdata(&demo(3), &opts),
            Err(FormatError::MissingOption { .. })
        ));
        let opts = opts.with_legendre_order(Some(2));
        let text = render_rsdata(&demo(3), &opts).unwrap();
        assert!(text.contains("   analyzer rs_legendre_order = 2\n"));
    }

    #[test]
    fn large_training_sets_set_max_points() {
        let mut opts = RsDataOptions::new(1, SurfaceType::Mars);
        opts.training_points = Some(6000);
        opts.omit_data = true;
        let text = render_rsdata(&demo(3), &opts).unwrap();
        assert!(text.contains("   rs_max_pts = 6000\n"));
        assert!(text.starts_with("PSUADE\n"));
    }

    #[test]
    fn priors_replace_bounds_or_distribution() {
        let e = demo(4);
        let priors = vec![
            Some(PriorSpec::Uniform { min: 0.2, max: 0.4 }),
            Some(PriorSpec::Pdf {
                distribution: Distribution::Normal {
                    mean: 5.0,
                    std_dev: 1.0,
                },
            }),
        ];
        let out = apply_priors(&e, &priors).unwrap();
        assert_eq!((out.inputs()[0].min, out.inputs()[0].max), (0.2, 0.4));
        assert_eq!(out.inputs()[2].max, 10.0);
        assert!(!out.inputs()[2].distribution.is_uniform());
        assert_eq!(e.inputs()[0].max, 1.0);
    }

    #[test]
    fn prior_count_must_match_variable_inputs() {
        let e = demo(2);
        assert!(matches!(
            apply_priors(&e, &[None]),
            Err(FormatError::PriorCount { expected: 2, found: 1 })
        ));
    }
}
