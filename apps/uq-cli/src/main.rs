use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use uq_app::{
    AnalysisOutcome, AnalysisProgressEvent, AnalysisService, AppConfig, AppError, AppResult,
    RunProgressEvent, RunService,
};
use uq_core::{Ensemble, SamplingMethod, SurfaceOptions, SurfaceType};
use uq_formats::{FormatError, load_priors, read_ensemble, validate_ensemble, write_ensemble};
use uq_results::AnalysisStore;
use uq_script::{
    AnalysisRequest, InferenceRequest, InputRole, RawKind, ScreeningMethod, SobolOrder,
};
use uq_solver::{KNOWN_MODULES, ProcessDriver, ResultValue, WorkdirLocks};

#[derive(Parser)]
#[command(name = "uqflow")]
#[command(about = "uqflow - ensemble runs and response-surface analyses", long_about = None)]
struct Cli {
    /// YAML or JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Solver executable (ignored when --config is given)
    #[arg(long, global = true, default_value = "psuade")]
    solver: PathBuf,
    /// Solver working directory (ignored when --config is given)
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

/// Response-surface choice shared by the surface analyses.
#[derive(clap::Args)]
struct SurfaceArgs {
    /// Ensemble file
    ensemble: PathBuf,
    /// 1-based output to analyse
    #[arg(long, default_value_t = 1)]
    output: usize,
    /// Surface name or solver index (e.g. linear, MARS, 9)
    #[arg(long, default_value = "MARS")]
    surface: String,
    /// Legendre polynomial order
    #[arg(long)]
    legendre_order: Option<u32>,
    /// User regression module
    #[arg(long)]
    regression_file: Option<PathBuf>,
}

impl SurfaceArgs {
    fn resolve(&self) -> AppResult<(Ensemble, SurfaceType, SurfaceOptions)> {
        let ensemble = read_ensemble(&self.ensemble)?;
        let surface = SurfaceType::from_name(&self.surface)?;
        let options = SurfaceOptions {
            legendre_order: self.legendre_order,
            mars: None,
            regression_file: self.regression_file.clone(),
        };
        Ok((ensemble, surface, options))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SaOrder {
    First,
    Second,
    Total,
}

#[derive(Clone, Copy, ValueEnum)]
enum RawMethod {
    Moments,
    Correlation,
    MainEffect,
    InteractionEffect,
    TotalSensitivity,
    Moat,
    Lsa,
    MarsScreen,
    SotScreen,
    DeltaTest,
    GpScreen,
}

impl From<RawMethod> for RawKind {
    fn from(m: RawMethod) -> Self {
        match m {
            RawMethod::Moments => RawKind::Moments,
            RawMethod::Correlation => RawKind::Correlation,
            RawMethod::MainEffect => RawKind::MainEffect,
            RawMethod::InteractionEffect => RawKind::InteractionEffect,
            RawMethod::TotalSensitivity => RawKind::TotalSensitivity,
            RawMethod::Moat => RawKind::Screen(ScreeningMethod::Moat),
            RawMethod::Lsa => RawKind::Screen(ScreeningMethod::Lsa),
            RawMethod::MarsScreen => RawKind::Screen(ScreeningMethod::MarsScreen),
            RawMethod::SotScreen => RawKind::Screen(ScreeningMethod::SumOfTreesScreen),
            RawMethod::DeltaTest => RawKind::Screen(ScreeningMethod::DeltaTest),
            RawMethod::GpScreen => RawKind::Screen(ScreeningMethod::GpScreen),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the solver version and installed modules
    Info,
    /// Check an ensemble file's structure
    ValidateFile {
        /// Ensemble file
        ensemble: PathBuf,
    },
    /// Validate a response surface (training and cross-validation errors)
    ValidateRs {
        #[command(flatten)]
        surface: SurfaceArgs,
        /// Cross-validation groups (default min(samples, 10))
        #[arg(long)]
        cv_groups: Option<usize>,
        /// Held-out data for user regression validation
        #[arg(long)]
        test_file: Option<PathBuf>,
        /// Also generate surface code
        #[arg(long)]
        codegen: bool,
    },
    /// Uncertainty analysis on a fitted surface
    Ua {
        #[command(flatten)]
        surface: SurfaceArgs,
        /// Prior overrides (YAML or JSON, one entry per variable input)
        #[arg(long)]
        prior: Option<PathBuf>,
    },
    /// Sobol sensitivity analysis on a fitted surface
    Sa {
        #[command(flatten)]
        surface: SurfaceArgs,
        #[arg(long, value_enum, default_value_t = SaOrder::First)]
        order: SaOrder,
        /// Bootstrapped error bars
        #[arg(long)]
        bootstrap: bool,
        /// Prior overrides (YAML or JSON, one entry per variable input)
        #[arg(long)]
        prior: Option<PathBuf>,
    },
    /// Evaluate a fitted surface at one point
    Eval {
        #[command(flatten)]
        surface: SurfaceArgs,
        /// One value per variable input, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        point: Vec<f64>,
    },
    /// Mixed aleatory-epistemic uncertainty analysis
    Aeua {
        #[command(flatten)]
        surface: SurfaceArgs,
        /// One role per variable input: a (aleatory), e (epistemic) or a fixed value
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,
    },
    /// Analysis directly on ensemble data, without a surface
    Raw {
        /// Ensemble file
        ensemble: PathBuf,
        #[arg(long, default_value_t = 1)]
        output: usize,
        #[arg(long, value_enum)]
        method: RawMethod,
    },
    /// Draw a new sample over an ensemble's inputs
    Generate {
        /// Ensemble file whose inputs and outputs the sample uses
        template: PathBuf,
        /// Sampling scheme (e.g. LH, MC, LPTAU, MOAT)
        #[arg(long, default_value = "LH")]
        method: String,
        #[arg(long)]
        samples: usize,
        /// Where to write the sample
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Add samples where a response surface is least certain
    Refine {
        /// Ensemble file
        ensemble: PathBuf,
        /// 1-based output driving the refinement
        #[arg(long, default_value_t = 1)]
        output: usize,
        /// Size of the sample the refinement started from
        #[arg(long)]
        initial: usize,
        /// Samples to add
        #[arg(long)]
        added: usize,
        /// Where to write the refined ensemble
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Bayesian calibration of the inputs against experiments
    Infer {
        /// Ensemble file
        ensemble: PathBuf,
        /// Calibration request (JSON)
        #[arg(long)]
        request: PathBuf,
    },
    /// Run an ensemble to completion and write the results
    Run {
        /// Ensemble file
        ensemble: PathBuf,
        /// Where to write the finished ensemble (default: overwrite the input)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// List recorded analyses
    History {
        /// Only analyses of ensembles with this name
        #[arg(long)]
        name: Option<String>,
        /// Print the stored result records as JSON
        #[arg(long)]
        records: bool,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::new(&cli.solver, &cli.workdir),
    };
    tracing::debug!(?config, "configuration");
    let locks = WorkdirLocks::new();

    match cli.command {
        Commands::Info => cmd_info(&config, &locks),
        Commands::ValidateFile { ensemble } => cmd_validate_file(&ensemble),
        Commands::ValidateRs {
            surface,
            cv_groups,
            test_file,
            codegen,
        } => {
            let (ensemble, surface_type, options) = surface.resolve()?;
            let request = AnalysisRequest::ValidateResponseSurface {
                output: surface.output,
                surface: surface_type,
                options,
                cv_groups,
                test_file,
                generate_code: codegen,
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Ua { surface, prior } => {
            let (ensemble, surface_type, options) = surface.resolve()?;
            let request = AnalysisRequest::UncertaintyAnalysis {
                output: surface.output,
                surface: surface_type,
                options,
                prior: read_prior(prior.as_deref())?,
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Sa {
            surface,
            order,
            bootstrap,
            prior,
        } => {
            let (ensemble, surface_type, options) = surface.resolve()?;
            let order = match order {
                SaOrder::First => SobolOrder::First,
                SaOrder::Second => SobolOrder::Second,
                SaOrder::Total => SobolOrder::Total,
            };
            let request = AnalysisRequest::SensitivityAnalysis {
                output: surface.output,
                surface: surface_type,
                options,
                order,
                bootstrap,
                prior: read_prior(prior.as_deref())?,
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Eval { surface, point } => {
            let (ensemble, surface_type, options) = surface.resolve()?;
            let request = AnalysisRequest::PointEvaluation {
                output: surface.output,
                surface: surface_type,
                options,
                point,
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Aeua { surface, roles } => {
            let (ensemble, surface_type, options) = surface.resolve()?;
            let request = AnalysisRequest::AleatoryEpistemicUA {
                output: surface.output,
                surface: surface_type,
                options,
                roles: parse_roles(&roles)?,
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Raw {
            ensemble,
            output,
            method,
        } => {
            let ensemble = read_ensemble(&ensemble)?;
            let request = AnalysisRequest::RawAnalysis {
                output,
                kind: method.into(),
            };
            cmd_analyze(&config, &locks, &ensemble, &request)
        }
        Commands::Generate {
            template,
            method,
            samples,
            out,
        } => {
            let template = read_ensemble(&template)?;
            let method = SamplingMethod::from_name(&method)?;
            let mut service = AnalysisService::new(config.clone(), &locks)?;
            let sample = service.generate_samples(&template, method, samples)?;
            write_ensemble(&out, &sample)?;
            println!(
                "✓ Generated {} {} samples, written to {}",
                sample.n_samples(),
                method.full_name(),
                out.display()
            );
            Ok(())
        }
        Commands::Refine {
            ensemble,
            output,
            initial,
            added,
            out,
        } => {
            let ensemble = read_ensemble(&ensemble)?;
            let mut service = AnalysisService::new(config.clone(), &locks)?;
            let refined = service.adaptive_refine(&ensemble, output, initial, added)?;
            write_ensemble(&out, &refined)?;
            println!(
                "✓ Refined to {} samples ({} unfinished), written to {}",
                refined.n_samples(),
                refined.unfinished_count(),
                out.display()
            );
            Ok(())
        }
        Commands::Infer { ensemble, request } => {
            let ensemble = read_ensemble(&ensemble)?;
            let text = std::fs::read_to_string(&request)?;
            let request: InferenceRequest = serde_json::from_str(&text)
                .map_err(|e| AppError::InvalidInput(format!("{}: {}", request.display(), e)))?;
            cmd_analyze(&config, &locks, &ensemble, &AnalysisRequest::Inference(request))
        }
        Commands::Run {
            ensemble,
            out,
            poll_ms,
        } => cmd_run(&config, &locks, &ensemble, out.as_deref(), poll_ms),
        Commands::History { name, records } => cmd_history(&config, name.as_deref(), records),
    }
}

fn cmd_info(config: &AppConfig, locks: &WorkdirLocks) -> AppResult<()> {
    let driver = ProcessDriver::new(&config.solver_path, &config.working_dir, locks);
    let info = driver.probe()?;
    println!(
        "Solver: {} (version {})",
        config.solver_path.display(),
        info.version.as_deref().unwrap_or("unknown")
    );
    for module in KNOWN_MODULES {
        let mark = if info.has_module(module) { "✓" } else { "-" };
        println!("  {} {}", mark, module);
    }
    info.require_version(&config.required_version)?;
    println!("✓ Version satisfies {}", config.required_version);
    Ok(())
}

fn cmd_validate_file(path: &Path) -> AppResult<()> {
    println!("Validating ensemble file: {}", path.display());
    let ensemble = read_ensemble(path)?;
    validate_ensemble(&ensemble).map_err(FormatError::from)?;
    println!(
        "✓ Ensemble is valid: {} inputs, {} outputs, {} samples ({} unfinished)",
        ensemble.inputs().len(),
        ensemble.n_outputs(),
        ensemble.n_samples(),
        ensemble.unfinished_count()
    );
    Ok(())
}

fn cmd_analyze(
    config: &AppConfig,
    locks: &WorkdirLocks,
    ensemble: &Ensemble,
    request: &AnalysisRequest,
) -> AppResult<()> {
    let mut service = AnalysisService::new(config.clone(), locks)?;
    let outcome = service.analyze_with_progress(
        ensemble,
        request,
        Some(&mut |event: AnalysisProgressEvent| render_analysis_progress(&event)),
    );
    clear_progress_line();
    let outcome = outcome?;
    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &AnalysisOutcome) {
    println!(
        "✓ {} completed: {}",
        outcome.record.operation, outcome.manifest.analysis_id
    );
    for (field, value) in &outcome.record.fields {
        match value {
            ResultValue::Number(v) => println!("  {:<20} {:.6e}", field, v),
            ResultValue::Text(t) => println!("  {:<20} {}", field, t),
            ResultValue::Path(p) => println!("  {:<20} {}", field, p.display()),
            ResultValue::Indices(ix) => println!(
                "  {:<20} {}",
                field,
                ix.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
            ),
        }
    }
    for artifact in &outcome.record.artifacts {
        println!("  artifact: {}", artifact.display());
    }
}

fn cmd_run(
    config: &AppConfig,
    locks: &WorkdirLocks,
    path: &Path,
    out: Option<&Path>,
    poll_ms: u64,
) -> AppResult<()> {
    let ensemble = read_ensemble(path)?;
    println!(
        "Running {} samples ({:?} backend)",
        ensemble.n_samples(),
        ensemble.backend
    );
    let mut service = RunService::new(config, locks);
    service.start(ensemble)?;

    let mut last_emit = Instant::now();
    let mut last_unfinished = usize::MAX;
    let result = service.wait(
        Duration::from_millis(poll_ms),
        Some(&mut |event: RunProgressEvent| {
            if event.unfinished != last_unfinished || last_emit.elapsed().as_millis() >= 1000 {
                render_run_progress(&event);
                last_unfinished = event.unfinished;
                last_emit = Instant::now();
            }
        }),
    );
    clear_progress_line();
    let finished = result?;

    let target = out.unwrap_or(path);
    write_ensemble(target, &finished)?;
    let failed = finished.failed_rows();
    println!(
        "✓ Run finished: {} samples, {} failed, written to {}",
        finished.n_samples(),
        failed.len(),
        target.display()
    );
    for row in failed {
        if let Some(Some(failure)) = finished.failures().get(row) {
            println!("  sample {}: code {} {}", row + 1, failure.code, failure.message);
        }
    }
    Ok(())
}

fn cmd_history(config: &AppConfig, name: Option<&str>, records: bool) -> AppResult<()> {
    let store = AnalysisStore::new(config.history_dir())?;
    let mut shown = 0;
    for ensemble_id in store.list_ensembles()? {
        for manifest in store.list_analyses(&ensemble_id)? {
            if name.is_some_and(|n| n != manifest.ensemble_name) {
                continue;
            }
            shown += 1;
            println!(
                "{}  {}  {}  {}",
                manifest.timestamp, manifest.analysis_id, manifest.ensemble_name, manifest.operation
            );
            if records {
                for record in store.load_records(&ensemble_id, &manifest.analysis_id)? {
                    let json = serde_json::to_string_pretty(&record)
                        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
                    println!("{}", json);
                }
            }
        }
    }
    if shown == 0 {
        println!("No analyses recorded in {}", store.root_dir().display());
    }
    Ok(())
}

fn read_prior(path: Option<&Path>) -> AppResult<Vec<Option<uq_core::PriorSpec>>> {
    match path {
        Some(p) => Ok(load_priors(p)?),
        None => Ok(Vec::new()),
    }
}

fn parse_roles(roles: &[String]) -> AppResult<Vec<InputRole>> {
    roles
        .iter()
        .map(|r| match r.trim() {
            "a" | "aleatory" => Ok(InputRole::Aleatory),
            "e" | "epistemic" => Ok(InputRole::Epistemic),
            other => other
                .parse::<f64>()
                .map(InputRole::Fixed)
                .map_err(|_| AppError::InvalidInput(format!("unknown input role '{}'", other))),
        })
        .collect()
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_analysis_progress(event: &AnalysisProgressEvent) {
    print!(
        "\r{} {:?}  elapsed={:.2}s",
        event.operation, event.stage, event.elapsed_wall_s
    );
    let _ = io::stdout().flush();
}

fn render_run_progress(event: &RunProgressEvent) {
    let width = 28usize;
    let fraction = event.fraction_complete();
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  unfinished={}  failed={}  elapsed={:.1}s",
        "#".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0,
        event.unfinished,
        event.failed,
        event.elapsed_wall_s
    );
    let _ = io::stdout().flush();
}
