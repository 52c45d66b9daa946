use hermite_nbody::evolve::PROGRESS_TICKS;
use hermite_nbody::experiment::{export_run, export_summaries};
use hermite_nbody::orbit_generator::{circular_binary, generate_random_orbits};
use hermite_nbody::{
    read_initial_state, write_snapshot, ForceEvaluator, ForceState, Integrator, ParticleSystem,
    RunConfig, StreamObserver,
};

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Spatial dimension of the command-line integrator.
const DIM: usize = 2;

#[derive(Parser)]
#[command(name = "nbody")]
#[command(version, about = "Hermite N-body integrator with a shared adaptive time step")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate a snapshot; snapshots go to stdout, diagnostics to stderr.
    Evolve(EvolveArgs),

    /// Write an initial snapshot to stdout.
    Generate {
        #[command(subcommand)]
        kind: GenerateKind,
    },

    /// Summarize every snapshot of an output stream as CSV on stdout.
    Inspect {
        /// Snapshot stream (default: stdin).
        input: Option<PathBuf>,
    },
}

#[derive(Args)]
struct EvolveArgs {
    /// Step size control parameter.
    #[arg(short = 'a', long)]
    accuracy: Option<f64>,

    /// Diagnostics interval (0: only at start and end).
    #[arg(short = 'd', long)]
    diagnostics_interval: Option<f64>,

    /// Snapshot output interval.
    #[arg(short = 'o', long)]
    snapshot_interval: Option<f64>,

    /// Total duration of the integration.
    #[arg(short = 't', long)]
    duration: Option<f64>,

    /// Extra debugging diagnostics (per-particle dump).
    #[arg(short = 'x', long)]
    verbose: bool,

    /// YAML run configuration; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write every diagnostics record to this CSV file.
    #[arg(long)]
    energy_log: Option<PathBuf>,

    /// Append a summary row for this run to this CSV file.
    #[arg(long)]
    run_log: Option<PathBuf>,

    /// Free-form note stored with the run summary.
    #[arg(long, default_value = "")]
    notes: String,

    /// Evaluate pair forces on all cores.
    #[arg(long)]
    parallel: bool,

    /// Show a progress bar over simulated time.
    #[arg(long)]
    progress: bool,

    /// Initial snapshot (default: stdin).
    input: Option<PathBuf>,
}

#[derive(Subcommand)]
enum GenerateKind {
    /// Two equal masses on a circular orbit.
    Binary {
        #[arg(long, default_value_t = 1.0e30)]
        mass: f64,
        #[arg(long, default_value_t = 1.0e11)]
        separation: f64,
    },

    /// Stars with planets on random bound orbits.
    Random {
        #[arg(long, default_value_t = 5)]
        bodies: u32,
        #[arg(long, default_value_t = 1)]
        central: u32,
        #[arg(long)]
        seed: Option<u64>,
    },
}

impl EvolveArgs {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("cannot open config {}", path.display()))?;
                RunConfig::from_yaml_reader(BufReader::new(file))?
            }
            None => RunConfig::default(),
        };
        if let Some(v) = self.accuracy {
            config.accuracy = v;
        }
        if let Some(v) = self.diagnostics_interval {
            config.diagnostics_interval = v;
        }
        if let Some(v) = self.snapshot_interval {
            config.snapshot_interval = v;
        }
        if let Some(v) = self.duration {
            config.duration = v;
        }
        config.verbose |= self.verbose;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(PROGRESS_TICKS);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn evolve(args: EvolveArgs) -> Result<()> {
    let config = args.run_config()?;

    let (time, system) = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open snapshot {}", path.display()))?;
            read_initial_state::<_, DIM>(BufReader::new(file))
        }
        None => read_initial_state::<_, DIM>(io::stdin().lock()),
    }
    .context("failed to read initial snapshot")?;

    let evaluator = if args.parallel {
        ForceEvaluator::Parallel
    } else {
        ForceEvaluator::Serial
    };
    let mut integrator = Integrator::new(system, time, &config)?.with_evaluator(evaluator);
    if args.progress {
        integrator = integrator.with_progress(progress_bar()?);
    }

    let mut observer = StreamObserver::new(BufWriter::new(io::stdout().lock()), io::stderr());
    if let Some(path) = &args.energy_log {
        observer = observer
            .with_energy_log(path)
            .with_context(|| format!("cannot create energy log {}", path.display()))?;
    }

    let summary = integrator.run(&mut observer)?;

    if let Some(path) = &args.run_log {
        export_run(
            path,
            &integrator,
            &summary,
            observer.energy_diagnostics(),
            observer.last_report(),
            &args.notes,
        )
        .with_context(|| format!("cannot append to run log {}", path.display()))?;
    }
    Ok(())
}

fn generate(kind: GenerateKind) -> Result<()> {
    let bodies = match kind {
        GenerateKind::Binary { mass, separation } => circular_binary(mass, separation),
        GenerateKind::Random {
            bodies,
            central,
            seed,
        } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            generate_random_orbits(&mut rng, bodies, central)
                .ok_or_else(|| anyhow!("cannot place {bodies} bodies around {central} central masses"))?
        }
    };

    let system = ParticleSystem::<DIM>::from_masses(&bodies);
    let forces = ForceState::evaluate(&system);
    let mut out = BufWriter::new(io::stdout().lock());
    write_snapshot(&mut out, &system, forces.distances(), 0.0)?;
    out.flush()?;
    Ok(())
}

fn inspect(input: Option<PathBuf>) -> Result<()> {
    let out = BufWriter::new(io::stdout().lock());
    let rows = match input {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("cannot open snapshot stream {}", path.display()))?;
            export_summaries::<_, _, DIM>(BufReader::new(file), out)?
        }
        None => export_summaries::<_, _, DIM>(io::stdin().lock(), out)?,
    };
    tracing::info!(rows, "snapshots summarized");
    Ok(())
}

fn main() -> Result<()> {
    // usage goes to stderr and help is a halt, not a success
    let cli = Cli::try_parse().unwrap_or_else(|err| {
        eprint!("{err}");
        let code = match err.kind() {
            ErrorKind::DisplayVersion => 0,
            ErrorKind::DisplayHelp => 1,
            _ => err.exit_code(),
        };
        std::process::exit(code)
    });
    init_tracing();

    match cli.command {
        Commands::Evolve(args) => evolve(args),
        Commands::Generate { kind } => generate(kind),
        Commands::Inspect { input } => inspect(input),
    }
}
