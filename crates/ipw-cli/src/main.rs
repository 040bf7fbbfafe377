//! ipwstat CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ipw_core::PipelineConfig;
use ipw_inference::{SyntheticConfig, generate_cessation_cohort, run_pipeline};
use std::path::{Path, PathBuf};

mod load;
mod report;

#[derive(Parser)]
#[command(name = "ipwstat")]
#[command(about = "ipwstat - Inverse-probability-weighted treatment effect estimation")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable tables
    #[default]
    Text,
    /// Pretty JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full IPW analysis on a subject table
    Run {
        /// Input subject table (CSV with header)
        #[arg(short, long)]
        input: PathBuf,

        /// Pipeline configuration (JSON). Defaults to the NHEFS model.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file for the report (pretty JSON).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stabilize weights by the marginal treatment probability.
        #[arg(long)]
        stabilize: bool,

        /// Format of the report printed to stdout.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Write a synthetic NHEFS-shaped subject table with a known effect
    Simulate {
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of subjects (>0)
        #[arg(long, default_value = "1000")]
        n: usize,

        /// True additive treatment effect
        #[arg(long, default_value = "2.0")]
        effect: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { input, config, output, stabilize, format } => {
            cmd_run(&input, config.as_deref(), output.as_deref(), stabilize, format)
        }
        Commands::Simulate { output, n, effect, seed } => cmd_simulate(&output, n, effect, seed),
        Commands::Version => {
            println!("ipwstat {}", ipw_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_run(
    input: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    stabilize: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut cfg = match config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    cfg.stabilize |= stabilize;

    tracing::info!(path = %input.display(), "loading subject table");
    let data = load::load_dataset(input, &cfg.columns)?;
    let report = run_pipeline(&data, &cfg)?;
    tracing::info!(
        effect = report.ipw.effect,
        std_error = report.ipw.std_error,
        "analysis complete"
    );

    let json = serde_json::to_value(&report)?;
    if let Some(path) = output {
        write_json(Some(path), json.clone())?;
    }
    match format {
        OutputFormat::Text => print!("{}", report::render_text(&report)?),
        OutputFormat::Json if output.is_none() => write_json(None, json)?,
        OutputFormat::Json => {}
    }
    Ok(())
}

fn cmd_simulate(output: &Path, n: usize, effect: f64, seed: u64) -> Result<()> {
    let cfg =
        SyntheticConfig { n_subjects: n, treatment_effect: effect, seed, ..Default::default() };
    let cohort = generate_cessation_cohort(&cfg)?;
    load::write_dataset(output, &cohort.dataset)?;
    tracing::info!(
        path = %output.display(),
        n = cohort.dataset.len(),
        n_treated = cohort.dataset.n_treated(),
        "synthetic subject table written"
    );
    Ok(())
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
