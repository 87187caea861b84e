mod app;
mod config;
mod data;
mod error;
mod pipeline;
mod report;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::error;

use app::PlateApp;
use config::PipelineConfig;
use report::summary::{render_summary, write_calibration_json};
use report::writer::{OutputFormat, write_table};

/// Fit per-plate calibration curves to plate-reader absorbance data and
/// predict sample concentrations.
#[derive(Parser, Debug)]
#[command(name = "plate-calib", version, about, long_about = None)]
struct Cli {
    /// Directory of raw 8x12 absorbance CSVs
    #[arg(long)]
    raw: Option<PathBuf>,

    /// Directory of identifier CSVs
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Output file for the tidy table (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format; guessed from the output extension when omitted
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// TOML file with filename patterns, column names and thresholds
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write every plate's calibration model to this JSON file
    #[arg(long)]
    calibration_json: Option<PathBuf>,

    /// Fail the run if any plate is dropped or cannot be calibrated
    #[arg(long)]
    strict: bool,

    /// Verbose logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(raw) = &self.raw {
            config.raw_dir = raw.clone();
        }
        if let Some(ids) = &self.ids {
            config.id_dir = ids.clone();
        }
        config.strict |= self.strict;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.pipeline_config()?;
    let report = PlateApp::new(&config)?.run()?;

    let format = cli.format.unwrap_or_else(|| {
        cli.output
            .as_deref()
            .map_or(OutputFormat::Csv, OutputFormat::from_path)
    });
    write_table(&report.table, cli.output.as_deref(), format)?;

    if let Some(path) = &cli.calibration_json {
        write_calibration_json(&report.batch, path)?;
    }

    eprint!("{}", render_summary(&report.batch)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
