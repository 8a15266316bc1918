//! soma-coreg - assign segment IDs to coordinate lists
//!
//! Subcommands:
//! - `classify`: categorize every coordinate in a file against a label volume
//! - `transform`: print the sampling and report frames of one coordinate
//! - `show-config`: print the effective configuration as TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use soma_coreg::config::{
    Config, ConfigOverrides, FetchErrorPolicy, ParseErrorPolicy, StrategyKind,
};
use soma_coreg::data::loader::{InputReader, RawLine, load_volume_manifest, parse_record};
use soma_coreg::data::model::Extent;
use soma_coreg::emit::{DiagnosticsWriter, OutputSinks};
use soma_coreg::observe::{LogObserver, PipelineObserver};
use soma_coreg::{Pipeline, RetryingSampler};

#[derive(Parser, Debug)]
#[command(name = "soma-coreg")]
#[command(about = "Assign segment IDs to 3D coordinates by sampling a label volume", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Categorize every coordinate of an input file
    Classify(ClassifyArgs),
    /// Show the sampling and report coordinates of one nanometer coordinate
    Transform(TransformArgs),
    /// Print the effective configuration as TOML
    #[command(name = "show-config")]
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Coordinate file: `x,y,z[,...]` in nanometers, one record per line
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for records that received a segment ID
    #[arg(short, long)]
    categorized: PathBuf,

    /// Output file for everything else
    #[arg(short, long)]
    uncategorized: PathBuf,

    /// JSON manifest of the label volume
    #[arg(short, long)]
    volume: PathBuf,

    /// Skip this many input lines first (resume an interrupted run)
    #[arg(long, default_value = "0")]
    start_line: usize,

    /// Append to the output files instead of truncating them
    #[arg(long)]
    append: bool,

    /// Write a per-record diagnostics CSV here
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Write the run summary as JSON here
    #[arg(long)]
    summary: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// Coordinate as `x,y,z` in nanometers
    #[arg(allow_hyphen_values = true)]
    coordinate: String,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Args, Debug)]
struct ShowConfigArgs {
    #[command(flatten)]
    settings: SettingsArgs,
}

/// Config file plus per-field overrides shared by every subcommand.
#[derive(Args, Debug)]
struct SettingsArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decision rule
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Threshold strategy: minimum share of the box held by the mode
    #[arg(long)]
    threshold: Option<f64>,

    /// Margin strategy: minimum voxel count of the top segment
    #[arg(long)]
    min_voxel_count: Option<u64>,

    /// Margin strategy: required ratio of top to runner-up count
    #[arg(long)]
    margin_multiplier: Option<f64>,

    /// Sampled box extent, e.g. 8x8x32
    #[arg(long = "box")]
    box_extent: Option<Extent>,

    /// Resolution level to sample at
    #[arg(long)]
    mip: Option<u32>,

    /// Maximum concurrent cutout requests
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum)]
    on_parse_error: Option<ParseErrorPolicy>,

    #[arg(long, value_enum)]
    on_fetch_error: Option<FetchErrorPolicy>,
}

impl SettingsArgs {
    fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        config.apply(&ConfigOverrides {
            strategy: self.strategy,
            threshold: self.threshold,
            min_voxel_count: self.min_voxel_count,
            margin_multiplier: self.margin_multiplier,
            box_extent: self.box_extent,
            mip: self.mip,
            workers: self.workers,
            on_parse_error: self.on_parse_error,
            on_fetch_error: self.on_fetch_error,
        })?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Classify(args) => run_classify(args),
        Commands::Transform(args) => run_transform(args),
        Commands::ShowConfig(args) => {
            print!("{}", args.settings.resolve()?.to_toml()?);
            Ok(())
        }
    }
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let config = args.settings.resolve()?;

    let stack = load_volume_manifest(&args.volume)?;
    let mip = config.sampling.mip;
    if !stack.levels().any(|level| level == mip) {
        let available: Vec<String> = stack.levels().map(|l| l.to_string()).collect();
        bail!(
            "{} has no mip {mip} (available: {})",
            args.volume.display(),
            available.join(", ")
        );
    }
    let sampler = RetryingSampler::new(
        stack,
        config.sampling.max_retries,
        config.sampling.retry_backoff(),
    );

    let reader = InputReader::open(&args.input)?.starting_at(args.start_line);
    let sinks = OutputSinks::create(&args.categorized, &args.uncategorized, args.append)?;

    let mut observers: Vec<Box<dyn PipelineObserver>> = vec![Box::new(LogObserver)];
    if let Some(path) = &args.diagnostics {
        observers.push(Box::new(DiagnosticsWriter::create(path)?));
    }

    let mut pipeline = Pipeline::new(config, sampler)?.with_start_line(args.start_line);
    let summary = pipeline
        .run(reader, sinks, &mut observers)
        .with_context(|| format!("classifying {}", args.input.display()))?;

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &soma_coreg::RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("serializing run summary")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("writing summary to {}", path.display()))
}

fn run_transform(args: TransformArgs) -> Result<()> {
    let config = args.settings.resolve()?;
    let record = parse_record(RawLine {
        line_no: 1,
        text: args.coordinate.clone(),
    })?;
    let (sampling, report) = config.transformer().transform(record.world);
    println!("world:    {}", record.world.0);
    println!("report:   {report}");
    println!("sampling: {sampling} (mip {})", config.sampling.mip);
    Ok(())
}
