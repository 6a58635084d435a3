//! Augment-music CLI - builds per-horse augmented music from raw race files

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use race_music::data::features::{DEFAULT_CASH_PRIZE_SCALE, DEFAULT_MAX_RESULT_POSITION};
use race_music::{
    AugmentConfig, AugmentPipeline, EncoderConfig, PipelineError, PipelineEvent, RunStage,
    RunSummary,
};

/// Maximum number of individual issues printed per category
const MAX_LISTED: usize = 10;

#[derive(Parser)]
#[command(name = "augment-music")]
#[command(author, version, about = "Builds augmented music of horses", long_about = None)]
struct Cli {
    /// Input JSON files glob pattern (e.g. "data/raw/2016-2018_races/historic/*.json")
    #[arg(short, long)]
    input: String,

    /// Output directory, one artifact per horse
    #[arg(short, long)]
    output: PathBuf,

    /// Positions above this are capped before normalization
    #[arg(long, default_value_t = DEFAULT_MAX_RESULT_POSITION)]
    max_result_position: u16,

    /// Prize mapped to 1.0 by the log-scaled prize feature
    #[arg(long, default_value_t = DEFAULT_CASH_PRIZE_SCALE)]
    cash_prize_scale: f64,

    /// Prepend each horse's earliest music to its artifact
    #[arg(long)]
    include_music: bool,

    /// Worker threads (default: all cores, 1 = sequential)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Log every data warning
    #[arg(short, long)]
    verbose: bool,

    /// No progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    println!("{}", "Augment music".cyan().bold());
    println!(
        "{}: {} -> {}",
        "Input".green(),
        cli.input,
        cli.output.display()
    );
    println!();

    let config = AugmentConfig::new(cli.input.clone(), cli.output.clone())
        .with_encoder(EncoderConfig {
            max_result_position: cli.max_result_position,
            cash_prize_scale: cli.cash_prize_scale,
            include_music: cli.include_music,
        })
        .with_jobs(cli.jobs);
    let pipeline = AugmentPipeline::new(config).context("Invalid configuration")?;

    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let outcome = pipeline.run_with_observer(|event| match event {
        PipelineEvent::StageStarted(stage) => {
            pb.set_message(stage.to_string());
            if matches!(stage, RunStage::Parsing | RunStage::Writing) {
                pb.set_position(0);
            }
        }
        PipelineEvent::FilesDiscovered(count) | PipelineEvent::HorsesBuilt(count) => {
            pb.set_length(count as u64);
        }
        PipelineEvent::FileParsed(_) | PipelineEvent::ArtifactWritten(_) => pb.inc(1),
    });
    pb.finish_and_clear();

    match outcome {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(PipelineError::ZeroArtifactsProduced { summary }) => {
            print_summary(&summary);
            anyhow::bail!("No artifacts were produced")
        }
        Err(e) => Err(e).context("Augmentation run failed"),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("{}", "Summary".cyan().bold());
    println!(
        "  Files:     {} parsed / {} found",
        summary.files_parsed, summary.files_discovered
    );
    println!(
        "  Records:   {} kept from {} rows",
        summary.records_kept, summary.rows_read
    );
    println!(
        "  Horses:    {} built from {} raw names",
        summary.horses_built, summary.distinct_raw_names
    );
    println!(
        "  Artifacts: {}",
        summary.artifacts.len().to_string().green().bold()
    );
    if let Some(path) = &summary.manifest_path {
        println!("  Manifest:  {}", path.display());
    }

    if !summary.warnings.is_empty() {
        println!(
            "\n{}: {} data warnings (use --verbose to log all)",
            "Warning".yellow(),
            summary.warnings.len()
        );
        for warning in summary.warnings.iter().take(MAX_LISTED) {
            println!("  {}", warning);
        }
    }

    if !summary.file_failures.is_empty() {
        println!(
            "\n{}: {} unreadable files",
            "Warning".yellow(),
            summary.file_failures.len()
        );
        for failure in summary.file_failures.iter().take(MAX_LISTED) {
            println!("  {}", failure);
        }
    }

    if !summary.horse_failures.is_empty() {
        println!(
            "\n{}: {} horses skipped",
            "Warning".yellow(),
            summary.horse_failures.len()
        );
        for failure in summary.horse_failures.iter().take(MAX_LISTED) {
            println!("  {}", failure);
        }
    }

    if summary.is_clean() {
        println!("\n{}", "Complete".green());
    } else {
        println!("\n{}", "Complete with warnings".yellow());
    }
}
