//! CLI binary for running the H/Z -> Upsilon + photon selection over batches.

mod runner;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use hzupsilon_engine::{clear_buffer, merge_buffer, AnalysisConfig, Cutflow, MergeReport};

#[derive(Parser)]
#[command(name = "hzups", version, about = "H/Z -> Upsilon + photon event selection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process batch files and merge their outputs
    Run {
        /// Batch files (JSON) to process
        #[arg(required = true)]
        batches: Vec<PathBuf>,

        /// Analysis configuration (default: built-in thresholds)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory; partial outputs go to <output>/buffer
        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,

        /// Number of batches processed concurrently
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Also write the probe-muon trigger-study records
        #[arg(long)]
        trigger_study: bool,
    },

    /// Merge whatever is left in <output>/buffer into <output>
    Merge {
        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,
    },

    /// Empty <output>/buffer
    Clear {
        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,
    },

    /// Print the built-in configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            batches,
            config,
            output,
            workers,
            trigger_study,
        } => {
            cmd_run(batches, config.as_deref(), &output, workers, trigger_study).await?;
        }
        Commands::Merge { output } => {
            cmd_merge(&output)?;
        }
        Commands::Clear { output } => {
            clear_buffer(&runner::buffer_dir(&output))?;
            println!("Cleared {}", runner::buffer_dir(&output).display());
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&AnalysisConfig::default())?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(path) => Ok(AnalysisConfig::load(path)?),
        None => Ok(AnalysisConfig::default()),
    }
}

async fn cmd_run(
    batches: Vec<PathBuf>,
    config: Option<&Path>,
    output: &Path,
    workers: usize,
    trigger_study: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config)?;
    config.trigger_study |= trigger_study;
    println!("Processing {} batch file(s) with {} worker(s)", batches.len(), workers);

    let (summary, report) = runner::run(config, batches, workers, output).await?;

    println!("\nProcessed: {}", summary.processed);
    println!("Events: {} ({} selected)", summary.events, summary.selected);
    for (sample, yields) in &summary.yields {
        println!("\n{}:", sample);
        for (variation, y) in yields {
            println!("  {:<16} {:>14.4}", variation, y);
        }
    }
    print_report(&report);

    if summary.has_failures() {
        println!("\nFailed batches:");
        for failed in &summary.failed {
            println!("  {}: {}", failed.path.display(), failed.error);
        }
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_merge(output: &Path) -> anyhow::Result<()> {
    let report = merge_buffer(&runner::buffer_dir(output), output)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &MergeReport) {
    println!(
        "\nMerged {} cutflow(s) and {} record file(s)",
        report.cutflows_merged, report.record_files_merged
    );
    for (group, files) in &report.groups {
        println!("  {} <- {} file(s)", group, files);
    }
    if let Some(cutflow) = &report.cutflow {
        print_cutflow(cutflow);
    }
}

fn print_cutflow(cutflow: &Cutflow) {
    let Ok(cumulative) = cutflow.cumulative(cutflow.cuts()) else {
        return;
    };
    println!("\nCutflow:");
    println!("  {:<24} {:>14.4}", "all", cumulative[0]);
    for (cut, weight) in cutflow.cuts().iter().zip(&cumulative[1..]) {
        println!("  {:<24} {:>14.4}", cut, weight);
    }
}
