#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the pop-scatter point redistribution workflow.

mod interactive;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pop_scatter_cli_utils::IndicatifProgress;
use pop_scatter_workflow::config::PartialCensus;
use pop_scatter_workflow::{ErrorKind, PartialConfig, RunOutcome};

#[derive(Parser)]
#[command(
    name = "pop_scatter",
    about = "Redistribute collapsed point features by population density"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the redistribution workflow
    Run {
        /// TOML config file; flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Input point layer (GeoJSON)
        #[arg(long)]
        points: Option<PathBuf>,
        /// Area-of-interest polygon layer (GeoJSON)
        #[arg(long)]
        aoi: Option<PathBuf>,
        /// Census polygon file (GeoJSON); mutually exclusive with `--service-url`
        #[arg(long)]
        census_file: Option<PathBuf>,
        /// ArcGIS-style feature service layer URL; mutually exclusive with `--census-file`
        #[arg(long)]
        service_url: Option<String>,
        /// Attribute field holding the population weight
        #[arg(long)]
        population_field: Option<String>,
        /// Output path for the redistributed points (GeoJSON)
        #[arg(long)]
        output: Option<PathBuf>,
        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Keep the run workspace on disk for debugging
        #[arg(long)]
        keep_intermediate: bool,
        /// Print the run report as JSON on completion
        #[arg(long)]
        report: bool,
    },
    /// Print the bounding extent of a GeoJSON layer
    Extent {
        /// The layer to measure
        path: PathBuf,
    },
    /// Write a commented config file template
    Config {
        /// Where to write the template (default: `pop_scatter.toml`)
        #[arg(long, default_value = "pop_scatter.toml")]
        output: PathBuf,
    },
}

/// User-facing label for the error taxonomy.
const fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Configuration => "Configuration",
        ErrorKind::EmptyResult => "Empty result",
        ErrorKind::Execution => "Execution",
        ErrorKind::Unexpected => "Unexpected",
    }
}

async fn run_command(
    multi: &pop_scatter_cli_utils::MultiProgress,
    config_file: Option<PathBuf>,
    flags: PartialConfig,
    print_report: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fragment = match config_file {
        Some(path) => PartialConfig::load(&path)?.overlay(flags),
        None => flags,
    };
    let config = fragment.into_config()?;

    let progress = IndicatifProgress::stages_bar(multi, "Starting run...");

    match pop_scatter_workflow::run(&config, &progress).await {
        Ok(report) => {
            match report.outcome {
                RunOutcome::Completed => {
                    log::info!(
                        "Wrote {} redistributed points to {}",
                        report.sampled_points,
                        config.output_path.display()
                    );
                }
                RunOutcome::NoInputPoints => {
                    log::warn!("Input layer has no records; no output written");
                }
            }
            if print_report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("{} error: {e}", kind_label(e.kind()));
            Err(e.into())
        }
    }
}

fn extent_command(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let collection = pop_scatter_feature::read_collection(path)?;
    let extent = pop_scatter_study_area::bounding_extent(&collection)?;
    println!(
        "{} features, extent ({}, {}) - ({}, {}) [{}]",
        collection.len(),
        extent.xmin,
        extent.ymin,
        extent.xmax,
        extent.ymax,
        extent.spatial_ref
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = pop_scatter_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    match command {
        Commands::Run {
            config,
            points,
            aoi,
            census_file,
            service_url,
            population_field,
            output,
            seed,
            keep_intermediate,
            report,
        } => {
            let flags = PartialConfig {
                points,
                aoi,
                output,
                population_field,
                seed,
                // Only override the file value when the flag was given.
                keep_intermediate: keep_intermediate.then_some(true),
                census: PartialCensus {
                    file: census_file,
                    service_url,
                },
            };
            run_command(&multi, config, flags, report).await?;
        }
        Commands::Extent { path } => extent_command(&path)?,
        Commands::Config { output } => {
            std::fs::write(&output, pop_scatter_workflow::config::template())?;
            log::info!("Wrote config template to {}", output.display());
        }
    }

    Ok(())
}
