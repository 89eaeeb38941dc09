//! Interactive parameter flow for running without arguments.
//!
//! Prompts for the same values the `run` subcommand takes as flags, then
//! executes the workflow with a progress bar.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use pop_scatter_cli_utils::{IndicatifProgress, MultiProgress};
use pop_scatter_workflow::RunOutcome;
use pop_scatter_workflow::config::{PartialCensus, PartialConfig};

/// Census source choices offered in the prompt.
enum CensusChoice {
    LocalFile,
    RemoteService,
}

impl CensusChoice {
    const ALL: &[Self] = &[Self::LocalFile, Self::RemoteService];

    const fn label(&self) -> &'static str {
        match self {
            Self::LocalFile => "Local census polygon file",
            Self::RemoteService => "Remote feature service",
        }
    }
}

/// Runs the interactive flow.
///
/// # Errors
///
/// Returns an error if a prompt or the workflow itself fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("pop-scatter: redistribute collapsed points by population density\n");

    let points: String = Input::new()
        .with_prompt("Input point layer (GeoJSON)")
        .interact_text()?;

    let aoi: String = Input::new()
        .with_prompt("Area-of-interest polygon layer (GeoJSON)")
        .interact_text()?;

    let choice_labels: Vec<&str> = CensusChoice::ALL.iter().map(CensusChoice::label).collect();
    let choice = Select::new()
        .with_prompt("Census weighting surface")
        .items(&choice_labels)
        .default(0)
        .interact()?;

    let census = match CensusChoice::ALL[choice] {
        CensusChoice::LocalFile => {
            let file: String = Input::new()
                .with_prompt("Census polygon file (GeoJSON)")
                .interact_text()?;
            PartialCensus {
                file: Some(PathBuf::from(file)),
                service_url: None,
            }
        }
        CensusChoice::RemoteService => {
            let url: String = Input::new()
                .with_prompt("Feature service layer URL")
                .interact_text()?;
            PartialCensus {
                file: None,
                service_url: Some(url),
            }
        }
    };

    let population_field: String = Input::new()
        .with_prompt("Population field")
        .default("POP".to_string())
        .interact_text()?;

    let output: String = Input::new()
        .with_prompt("Output path")
        .default("scattered.geojson".to_string())
        .interact_text()?;

    let seed: String = Input::new()
        .with_prompt("RNG seed (blank for a fresh one)")
        .allow_empty(true)
        .interact_text()?;
    let seed = if seed.trim().is_empty() {
        None
    } else {
        Some(seed.trim().parse::<u64>()?)
    };

    let keep_intermediate = Confirm::new()
        .with_prompt("Keep intermediate data for debugging?")
        .default(false)
        .interact()?;

    let config = PartialConfig {
        points: Some(PathBuf::from(points)),
        aoi: Some(PathBuf::from(aoi)),
        output: Some(PathBuf::from(output)),
        population_field: Some(population_field),
        seed,
        keep_intermediate: Some(keep_intermediate),
        census,
    }
    .into_config()?;

    if !Confirm::new()
        .with_prompt("Run the redistribution now?")
        .default(true)
        .interact()?
    {
        println!("Aborted.");
        return Ok(());
    }

    let progress = IndicatifProgress::stages_bar(multi, "Starting run...");
    let report = pop_scatter_workflow::run(&config, &progress).await?;

    match report.outcome {
        RunOutcome::Completed => {
            println!(
                "\nDone: {} points written to {} (run {})",
                report.sampled_points,
                config.output_path.display(),
                report.run_id
            );
        }
        RunOutcome::NoInputPoints => {
            println!("\nInput layer has no records; nothing was written.");
        }
    }

    Ok(())
}
