//! The end-to-end pipeline run.
//!
//! Sequencing per run: load inputs, obtain census candidates (local file
//! or remote extent query), build the precise study area, scatter,
//! transfer attributes, write output, then close the run workspace. Any
//! failure halts the run; intermediates are deleted on every exit path
//! unless the configuration keeps them.

use std::sync::Arc;
use std::time::Instant;

use pop_scatter_feature_models::FeatureCollection;
use pop_scatter_remote::QueryState;
use serde::Serialize;

use crate::WorkflowError;
use crate::config::{CensusSource, RunConfig};
use crate::progress::ProgressCallback;
use crate::workspace::RunWorkspace;

/// Pipeline stages reported through the progress callback.
const STAGE_COUNT: u64 = 6;

/// How a run ended short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Every stage ran and the output was written.
    Completed,
    /// The input layer had no records; sampling never ran. A warning,
    /// not an error.
    NoInputPoints,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Unique id of this run (also names the run workspace).
    pub run_id: String,
    /// When the run started.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Records in the input point layer.
    pub input_points: usize,
    /// Census candidate polygons considered.
    pub candidate_polygons: usize,
    /// Polygons in the precise study area.
    pub study_area_polygons: usize,
    /// Points written to the output.
    pub sampled_points: usize,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Derives a sampling seed from the run id when none is configured, so
/// distinct runs scatter differently but any run can be replayed by
/// passing its seed back in.
fn derive_seed(run_id: &uuid::Uuid) -> u64 {
    let bytes = run_id.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Obtains the census candidate polygons per the configured source.
///
/// Remote mode runs the extent-prefilter protocol: compute the AOI's
/// bounding extent, query the service with it, materialize the result
/// into the run workspace, and hand back the materialized copy for the
/// precise intersect. An empty remote result is a hard stop.
async fn fetch_candidates(
    config: &RunConfig,
    aoi: &FeatureCollection,
    workspace: &RunWorkspace,
) -> Result<FeatureCollection, WorkflowError> {
    match &config.census {
        CensusSource::LocalFile { path } => {
            log::info!("Reading census polygons from {}", path.display());
            Ok(pop_scatter_feature::read_collection(path)?)
        }
        CensusSource::Remote { service_url } => {
            let extent = pop_scatter_study_area::bounding_extent(aoi)?;
            log::info!(
                "Querying {service_url} with extent ({}, {}) - ({}, {}) [{}]",
                extent.xmin,
                extent.ymin,
                extent.xmax,
                extent.ymax,
                extent.spatial_ref
            );

            let mut state = QueryState::NotQueried;
            let client = pop_scatter_remote::build_client()?;

            let fetched =
                match pop_scatter_remote::query_by_extent(&client, service_url, &extent).await {
                    Ok(collection) => collection,
                    Err(e) => {
                        state.mark_failed(e.to_string());
                        return Err(e.into());
                    }
                };

            if fetched.is_empty() {
                state.mark_failed("no features intersect the query extent");
                return Err(WorkflowError::EmptyStudyArea {
                    message: format!(
                        "Feature service returned no polygons intersecting the AOI extent \
                         ({service_url})"
                    ),
                });
            }
            state.mark_queried(fetched.len());

            let materialized = pop_scatter_study_area::materialize(&fetched, workspace.path())?;
            Ok(materialized.load()?)
        }
    }
}

/// Runs the full pipeline described by `config`.
///
/// # Errors
///
/// Returns [`WorkflowError`] on the first failing stage; see the crate
/// docs for the taxonomy. No stage is retried.
pub async fn run(
    config: &RunConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RunReport, WorkflowError> {
    let started = Instant::now();
    let started_at = chrono::Utc::now();
    let run_uuid = uuid::Uuid::new_v4();
    let run_id = run_uuid.simple().to_string();

    log::info!("Starting run {run_id}");
    progress.set_total(STAGE_COUNT);

    // --- 1. Inputs ---
    progress.set_message("Loading input layers".to_string());
    let mut points = pop_scatter_feature::read_collection(&config.points_path)?;
    let aoi = pop_scatter_feature::read_collection(&config.aoi_path)?;
    let input_points = points.len();
    progress.inc(1);

    if input_points == 0 {
        log::warn!(
            "Input point layer {} has no records; nothing to redistribute",
            config.points_path.display()
        );
        progress.finish("No input points".to_string());
        return Ok(RunReport {
            run_id,
            started_at,
            outcome: RunOutcome::NoInputPoints,
            input_points: 0,
            candidate_polygons: 0,
            study_area_polygons: 0,
            sampled_points: 0,
            elapsed_ms: elapsed_ms(started),
        });
    }

    let workspace = RunWorkspace::create(&run_id, config.keep_intermediate)?;

    // --- 2. Census candidates ---
    progress.set_message("Fetching census polygons".to_string());
    let candidates = fetch_candidates(config, &aoi, &workspace).await?;
    let candidate_polygons = candidates.len();
    progress.inc(1);

    // --- 3. Precise study area ---
    progress.set_message("Intersecting with the AOI".to_string());
    let study_area = pop_scatter_study_area::precise_intersect(&aoi, &candidates)?;
    if study_area.is_empty() {
        return Err(WorkflowError::EmptyStudyArea {
            message: "No census polygon overlaps the AOI boundary".to_string(),
        });
    }
    let study_area_polygons = study_area.len();
    progress.inc(1);

    // --- 4. Stratified sampling ---
    progress.set_message(format!("Scattering {input_points} points"));
    let seed = config.seed.unwrap_or_else(|| derive_seed(&run_uuid));
    let mut sampled =
        pop_scatter_sampler::scatter(&study_area, &config.population_field, input_points, seed)?;
    progress.inc(1);

    // --- 5. Attribute transfer ---
    progress.set_message("Transferring original attributes".to_string());
    pop_scatter_transfer::transfer(&mut sampled, &mut points)?;
    progress.inc(1);

    // --- 6. Output ---
    progress.set_message(format!("Writing {}", config.output_path.display()));
    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    pop_scatter_feature::write_collection(&sampled, &config.output_path)?;
    progress.inc(1);

    workspace.close()?;

    let report = RunReport {
        run_id,
        started_at,
        outcome: RunOutcome::Completed,
        input_points,
        candidate_polygons,
        study_area_polygons,
        sampled_points: sampled.len(),
        elapsed_ms: elapsed_ms(started),
    };

    log::info!(
        "Run {} complete: {} points scattered across {} polygons in {}ms",
        report.run_id,
        report.sampled_points,
        report.study_area_polygons,
        report.elapsed_ms
    );
    progress.finish(format!("{} points written", report.sampled_points));

    Ok(report)
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::ErrorKind;
    use crate::config::{PartialCensus, PartialConfig};
    use crate::progress::null_progress;

    use super::*;

    const AOI_TRIANGLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0,0.0],[4.0,0.0],[0.0,4.0],[0.0,0.0]]]
            },
            "properties": { "aoi_name": "tri" }
        }]
    }"#;

    // Two tracts overlap the triangle; the third sits in the bounding
    // box's empty corner and must be eliminated by the precise intersect.
    const CENSUS_TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0,0.0],[1.5,0.0],[1.5,1.5],[0.0,1.5],[0.0,0.0]]]
                },
                "properties": { "GEOID": "A", "POP": 100 }
            },
            {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0,1.5],[1.5,1.5],[1.5,3.0],[0.0,3.0],[0.0,1.5]]]
                },
                "properties": { "GEOID": "B", "POP": 300 }
            },
            {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[3.5,3.5],[3.9,3.5],[3.9,3.9],[3.5,3.9],[3.5,3.5]]]
                },
                "properties": { "GEOID": "C", "POP": 999 }
            }
        ]
    }"#;

    const FAR_AWAY_TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[100.0,100.0],[101.0,100.0],[101.0,101.0],[100.0,101.0],[100.0,100.0]]]
            },
            "properties": { "GEOID": "X", "POP": 50 }
        }]
    }"#;

    fn collapsed_points(count: usize) -> String {
        let features: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{
                        "type": "Feature",
                        "geometry": {{ "type": "Point", "coordinates": [1.0, 1.0] }},
                        "properties": {{ "case_id": "C-{i:03}" }}
                    }}"#
                )
            })
            .collect();
        format!(
            r#"{{ "type": "FeatureCollection", "features": [{}] }}"#,
            features.join(",")
        )
    }

    fn local_config(dir: &Path, census: &str, points: &str) -> RunConfig {
        std::fs::write(dir.join("aoi.geojson"), AOI_TRIANGLE).unwrap();
        std::fs::write(dir.join("tracts.geojson"), census).unwrap();
        std::fs::write(dir.join("points.geojson"), points).unwrap();

        PartialConfig {
            points: Some(dir.join("points.geojson")),
            aoi: Some(dir.join("aoi.geojson")),
            output: Some(dir.join("out").join("scattered.geojson")),
            population_field: Some("POP".into()),
            seed: Some(42),
            census: PartialCensus {
                file: Some(dir.join("tracts.geojson")),
                service_url: None,
            },
            ..Default::default()
        }
        .into_config()
        .unwrap()
    }

    #[tokio::test]
    async fn local_mode_redistributes_every_input_point() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path(), CENSUS_TRACTS, &collapsed_points(30));

        let report = run(&config, &null_progress()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.input_points, 30);
        assert_eq!(report.sampled_points, 30);
        // Tract C never overlapped the AOI.
        assert_eq!(report.study_area_polygons, 2);

        let output = pop_scatter_feature::read_collection(&config.output_path).unwrap();
        assert_eq!(output.len(), 30);
        for feature in &output.features {
            assert!(feature.attribute("case_id").is_some());
            assert!(feature.attribute("GEOID").is_some());
            assert!(
                feature
                    .attribute(pop_scatter_transfer::JOIN_KEY_FIELD)
                    .is_none()
            );
            // Tract C polygons were eliminated before sampling.
            assert_ne!(feature.attribute("GEOID"), Some(&serde_json::json!("C")));
        }
    }

    #[tokio::test]
    async fn zero_input_points_halts_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path(), CENSUS_TRACTS, &collapsed_points(0));

        let report = run(&config, &null_progress()).await.unwrap();

        assert_eq!(report.outcome, RunOutcome::NoInputPoints);
        assert_eq!(report.sampled_points, 0);
        assert!(!config.output_path.exists());
    }

    #[tokio::test]
    async fn empty_study_area_is_a_hard_stop() {
        let dir = tempfile::tempdir().unwrap();
        let config = local_config(dir.path(), FAR_AWAY_TRACTS, &collapsed_points(5));

        let err = run(&config, &null_progress()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
        assert!(!config.output_path.exists());
    }

    #[test]
    fn derived_seeds_differ_across_runs() {
        let a = derive_seed(&uuid::Uuid::new_v4());
        let b = derive_seed(&uuid::Uuid::new_v4());
        assert_ne!(a, b);
    }
}
