//! Run configuration: TOML file loading, CLI flag overlay, validation.
//!
//! Flags win over file values. All shape validation happens here, before
//! the run touches the filesystem or the network.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::WorkflowError;

/// Where the census weighting polygons come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CensusSource {
    /// A census polygon `GeoJSON` file on disk.
    LocalFile {
        /// Path to the file.
        path: PathBuf,
    },
    /// An `ArcGIS`-style feature service layer endpoint.
    Remote {
        /// Layer URL (with or without a trailing `/query`).
        service_url: String,
    },
}

/// A fully validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input point layer (the collapsed points to redistribute).
    pub points_path: PathBuf,
    /// Area-of-interest polygon layer.
    pub aoi_path: PathBuf,
    /// Census weighting surface source.
    pub census: CensusSource,
    /// Attribute field holding the population weight.
    pub population_field: String,
    /// Where the redistributed points are written.
    pub output_path: PathBuf,
    /// RNG seed; when absent one is derived from the run id.
    pub seed: Option<u64>,
    /// Keep the run workspace on disk for debugging.
    pub keep_intermediate: bool,
}

/// Census source as it appears in a TOML file or on the command line,
/// before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialCensus {
    /// Local census polygon file.
    pub file: Option<PathBuf>,
    /// Remote feature service layer URL.
    pub service_url: Option<String>,
}

/// A configuration fragment: a TOML file, a set of CLI flags, or the
/// overlay of several fragments.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    /// Input point layer path.
    pub points: Option<PathBuf>,
    /// AOI polygon layer path.
    pub aoi: Option<PathBuf>,
    /// Output path.
    pub output: Option<PathBuf>,
    /// Population weight field name.
    pub population_field: Option<String>,
    /// RNG seed.
    pub seed: Option<u64>,
    /// Keep the run workspace on disk.
    pub keep_intermediate: Option<bool>,
    /// Census source.
    #[serde(default)]
    pub census: PartialCensus,
}

impl PartialConfig {
    /// Parses a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if the document does not
    /// parse.
    pub fn from_toml_str(content: &str) -> Result<Self, WorkflowError> {
        toml::from_str(content).map_err(|e| WorkflowError::Configuration {
            message: format!("Invalid config file: {e}"),
        })
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if the file cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Self, WorkflowError> {
        let content = std::fs::read_to_string(path).map_err(|e| WorkflowError::Configuration {
            message: format!("Cannot read config file {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlays `other` on top of `self`; any value `other` carries wins.
    #[must_use]
    pub fn overlay(self, other: Self) -> Self {
        Self {
            points: other.points.or(self.points),
            aoi: other.aoi.or(self.aoi),
            output: other.output.or(self.output),
            population_field: other.population_field.or(self.population_field),
            seed: other.seed.or(self.seed),
            keep_intermediate: other.keep_intermediate.or(self.keep_intermediate),
            census: PartialCensus {
                file: other.census.file.or(self.census.file),
                service_url: other.census.service_url.or(self.census.service_url),
            },
        }
    }

    /// Validates the fragment into a [`RunConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] naming the first missing
    /// or contradictory value.
    pub fn into_config(self) -> Result<RunConfig, WorkflowError> {
        let missing = |what: &str| WorkflowError::Configuration {
            message: format!("Missing required setting: {what}"),
        };

        let census = match (self.census.file, self.census.service_url) {
            (Some(_), Some(_)) => {
                return Err(WorkflowError::Configuration {
                    message: "Census source must be either a local file or a service URL, not both"
                        .to_string(),
                });
            }
            (Some(path), None) => CensusSource::LocalFile { path },
            (None, Some(service_url)) => {
                if service_url.trim().is_empty() {
                    return Err(missing("census.service_url"));
                }
                CensusSource::Remote { service_url }
            }
            (None, None) => {
                return Err(missing("census.file or census.service_url"));
            }
        };

        let population_field = self.population_field.ok_or_else(|| missing("population_field"))?;
        if population_field.trim().is_empty() {
            return Err(missing("population_field"));
        }

        Ok(RunConfig {
            points_path: self.points.ok_or_else(|| missing("points"))?,
            aoi_path: self.aoi.ok_or_else(|| missing("aoi"))?,
            census,
            population_field,
            output_path: self.output.ok_or_else(|| missing("output"))?,
            seed: self.seed,
            keep_intermediate: self.keep_intermediate.unwrap_or(false),
        })
    }
}

/// A commented TOML template for `pop_scatter config`.
#[must_use]
pub const fn template() -> &'static str {
    r#"# pop-scatter run configuration

# Input point layer: the collapsed points to redistribute.
points = "points.geojson"

# Area-of-interest polygon layer.
aoi = "aoi.geojson"

# Where the redistributed points are written.
output = "scattered.geojson"

# Attribute field holding the population weight.
population_field = "POP"

# Optional RNG seed for reproducible runs.
# seed = 42

# Keep the run workspace on disk for debugging.
# keep_intermediate = true

[census]
# Exactly one of the two:
file = "tracts.geojson"
# service_url = "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/Tracts_Blocks/MapServer/0"
"#
}
