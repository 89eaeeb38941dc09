#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Study-area construction: the extent-prefilter-then-precise-intersect
//! core.
//!
//! The remote service is only ever asked a cheap bounding-box question
//! ([`bounding_extent`] feeds that query); the answer is then refined
//! locally by [`precise_intersect`], which clips every candidate polygon
//! against the true AOI geometry. The output therefore never contains
//! area outside the AOI boundary, regardless of how loose the remote
//! filter was.

use std::path::{Path, PathBuf};

use geo::{Area, BooleanOps, BoundingRect, MultiPolygon};
use pop_scatter_feature::FeatureError;
use pop_scatter_feature_models::{Attributes, Extent, Feature, FeatureCollection, SpatialRef};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors from study-area construction.
#[derive(Debug, Error)]
pub enum StudyAreaError {
    /// The AOI collection holds no features.
    #[error("AOI has no features")]
    EmptyAoi,

    /// A collection has no spatial reference to tag the extent with.
    #[error("Spatial reference is undefined")]
    UndefinedSpatialRef,

    /// The AOI and candidate collections are in different coordinate
    /// systems.
    #[error("Spatial reference mismatch: AOI is {aoi}, candidates are {candidates}")]
    SpatialRefMismatch {
        /// AOI spatial reference.
        aoi: SpatialRef,
        /// Candidate spatial reference.
        candidates: SpatialRef,
    },

    /// No feature contributed a usable polygon geometry.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of what went wrong.
        message: String,
    },

    /// Materialization I/O failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Computes the minimal axis-aligned extent enclosing every AOI feature,
/// tagged with the AOI's spatial reference.
///
/// # Errors
///
/// Returns [`StudyAreaError`] if the AOI is empty, its spatial reference
/// is undefined, or no feature has a bounding rectangle.
pub fn bounding_extent(aoi: &FeatureCollection) -> Result<Extent, StudyAreaError> {
    if aoi.is_empty() {
        return Err(StudyAreaError::EmptyAoi);
    }
    let spatial_ref = aoi.spatial_ref.ok_or(StudyAreaError::UndefinedSpatialRef)?;

    let mut merged: Option<(f64, f64, f64, f64)> = None;

    for feature in &aoi.features {
        let Some(rect) = feature.geometry.bounding_rect() else {
            continue;
        };
        merged = Some(match merged {
            None => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            Some((xmin, ymin, xmax, ymax)) => (
                xmin.min(rect.min().x),
                ymin.min(rect.min().y),
                xmax.max(rect.max().x),
                ymax.max(rect.max().y),
            ),
        });
    }

    let (xmin, ymin, xmax, ymax) = merged.ok_or_else(|| StudyAreaError::Geometry {
        message: "No AOI feature has a bounding rectangle".to_string(),
    })?;

    Ok(Extent {
        xmin,
        ymin,
        xmax,
        ymax,
        spatial_ref,
    })
}

/// Handle to a feature collection persisted inside the run workspace.
///
/// The workspace that hosts the file owns its lifetime; the handle is only
/// a path plus a reader.
#[derive(Debug)]
pub struct MaterializedFeatures {
    path: PathBuf,
}

impl MaterializedFeatures {
    /// Where the features were written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the materialized collection back from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StudyAreaError`] if the file cannot be read or parsed.
    pub fn load(&self) -> Result<FeatureCollection, StudyAreaError> {
        Ok(pop_scatter_feature::read_collection(&self.path)?)
    }
}

/// Persists a fetched candidate collection into the run workspace so the
/// precise intersect runs against local data.
///
/// # Errors
///
/// Returns [`StudyAreaError`] if the file cannot be written.
pub fn materialize(
    collection: &FeatureCollection,
    workspace_dir: &Path,
) -> Result<MaterializedFeatures, StudyAreaError> {
    let path = workspace_dir.join("census_candidates.geojson");
    pop_scatter_feature::write_collection(collection, &path)?;
    log::info!(
        "Materialized {} candidate features to {}",
        collection.len(),
        path.display()
    );
    Ok(MaterializedFeatures { path })
}

/// A candidate polygon stored in the R-tree for envelope pruning.
struct CandidateEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for CandidateEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Computes the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Merges candidate and AOI attributes with ALL-join semantics: every
/// field from both inputs survives. On a name collision the candidate
/// keeps the plain name and the AOI field is stored under the first free
/// `_N`-suffixed name.
fn merge_attributes(candidate: &Attributes, aoi: &Attributes) -> Attributes {
    let mut merged = candidate.clone();
    for (key, value) in aoi {
        if merged.contains_key(key) {
            let mut n = 1;
            let mut renamed = format!("{key}_{n}");
            while merged.contains_key(&renamed) {
                n += 1;
                renamed = format!("{key}_{n}");
            }
            merged.insert(renamed, value.clone());
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Clips candidate polygons against the true AOI geometry, producing the
/// precise study area.
///
/// Candidates are pruned by bounding-rectangle overlap first, then cut
/// with an exact boolean intersection; zero-area results are discarded.
/// One output feature is produced per (candidate, AOI feature) pair that
/// genuinely overlaps, carrying both features' attributes.
///
/// Returns an empty collection when nothing overlaps; the caller decides
/// whether that halts the run.
///
/// # Errors
///
/// Returns [`StudyAreaError`] on a spatial reference mismatch or when a
/// collection has no polygon geometry at all.
pub fn precise_intersect(
    aoi: &FeatureCollection,
    candidates: &FeatureCollection,
) -> Result<FeatureCollection, StudyAreaError> {
    if aoi.is_empty() {
        return Err(StudyAreaError::EmptyAoi);
    }
    let aoi_sr = aoi.spatial_ref.ok_or(StudyAreaError::UndefinedSpatialRef)?;
    let cand_sr = candidates
        .spatial_ref
        .ok_or(StudyAreaError::UndefinedSpatialRef)?;
    if aoi_sr != cand_sr {
        return Err(StudyAreaError::SpatialRefMismatch {
            aoi: aoi_sr,
            candidates: cand_sr,
        });
    }

    let entries: Vec<CandidateEntry> = candidates
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            pop_scatter_feature::as_multipolygon(feature).map(|polygon| CandidateEntry {
                index,
                envelope: compute_envelope(&polygon),
                polygon,
            })
        })
        .collect();

    if entries.is_empty() && !candidates.is_empty() {
        return Err(StudyAreaError::Geometry {
            message: "Candidate collection contains no polygon geometry".to_string(),
        });
    }

    let tree = RTree::bulk_load(entries);
    let mut output = FeatureCollection::new(aoi_sr);

    for aoi_feature in &aoi.features {
        let Some(aoi_polygon) = pop_scatter_feature::as_multipolygon(aoi_feature) else {
            log::warn!("Skipping non-polygon AOI feature");
            continue;
        };
        let aoi_envelope = compute_envelope(&aoi_polygon);

        for entry in tree.locate_in_envelope_intersecting(&aoi_envelope) {
            let clip = aoi_polygon.intersection(&entry.polygon);
            if clip.unsigned_area() <= 0.0 {
                continue;
            }

            let candidate_feature = &candidates.features[entry.index];
            output.features.push(Feature {
                geometry: geo::Geometry::MultiPolygon(clip),
                attributes: merge_attributes(
                    &candidate_feature.attributes,
                    &aoi_feature.attributes,
                ),
            });
        }
    }

    log::info!(
        "Precise intersect kept {} of {} candidate features",
        output.len(),
        candidates.len()
    );

    Ok(output)
}
