#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stratified spatial sampling over a weighted polygon surface.
//!
//! Given the precise study area and a population field, [`scatter`]
//! apportions exactly N point locations across the polygons (largest
//! remainder, so the counts always sum to N) and places each point
//! uniformly at random inside its polygon by rejection sampling within
//! the polygon's bounding rectangle.
//!
//! The RNG is an [`StdRng`] seeded from configuration, so a run is
//! reproducible given its seed.

use geo::{BoundingRect, Contains, MultiPolygon, Point};
use pop_scatter_feature_models::{Feature, FeatureCollection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Attempts per point before rejection sampling gives up. Uniform
/// sampling over the bounding rectangle hits the polygon with probability
/// (polygon area / rect area); anything that survives this many misses is
/// degenerate.
const MAX_REJECTION_ATTEMPTS: u32 = 10_000;

/// Errors from stratified sampling.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Every polygon's weight is zero or missing; the surface cannot
    /// stratify anything.
    #[error("Weighting surface has zero total weight in field '{field}'")]
    ZeroWeight {
        /// The population field that was consulted.
        field: String,
    },

    /// The study area contains no polygon features.
    #[error("Weighting surface has no polygon features")]
    NoPolygons,

    /// A polygon could not host its allocated points.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of what went wrong.
        message: String,
    },
}

/// Apportions exactly `n` samples across `weights` proportionally,
/// using the largest-remainder method so the counts always sum to `n`.
///
/// Negative and non-finite weights count as zero. Ties on the fractional
/// remainder resolve to the lower index, keeping the result
/// deterministic.
///
/// # Errors
///
/// Returns [`SampleError::ZeroWeight`] if the weights sum to zero (the
/// `field` in the error is filled by the caller via [`scatter`]; direct
/// callers get an empty field name).
pub fn allocate(weights: &[f64], n: usize) -> Result<Vec<usize>, SampleError> {
    let clamped: Vec<f64> = weights
        .iter()
        .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
        .collect();
    let total: f64 = clamped.iter().sum();

    if total <= 0.0 {
        return Err(SampleError::ZeroWeight {
            field: String::new(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let quotas: Vec<f64> = clamped.iter().map(|w| n as f64 * w / total).collect();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut counts: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();

    // Hand the leftover samples to the largest fractional remainders.
    let mut remainders: Vec<(usize, f64)> = quotas
        .iter()
        .enumerate()
        .map(|(i, q)| (i, q - q.floor()))
        .collect();
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for &(index, _) in remainders.iter().take(n - assigned) {
        counts[index] += 1;
    }

    Ok(counts)
}

/// Draws one point uniformly at random inside the polygon.
fn random_point_in(
    polygon: &MultiPolygon<f64>,
    rng: &mut StdRng,
) -> Result<Point<f64>, SampleError> {
    let rect = polygon.bounding_rect().ok_or_else(|| SampleError::Geometry {
        message: "Polygon has no bounding rectangle".to_string(),
    })?;

    for _ in 0..MAX_REJECTION_ATTEMPTS {
        let x = rng.gen_range(rect.min().x..=rect.max().x);
        let y = rng.gen_range(rect.min().y..=rect.max().y);
        let point = Point::new(x, y);
        if polygon.contains(&point) {
            return Ok(point);
        }
    }

    Err(SampleError::Geometry {
        message: format!("Rejection sampling exhausted after {MAX_REJECTION_ATTEMPTS} attempts"),
    })
}

/// Generates exactly `n` sampled points across the study area, each
/// polygon's share proportional to its `population_field` value.
///
/// Every sampled point carries its source polygon's attributes, so the
/// downstream attribute transfer sees which stratum produced it.
///
/// # Errors
///
/// Returns [`SampleError`] if the surface has no polygons, zero total
/// weight, or a polygon cannot host its points.
pub fn scatter(
    study_area: &FeatureCollection,
    population_field: &str,
    n: usize,
    seed: u64,
) -> Result<FeatureCollection, SampleError> {
    let strata: Vec<(MultiPolygon<f64>, f64, &Feature)> = study_area
        .features
        .iter()
        .filter_map(|feature| {
            pop_scatter_feature::as_multipolygon(feature).map(|polygon| {
                let weight = feature.numeric_attribute(population_field).unwrap_or(0.0);
                (polygon, weight, feature)
            })
        })
        .collect();

    if strata.is_empty() {
        return Err(SampleError::NoPolygons);
    }

    let weights: Vec<f64> = strata.iter().map(|(_, w, _)| *w).collect();
    let counts = allocate(&weights, n).map_err(|e| match e {
        SampleError::ZeroWeight { .. } => SampleError::ZeroWeight {
            field: population_field.to_string(),
        },
        other => other,
    })?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut output = FeatureCollection {
        features: Vec::new(),
        spatial_ref: study_area.spatial_ref,
    };

    for ((polygon, _, source), count) in strata.iter().zip(&counts) {
        for _ in 0..*count {
            let point = random_point_in(polygon, &mut rng)?;
            output.features.push(Feature {
                geometry: geo::Geometry::Point(point),
                attributes: source.attributes.clone(),
            });
        }
    }

    log::info!(
        "Scattered {} points across {} strata (field '{population_field}', seed {seed})",
        output.len(),
        strata.len()
    );

    Ok(output)
}
