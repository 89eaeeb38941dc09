#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `GeoJSON` interchange for pop-scatter feature collections.
//!
//! Reads and writes [`FeatureCollection`]s as `GeoJSON` files and coerces
//! individual geometries into the `geo` types the rest of the workspace
//! computes with. `GeoJSON` is always WGS84 per RFC 7946, so every
//! collection read here carries [`SpatialRef::WGS84`].

use std::path::Path;

use geo::{Geometry, MultiPolygon, Point};
use geojson::GeoJson;
use pop_scatter_feature_models::{Feature, FeatureCollection, SpatialRef};
use thiserror::Error;

/// Errors from `GeoJSON` reading, writing, and conversion.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// File read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input was not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The input was valid `GeoJSON` but not usable here.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Parses a `GeoJSON` `FeatureCollection` document.
///
/// Features with a missing or unconvertible geometry are skipped with a
/// warning rather than failing the whole collection; sources routinely
/// contain a few null-geometry rows.
///
/// # Errors
///
/// Returns [`FeatureError`] if the document is not valid `GeoJSON` or is not
/// a `FeatureCollection`.
pub fn parse_collection(content: &str) -> Result<FeatureCollection, FeatureError> {
    let geojson: GeoJson = content.parse()?;

    let GeoJson::FeatureCollection(fc) = geojson else {
        return Err(FeatureError::Conversion {
            message: "Expected a GeoJSON FeatureCollection document".to_string(),
        });
    };

    let mut collection = FeatureCollection::new(SpatialRef::WGS84);

    for (index, feature) in fc.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            log::warn!("Skipping feature {index}: no geometry");
            continue;
        };

        let geometry: Geometry<f64> = match geometry.try_into() {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping feature {index}: unconvertible geometry ({e})");
                continue;
            }
        };

        collection.features.push(Feature {
            geometry,
            attributes: feature.properties.unwrap_or_default(),
        });
    }

    Ok(collection)
}

/// Reads a `GeoJSON` `FeatureCollection` from a file.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be read or parsed.
pub fn read_collection(path: &Path) -> Result<FeatureCollection, FeatureError> {
    let content = std::fs::read_to_string(path)?;
    let collection = parse_collection(&content)?;
    log::debug!(
        "Read {} features from {}",
        collection.len(),
        path.display()
    );
    Ok(collection)
}

/// Serializes a collection as a `GeoJSON` `FeatureCollection` document.
#[must_use]
pub fn to_geojson_string(collection: &FeatureCollection) -> String {
    let features = collection
        .features
        .iter()
        .map(|f| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
            id: None,
            properties: Some(f.attributes.clone()),
            foreign_members: None,
        })
        .collect();

    GeoJson::FeatureCollection(geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
    .to_string()
}

/// Writes a collection to a `GeoJSON` file, replacing any existing file.
///
/// # Errors
///
/// Returns [`FeatureError`] if the file cannot be written.
pub fn write_collection(collection: &FeatureCollection, path: &Path) -> Result<(), FeatureError> {
    std::fs::write(path, to_geojson_string(collection))?;
    log::debug!(
        "Wrote {} features to {}",
        collection.len(),
        path.display()
    );
    Ok(())
}

/// Coerces a feature's geometry into a [`MultiPolygon`].
/// Single polygons are wrapped; anything else is `None`.
#[must_use]
pub fn as_multipolygon(feature: &Feature) -> Option<MultiPolygon<f64>> {
    match &feature.geometry {
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
        _ => None,
    }
}

/// Extracts a feature's geometry as a [`Point`], if it is one.
#[must_use]
pub fn as_point(feature: &Feature) -> Option<Point<f64>> {
    match &feature.geometry {
        Geometry::Point(p) => Some(*p),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_AND_POINT: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0,0.0],[4.0,0.0],[4.0,4.0],[0.0,4.0],[0.0,0.0]]]
                },
                "properties": { "name": "square", "pop": 100 }
            },
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [1.5, 2.5] },
                "properties": { "id": 7 }
            }
        ]
    }"#;

    #[test]
    fn parses_collection_with_attributes() {
        let collection = parse_collection(SQUARE_AND_POINT).unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.spatial_ref, Some(SpatialRef::WGS84));
        assert_eq!(
            collection.features[0].attribute("name"),
            Some(&serde_json::json!("square"))
        );
        assert_eq!(collection.features[0].numeric_attribute("pop"), Some(100.0));
    }

    #[test]
    fn coerces_polygon_to_multipolygon() {
        let collection = parse_collection(SQUARE_AND_POINT).unwrap();
        let mp = as_multipolygon(&collection.features[0]).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(as_multipolygon(&collection.features[1]).is_none());
    }

    #[test]
    fn extracts_points() {
        let collection = parse_collection(SQUARE_AND_POINT).unwrap();
        let p = as_point(&collection.features[1]).unwrap();
        assert!((p.x() - 1.5).abs() < f64::EPSILON);
        assert!((p.y() - 2.5).abs() < f64::EPSILON);
        assert!(as_point(&collection.features[0]).is_none());
    }

    #[test]
    fn skips_null_geometry_features() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": null, "properties": { "id": 1 } },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
                    "properties": { "id": 2 }
                }
            ]
        }"#;
        let collection = parse_collection(doc).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(
            collection.features[0].attribute("id"),
            Some(&serde_json::json!(2))
        );
    }

    #[test]
    fn rejects_bare_geometry_documents() {
        let doc = r#"{ "type": "Point", "coordinates": [0.0, 0.0] }"#;
        assert!(matches!(
            parse_collection(doc),
            Err(FeatureError::Conversion { .. })
        ));
    }

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");

        let collection = parse_collection(SQUARE_AND_POINT).unwrap();
        write_collection(&collection, &path).unwrap();

        let reread = read_collection(&path).unwrap();
        assert_eq!(reread.len(), 2);
        assert_eq!(
            reread.features[1].attribute("id"),
            Some(&serde_json::json!(7))
        );
    }
}
