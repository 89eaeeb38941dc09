#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core feature types shared across the pop-scatter workspace.
//!
//! A [`Feature`] pairs one geometry with an attribute map, and a
//! [`FeatureCollection`] groups features under an optional spatial
//! reference. These are deliberately thin: geometry math lives in the
//! crates that consume them, `GeoJSON` interchange lives in
//! `pop_scatter_feature`.

use geo::Geometry;
use serde::{Deserialize, Serialize};

/// A coordinate system identified by its well-known ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialRef {
    /// Well-known ID (e.g. 4326 for WGS84).
    pub wkid: u32,
}

impl SpatialRef {
    /// WGS84 geographic coordinates, the spatial reference of all `GeoJSON`
    /// input per RFC 7946.
    pub const WGS84: Self = Self { wkid: 4326 };
}

impl std::fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wkid:{}", self.wkid)
    }
}

/// An axis-aligned bounding rectangle tagged with its spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    /// Minimum x (west edge).
    pub xmin: f64,
    /// Minimum y (south edge).
    pub ymin: f64,
    /// Maximum x (east edge).
    pub xmax: f64,
    /// Maximum y (north edge).
    pub ymax: f64,
    /// Coordinate system the edges are expressed in.
    pub spatial_ref: SpatialRef,
}

impl Extent {
    /// Whether the point (x, y) lies inside or on the boundary of the
    /// extent.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Whether this extent fully contains `other` (edges inclusive).
    #[must_use]
    pub fn contains_extent(&self, other: &Self) -> bool {
        self.xmin <= other.xmin
            && self.ymin <= other.ymin
            && self.xmax >= other.xmax
            && self.ymax >= other.ymax
    }
}

/// Attribute map carried by a feature. Keys are field names; values are
/// whatever JSON the source supplied.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// One geometry plus its attributes.
#[derive(Debug, Clone)]
pub struct Feature {
    /// The feature geometry.
    pub geometry: Geometry<f64>,
    /// Field name to value.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a feature with an empty attribute map.
    #[must_use]
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            attributes: Attributes::new(),
        }
    }

    /// Returns the value of the named attribute, if present.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Returns the named attribute as an `f64`, accepting numeric strings
    /// (remote services are inconsistent about numeric field types).
    #[must_use]
    pub fn numeric_attribute(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A set of features under one (optional) spatial reference.
///
/// Collections read from `GeoJSON` always carry `Some(WGS84)`; collections
/// built programmatically may leave the reference undefined, which the
/// extent computation treats as an error.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    /// The features, in source order.
    pub features: Vec<Feature>,
    /// Coordinate system of every geometry in `features`.
    pub spatial_ref: Option<SpatialRef>,
}

impl FeatureCollection {
    /// Creates an empty collection in the given spatial reference.
    #[must_use]
    pub const fn new(spatial_ref: SpatialRef) -> Self {
        Self {
            features: Vec::new(),
            spatial_ref: Some(spatial_ref),
        }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the collection holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Extent {
        Extent {
            xmin,
            ymin,
            xmax,
            ymax,
            spatial_ref: SpatialRef::WGS84,
        }
    }

    #[test]
    fn extent_contains_interior_and_boundary() {
        let e = extent(-1.0, -1.0, 1.0, 1.0);
        assert!(e.contains(0.0, 0.0));
        assert!(e.contains(1.0, -1.0));
        assert!(!e.contains(1.1, 0.0));
    }

    #[test]
    fn extent_containment_is_inclusive() {
        let outer = extent(0.0, 0.0, 10.0, 10.0);
        let inner = extent(2.0, 2.0, 8.0, 8.0);
        assert!(outer.contains_extent(&inner));
        assert!(outer.contains_extent(&outer));
        assert!(!inner.contains_extent(&outer));
    }

    #[test]
    fn numeric_attribute_accepts_strings() {
        let mut f = Feature::new(geo::Geometry::Point(geo::Point::new(0.0, 0.0)));
        f.attributes
            .insert("pop".into(), serde_json::json!("1234.5"));
        f.attributes.insert("name".into(), serde_json::json!("x"));
        assert_eq!(f.numeric_attribute("pop"), Some(1234.5));
        assert_eq!(f.numeric_attribute("name"), None);
        assert_eq!(f.numeric_attribute("missing"), None);
    }
}
