#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature-service client for extent-intersects queries.
//!
//! Talks to an `ArcGIS`-style REST `query` endpoint: one envelope-intersects
//! query per run, spatial relation fixed to `esriSpatialRelIntersects`,
//! results requested as `GeoJSON` in WGS84. When the service reports
//! `exceededTransferLimit` the client follows with `resultOffset` pages so
//! a server-side record cap cannot silently truncate the candidate set.
//!
//! There is no retry logic anywhere in this client: the workflow is
//! one-shot and any transport or service failure is terminal.

use pop_scatter_feature::FeatureError;
use pop_scatter_feature_models::{Extent, FeatureCollection};
use thiserror::Error;

/// Records requested per page. Services commonly cap a single response at
/// 1000-2000 records; staying at 1000 keeps one page within every cap
/// observed in the wild.
const FEATURE_PAGE_SIZE: u32 = 1000;

/// Courtesy delay between successive page requests.
const INTER_PAGE_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

/// Browser-like User-Agent; some public feature services sit behind WAFs
/// that reject default client strings.
const SERVICE_USER_AGENT: &str = "Mozilla/5.0 (compatible; PopScatter/1.0; +https://github.com)";

/// Errors from feature-service queries.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status} from feature service: {snippet}")]
    Status {
        /// The response status code.
        status: u16,
        /// Truncated response body for diagnostics.
        snippet: String,
    },

    /// The response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service returned an error envelope instead of features.
    #[error("Feature service error {code}: {message}")]
    Service {
        /// Service-reported error code.
        code: i64,
        /// Service-reported error message.
        message: String,
    },

    /// The response was valid JSON but not a feature page.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// Assembling the accumulated pages into a collection failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Lifecycle of the one remote query a run performs.
///
/// Two transitions only: `NotQueried -> Queried` on a nonempty result and
/// `NotQueried -> Failed` on an empty result or any transport/service
/// error. Both outcomes are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    /// No query issued yet.
    NotQueried,
    /// Query succeeded with a nonempty result.
    Queried {
        /// Number of features returned.
        feature_count: usize,
    },
    /// Query failed or returned nothing usable.
    Failed {
        /// Why the query failed.
        reason: String,
    },
}

impl QueryState {
    /// Whether the state permits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotQueried)
    }

    /// Transitions to `Queried`. Terminal states are never re-entered.
    ///
    /// # Panics
    ///
    /// Panics if the state is already terminal; a run issues exactly one
    /// query.
    pub fn mark_queried(&mut self, feature_count: usize) {
        assert!(!self.is_terminal(), "query state is terminal");
        *self = Self::Queried { feature_count };
    }

    /// Transitions to `Failed`. Terminal states are never re-entered.
    ///
    /// # Panics
    ///
    /// Panics if the state is already terminal.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        assert!(!self.is_terminal(), "query state is terminal");
        *self = Self::Failed {
            reason: reason.into(),
        };
    }
}

/// One parsed page of a feature-service response.
#[derive(Debug)]
struct FeaturePage {
    /// Raw `GeoJSON` feature objects from this page.
    features: Vec<serde_json::Value>,
    /// Whether the service truncated the page at its transfer limit.
    exceeded_transfer_limit: bool,
}

/// Builds a `reqwest::Client` configured for feature-service requests.
///
/// # Errors
///
/// Returns [`RemoteError`] if the client cannot be built.
pub fn build_client() -> Result<reqwest::Client, RemoteError> {
    reqwest::Client::builder()
        .user_agent(SERVICE_USER_AGENT)
        .build()
        .map_err(Into::into)
}

/// Builds the query URL for one page of an envelope-intersects request.
///
/// `service_url` is the layer endpoint (with or without a trailing
/// `/query`); the envelope is passed as `geometry` with
/// `geometryType=esriGeometryEnvelope` and the relation is always
/// `esriSpatialRelIntersects`. Output is pinned to `GeoJSON` in WGS84 so
/// the local intersect runs in the same coordinates as the AOI.
#[must_use]
pub fn build_query_url(service_url: &str, extent: &Extent, offset: u32) -> String {
    let base = service_url.trim_end_matches('/');
    let base = if base.ends_with("/query") {
        base.to_string()
    } else {
        format!("{base}/query")
    };

    format!(
        "{base}?where=&geometry={xmin},{ymin},{xmax},{ymax}\
         &geometryType=esriGeometryEnvelope\
         &inSR={wkid}\
         &spatialRel=esriSpatialRelIntersects\
         &outFields=*\
         &returnGeometry=true\
         &outSR=4326\
         &f=geojson\
         &resultRecordCount={FEATURE_PAGE_SIZE}\
         &resultOffset={offset}",
        xmin = extent.xmin,
        ymin = extent.ymin,
        xmax = extent.xmax,
        ymax = extent.ymax,
        wkid = extent.spatial_ref.wkid,
    )
}

/// Truncates a string for logging, appending "..." if it exceeds `max_len`.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

/// Parses one response body into a [`FeaturePage`].
///
/// Detects the `ArcGIS` error envelope (`{"error": {code, message}}`),
/// which services return with a 200 status.
fn parse_page(json: &serde_json::Value) -> Result<FeaturePage, RemoteError> {
    if let Some(error_obj) = json.get("error") {
        let code = error_obj
            .get("code")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        let message = error_obj
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        return Err(RemoteError::Service { code, message });
    }

    let features = json["features"]
        .as_array()
        .ok_or_else(|| RemoteError::Conversion {
            message: "No features array in feature service response".to_string(),
        })?
        .clone();

    let exceeded_transfer_limit = json
        .get("exceededTransferLimit")
        .or_else(|| json.get("properties").and_then(|p| p.get("exceededTransferLimit")))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    Ok(FeaturePage {
        features,
        exceeded_transfer_limit,
    })
}

/// Fetches one page. Single attempt; any failure is terminal.
async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    offset: u32,
) -> Result<FeaturePage, RemoteError> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        log::error!(
            "Feature service returned HTTP {status} (offset={offset}). Response body: {}",
            truncate_for_log(&body, 500)
        );
        return Err(RemoteError::Status {
            status: status.as_u16(),
            snippet: truncate_for_log(&body, 200),
        });
    }

    let json: serde_json::Value = serde_json::from_str(&body)?;
    parse_page(&json)
}

/// Assembles raw `GeoJSON` feature objects into a [`FeatureCollection`].
fn assemble_collection(features: Vec<serde_json::Value>) -> Result<FeatureCollection, RemoteError> {
    let doc = serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    });
    Ok(pop_scatter_feature::parse_collection(&doc.to_string())?)
}

/// Queries the feature service for every feature whose geometry intersects
/// `extent`, following transfer-limit pages until the result is complete.
///
/// Returns an empty collection (not an error) when nothing intersects;
/// the caller decides whether that halts the run.
///
/// # Errors
///
/// Returns [`RemoteError`] on any transport failure, non-success status,
/// service error envelope, or malformed response. No attempt is retried.
pub async fn query_by_extent(
    client: &reqwest::Client,
    service_url: &str,
    extent: &Extent,
) -> Result<FeatureCollection, RemoteError> {
    let mut all_features: Vec<serde_json::Value> = Vec::new();
    let mut offset = 0u32;

    loop {
        let url = build_query_url(service_url, extent, offset);
        log::debug!("Querying feature service (offset={offset})");

        let page = fetch_page(client, &url, offset).await?;

        if page.features.is_empty() {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        let page_len = page.features.len() as u32;
        all_features.extend(page.features);

        if !page.exceeded_transfer_limit {
            break;
        }

        offset += page_len;
        log::info!(
            "Feature service page complete ({} features so far), fetching next page...",
            all_features.len()
        );

        tokio::time::sleep(INTER_PAGE_DELAY).await;
    }

    log::info!(
        "Feature service returned {} candidate features for extent ({}, {}) - ({}, {})",
        all_features.len(),
        extent.xmin,
        extent.ymin,
        extent.xmax,
        extent.ymax
    );

    assemble_collection(all_features)
}

#[cfg(test)]
mod tests {
    use pop_scatter_feature_models::SpatialRef;

    use super::*;

    fn test_extent() -> Extent {
        Extent {
            xmin: -77.1,
            ymin: 38.8,
            xmax: -76.9,
            ymax: 39.0,
            spatial_ref: SpatialRef::WGS84,
        }
    }

    #[test]
    fn builds_envelope_query_url() {
        let url = build_query_url("https://example.com/arcgis/rest/services/tracts/0", &test_extent(), 0);
        assert!(url.starts_with("https://example.com/arcgis/rest/services/tracts/0/query?"));
        assert!(url.contains("geometry=-77.1,38.8,-76.9,39"));
        assert!(url.contains("geometryType=esriGeometryEnvelope"));
        assert!(url.contains("spatialRel=esriSpatialRelIntersects"));
        assert!(url.contains("inSR=4326"));
        assert!(url.contains("f=geojson"));
        assert!(url.contains("resultOffset=0"));
    }

    #[test]
    fn does_not_double_append_query() {
        let url = build_query_url("https://example.com/layer/0/query/", &test_extent(), 500);
        assert!(url.starts_with("https://example.com/layer/0/query?"));
        assert!(url.contains("resultOffset=500"));
    }

    #[test]
    fn detects_error_envelope() {
        let body = serde_json::json!({
            "error": { "code": 499, "message": "Token Required" }
        });
        let err = parse_page(&body).unwrap_err();
        match err {
            RemoteError::Service { code, message } => {
                assert_eq!(code, 499);
                assert_eq!(message, "Token Required");
            }
            other => panic!("expected Service error, got {other:?}"),
        }
    }

    #[test]
    fn parses_page_with_transfer_limit() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "exceededTransferLimit": true,
            "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [0, 0] }, "properties": {} }
            ]
        });
        let page = parse_page(&body).unwrap();
        assert_eq!(page.features.len(), 1);
        assert!(page.exceeded_transfer_limit);
    }

    #[test]
    fn missing_features_array_is_an_error() {
        let body = serde_json::json!({ "type": "FeatureCollection" });
        assert!(matches!(
            parse_page(&body),
            Err(RemoteError::Conversion { .. })
        ));
    }

    #[test]
    fn empty_page_terminates_without_error() {
        let body = serde_json::json!({ "type": "FeatureCollection", "features": [] });
        let page = parse_page(&body).unwrap();
        assert!(page.features.is_empty());
        assert!(!page.exceeded_transfer_limit);
    }

    #[test]
    fn assembles_accumulated_pages() {
        let features = vec![serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]
            },
            "properties": { "GEOID": "11001000100", "POP": 4321 }
        })];
        let collection = assemble_collection(features).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(
            collection.features[0].numeric_attribute("POP"),
            Some(4321.0)
        );
    }

    #[test]
    fn query_state_transitions_are_terminal() {
        let mut state = QueryState::NotQueried;
        assert!(!state.is_terminal());

        state.mark_queried(12);
        assert!(state.is_terminal());
        assert_eq!(state, QueryState::Queried { feature_count: 12 });

        let mut failed = QueryState::NotQueried;
        failed.mark_failed("no features intersect the query extent");
        assert!(failed.is_terminal());
    }

    #[test]
    #[should_panic(expected = "query state is terminal")]
    fn query_state_rejects_double_transition() {
        let mut state = QueryState::NotQueried;
        state.mark_queried(1);
        state.mark_failed("late failure");
    }
}
