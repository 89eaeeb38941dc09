#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Attribute transfer between point layers.
//!
//! The sampled points only know which polygon stratum produced them; this
//! stage restores the original point records' attributes onto them. Both
//! layers get a temporary synthetic join key valued by row position, the
//! attributes are copied across matching keys, and the key field is
//! removed again on every exit path — the output never carries it, and a
//! stale key left behind by an aborted run is overwritten rather than
//! trusted.

use std::collections::BTreeMap;

use pop_scatter_feature_models::{Attributes, FeatureCollection};
use thiserror::Error;

/// Name of the temporary synthetic join key field.
pub const JOIN_KEY_FIELD: &str = "scatter_key";

/// Errors from attribute transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The layers cannot be joined one-to-one.
    #[error("Record count mismatch: {sampled} sampled points vs {originals} original points")]
    RecordCountMismatch {
        /// Sampled layer record count.
        sampled: usize,
        /// Original layer record count.
        originals: usize,
    },

    /// A sampled point's key matched no original record.
    #[error("Join key {key} has no matching original record")]
    UnmatchedKey {
        /// The orphaned key value.
        key: i64,
    },
}

/// Assigns the synthetic join key to every feature, valued by row
/// position. Any pre-existing value under `field` (e.g. left behind by an
/// aborted earlier run) is overwritten, so a re-run behaves exactly like
/// a first run.
pub fn add_join_keys(collection: &mut FeatureCollection, field: &str) {
    for (index, feature) in collection.features.iter_mut().enumerate() {
        feature
            .attributes
            .insert(field.to_string(), serde_json::json!(index as u64));
    }
}

/// Removes the synthetic join key from every feature.
pub fn strip_join_keys(collection: &mut FeatureCollection, field: &str) {
    for feature in &mut collection.features {
        feature.attributes.remove(field);
    }
}

/// Copies each original record's attributes onto the sampled point with
/// the matching key. The original's value wins on a field-name collision;
/// restoring the original record is the whole point of this stage.
fn join_by_key(
    sampled: &mut FeatureCollection,
    originals_by_key: &BTreeMap<i64, Attributes>,
    field: &str,
) -> Result<(), TransferError> {
    for feature in &mut sampled.features {
        let key = feature
            .attributes
            .get(field)
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(-1);

        let source = originals_by_key
            .get(&key)
            .ok_or(TransferError::UnmatchedKey { key })?;

        for (name, value) in source {
            if name != field {
                feature.attributes.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Transfers original point attributes onto the sampled points.
///
/// Requires a one-to-one correspondence (the sampler was invoked with
/// exactly the original record count, so the lengths must match). The
/// join key field is added to both layers before the join and removed
/// from both on every exit path, success or error.
///
/// # Errors
///
/// Returns [`TransferError`] if the record counts differ or a key has no
/// match.
pub fn transfer(
    sampled: &mut FeatureCollection,
    originals: &mut FeatureCollection,
) -> Result<(), TransferError> {
    if sampled.len() != originals.len() {
        return Err(TransferError::RecordCountMismatch {
            sampled: sampled.len(),
            originals: originals.len(),
        });
    }

    add_join_keys(sampled, JOIN_KEY_FIELD);
    add_join_keys(originals, JOIN_KEY_FIELD);

    let originals_by_key: BTreeMap<i64, Attributes> = originals
        .features
        .iter()
        .filter_map(|f| {
            f.attributes
                .get(JOIN_KEY_FIELD)
                .and_then(serde_json::Value::as_i64)
                .map(|key| (key, f.attributes.clone()))
        })
        .collect();

    let result = join_by_key(sampled, &originals_by_key, JOIN_KEY_FIELD);

    strip_join_keys(sampled, JOIN_KEY_FIELD);
    strip_join_keys(originals, JOIN_KEY_FIELD);

    if result.is_ok() {
        log::info!(
            "Transferred attributes from {} original records onto sampled points",
            originals.len()
        );
    }

    result
}
