#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Orchestration of the pop-scatter pipeline.
//!
//! Wires the stages together — load inputs, obtain the census weighting
//! surface (local file or remote feature service), build the precise
//! study area, stratified-sample, transfer attributes, write output —
//! and owns the cross-cutting concerns: run configuration, the error
//! taxonomy, the run-scoped scratch workspace, and progress reporting.
//!
//! The workflow is all-or-nothing per run. There is no retry policy and
//! no partial-success mode; every failure is surfaced verbatim and halts
//! the run.

pub mod config;
pub mod progress;
pub mod run;
pub mod workspace;

use pop_scatter_feature::FeatureError;
use pop_scatter_remote::RemoteError;
use pop_scatter_sampler::SampleError;
use pop_scatter_study_area::StudyAreaError;
use pop_scatter_transfer::TransferError;
use thiserror::Error;

pub use config::{CensusSource, PartialConfig, RunConfig};
pub use run::{RunOutcome, RunReport, run};
pub use workspace::RunWorkspace;

/// Errors that halt a pop-scatter run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The run configuration is unusable; raised before any I/O or
    /// network call.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The weighting surface came back empty; downstream sampling is
    /// undefined over an empty surface.
    #[error("Empty study area: {message}")]
    EmptyStudyArea {
        /// Which stage produced the empty surface.
        message: String,
    },

    /// `GeoJSON` reading, writing, or conversion failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// The remote feature service query failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Study-area construction failed.
    #[error(transparent)]
    StudyArea(#[from] StudyAreaError),

    /// Stratified sampling failed.
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Attribute transfer failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else; surfaced with its message.
    #[error("Unexpected error: {message}")]
    Unexpected {
        /// The underlying error message.
        message: String,
    },
}

/// The error taxonomy reported to the user: which class of failure
/// halted the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration, caught before any computation.
    Configuration,
    /// The query or intersection produced no weighting surface.
    EmptyResult,
    /// A pipeline stage failed while executing.
    Execution,
    /// An unclassified failure.
    Unexpected,
}

impl WorkflowError {
    /// Classifies the error for reporting.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::EmptyStudyArea { .. } => ErrorKind::EmptyResult,
            Self::Feature(_)
            | Self::Remote(_)
            | Self::StudyArea(_)
            | Self::Sample(_)
            | Self::Transfer(_)
            | Self::Io(_) => ErrorKind::Execution,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_classify_into_the_reporting_taxonomy() {
        let config = WorkflowError::Configuration {
            message: "no points path".into(),
        };
        assert_eq!(config.kind(), ErrorKind::Configuration);

        let empty = WorkflowError::EmptyStudyArea {
            message: "remote query returned 0 features".into(),
        };
        assert_eq!(empty.kind(), ErrorKind::EmptyResult);

        let exec = WorkflowError::Sample(SampleError::NoPolygons);
        assert_eq!(exec.kind(), ErrorKind::Execution);

        let unexpected = WorkflowError::Unexpected {
            message: "boom".into(),
        };
        assert_eq!(unexpected.kind(), ErrorKind::Unexpected);
    }
}
