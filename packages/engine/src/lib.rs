#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatio-temporal hotspot clustering and danger scoring.
//!
//! A run takes a point snapshot and a filter and produces a ranked set of
//! hotspots:
//!
//! 1. [`filter`] narrows the snapshot to the working set.
//! 2. [`temporal`] and [`trend`] derive a recency weight and a local trend
//!    score for every record.
//! 3. [`primary`] clusters the working set by great-circle distance.
//! 4. [`refine`] splits oversized clusters in a recency-weighted feature
//!    space.
//! 5. [`prune`] drops spatial outliers and compacts cluster ids.
//! 6. [`score`] ranks clusters by a composite danger score and flags the
//!    alert-worthy ones.
//!
//! [`report`] turns the result into a `GeoJSON` `FeatureCollection`, and
//! [`pipeline`] wires the stages together behind the result cache.

pub mod density;
pub mod filter;
pub mod pipeline;
pub mod primary;
pub mod progress;
pub mod prune;
pub mod refine;
pub mod report;
pub mod score;
pub mod temporal;
pub mod trend;

pub use density::{DensityClusterer, DensityParams, DistanceMetric, FeatureMatrix, Hdbscan};
pub use pipeline::{Analysis, HotspotPipeline, RunOutcome};
pub use progress::{NullProgress, ProgressCallback, null_progress};

use hotspot_cache::CacheError;
use hotspot_engine_models::ConfigError;
use hotspot_incident_models::IncidentRecord;
use hotspot_snapshot::SnapshotError;

/// Errors that can occur during a hotspot analysis run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The snapshot could not be read or parsed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The result cache could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The density clusterer rejected its input.
    #[error("Clustering failed: {0}")]
    Density(#[from] density::DensityError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The primary parameter table has no tier for the working set.
    #[error("No primary clustering parameter tier configured")]
    NoParameterTier,

    /// A serialized report could not be interpreted.
    #[error("Invalid report: {0}")]
    InvalidReport(String),
}

/// Working-set records with their derived per-record columns.
///
/// All three slices are index-aligned.
#[derive(Debug, Clone, Copy)]
pub struct RecordColumns<'a> {
    /// Working-set records.
    pub records: &'a [IncidentRecord],
    /// Temporal weight per record.
    pub weights: &'a [f64],
    /// Trend score per record.
    pub trends: &'a [f64],
}
