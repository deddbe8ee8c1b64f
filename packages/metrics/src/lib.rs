#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Segregation index computation.
//!
//! Two stages live here: aggregate statistics (statistical-area population
//! totals and their spatial substitutes for ungrouped regions) and the
//! per-region index computation (smoothed proportions, entropy, isolation,
//! dissimilarity) over an exponential-distance-weighted neighborhood.

pub mod aggregate;
pub mod indices;

use thiserror::Error;

pub use aggregate::{compute_grouping_totals, compute_pseudo_grouping_totals};
pub use indices::{RegionMetrics, clip01, compute_region_metrics, entropy3};

/// Per-region conditions surfaced by the metrics stage.
///
/// Both variants are recoverable at the pipeline level: the offending region
/// is reported, excluded from output, and counted.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Every neighborhood member has zero population, so no weighted
    /// aggregate exists.
    #[error("region '{name}': neighborhood has no populated members")]
    EmptyNeighborhood {
        /// Name of the offending region.
        name: String,
    },

    /// A reference-area denominator is zero, which would make an isolation
    /// or dissimilarity ratio undefined.
    #[error("region '{name}': zero {denominator} reference population")]
    ZeroReference {
        /// Name of the offending region.
        name: String,
        /// Which reference count was zero.
        denominator: &'static str,
    },
}
