#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Adaptive neighborhood discovery for segregation metrics.
//!
//! For a focal region, [`NeighborhoodSearch`] grows a candidate set from the
//! spatial index until it captures a target population, trims it by a maximum
//! radius, and refines it to the prefix whose cumulative population is closest
//! to the target. The crate also provides the two neighbor-selection schemes
//! used to build pseudo-grouping reference areas for county subdivisions.

pub mod search;
pub mod selection;

pub use search::{Neighborhood, NeighborhoodSearch};
pub use selection::{quadrant, select_by_bounds, select_by_quadrant};
