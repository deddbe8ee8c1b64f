#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Population-scale detrending of segregation indices.
//!
//! Each raw index is normalized in two passes of kernel-weighted local
//! regression against log population: pass 1 subtracts the local trend, pass
//! 2 refits the log of the absolute residual and rescales dispersion. Urban
//! regions (those inside a statistical area) use a 1-D fit against the area's
//! population; rural regions (ungrouped, county-subdivision runs only) use a
//! 3-D fit with bandwidth escalation when the local design is singular.
//!
//! The fitters are built once per pass and shared read-only; every region's
//! evaluation is an independent task, with a join barrier between passes.

pub mod locpoly;

use std::sync::Arc;

use seg_map_models::{Region, SummaryLevel};
use thiserror::Error;
use tokio::task::JoinSet;

pub use locpoly::{LocPoly, LocPoly3, SingularDesign};

/// Pass-1 (trend) bandwidth for the urban 1-D fit.
const URBAN_TREND_BW: f64 = 0.5;

/// Pass-2 (dispersion) bandwidth for the urban 1-D fit.
const URBAN_DISPERSION_BW: f64 = 0.75;

/// Starting bandwidth for the rural 3-D fit.
const RURAL_START_BW: f64 = 1.0;

/// Bandwidth doublings allowed before a singular design becomes fatal.
const MAX_BW_DOUBLINGS: u32 = 32;

/// Floor on the rural dispersion divisor, so near-zero local dispersion
/// estimates do not amplify noise.
const DISPERSION_FLOOR: f64 = 1e-2;

/// Errors from the normalization stage.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A region's local design never became solvable, even at the widest
    /// allowed bandwidth.
    #[error(
        "region '{name}': local design still singular after {doublings} bandwidth doublings"
    )]
    NoSolvableDesign {
        /// Name of the offending region.
        name: String,
        /// How many doublings were tried.
        doublings: u32,
    },

    /// A regression task could not be joined.
    #[error("regression task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// The four indices that get detrended, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Metric {
    /// Black-vs-other dissimilarity.
    #[strum(serialize = "Black-other dissimilarity")]
    BoDissimilarity,
    /// White-vs-other dissimilarity.
    #[strum(serialize = "White-other dissimilarity")]
    WoDissimilarity,
    /// Black isolation.
    #[strum(serialize = "Black isolation")]
    BlackIsolation,
    /// White isolation.
    #[strum(serialize = "White isolation")]
    WhiteIsolation,
}

impl Metric {
    /// Processing order for a full normalization run.
    pub const ALL: [Self; 4] = [
        Self::BoDissimilarity,
        Self::WoDissimilarity,
        Self::BlackIsolation,
        Self::WhiteIsolation,
    ];

    /// The raw index value.
    #[must_use]
    pub const fn raw(self, r: &Region) -> f64 {
        match self {
            Self::BoDissimilarity => r.bo_dissimilarity,
            Self::WoDissimilarity => r.wo_dissimilarity,
            Self::BlackIsolation => r.black_isolation,
            Self::WhiteIsolation => r.white_isolation,
        }
    }

    /// The current residual value.
    #[must_use]
    pub const fn resid(self, r: &Region) -> f64 {
        match self {
            Self::BoDissimilarity => r.bo_dissimilarity_resid,
            Self::WoDissimilarity => r.wo_dissimilarity_resid,
            Self::BlackIsolation => r.black_isolation_resid,
            Self::WhiteIsolation => r.white_isolation_resid,
        }
    }

    /// Overwrites the residual value.
    pub const fn set_resid(self, r: &mut Region, v: f64) {
        match self {
            Self::BoDissimilarity => r.bo_dissimilarity_resid = v,
            Self::WoDissimilarity => r.wo_dissimilarity_resid = v,
            Self::BlackIsolation => r.black_isolation_resid = v,
            Self::WhiteIsolation => r.white_isolation_resid = v,
        }
    }
}

/// Whether a region participates in the urban (grouped) normalization.
fn is_urban(r: &Region) -> bool {
    r.is_grouped() && r.neighborhood_pop > 0
}

/// Whether a region participates in the rural (ungrouped) normalization.
fn is_rural(r: &Region) -> bool {
    !r.is_grouped() && r.neighborhood_pop > 0
}

/// Log-population covariate for the urban fit.
#[allow(clippy::cast_precision_loss)]
fn urban_x(r: &Region) -> f64 {
    (r.grouping_total_pop as f64).ln_1p()
}

/// Covariate row for the rural fit; the leading 1 is the intercept column.
#[allow(clippy::cast_precision_loss)]
fn rural_row(r: &Region) -> [f64; 3] {
    [
        1.0,
        (r.neighborhood_pop as f64).ln_1p(),
        (r.pseudo_total_pop as f64).ln_1p(),
    ]
}

/// Normalizes all four metrics, urban then (for county-subdivision runs)
/// rural, one metric at a time.
///
/// # Errors
///
/// Returns [`NormalizeError::NoSolvableDesign`] when a rural region's design
/// stays singular past the escalation cap.
pub async fn normalize_all(
    regions: &mut [Region],
    level: SummaryLevel,
) -> Result<(), NormalizeError> {
    for metric in Metric::ALL {
        process_urban(regions, metric).await?;
        if level == SummaryLevel::CountySubdivision {
            process_rural(regions, metric).await?;
        }
        log::info!("Normalized {metric}");
    }
    Ok(())
}

/// Two-pass 1-D normalization over regions with a statistical area.
///
/// # Errors
///
/// Returns [`NormalizeError::Task`] if a fan-out task cannot be joined.
pub async fn process_urban(regions: &mut [Region], metric: Metric) -> Result<(), NormalizeError> {
    // Pass 1: remove the population-scale trend.
    let design: Vec<(f64, f64)> = regions
        .iter()
        .filter(|r| is_urban(r))
        .map(|r| (urban_x(r), metric.raw(r)))
        .collect();
    if design.is_empty() {
        return Ok(());
    }
    let lp = Arc::new(LocPoly::new(design));

    let mut tasks: JoinSet<(usize, f64)> = JoinSet::new();
    for (i, r) in regions.iter().enumerate() {
        if !is_urban(r) {
            continue;
        }
        let lp = Arc::clone(&lp);
        let (x, raw) = (urban_x(r), metric.raw(r));
        tasks.spawn(async move { (i, raw - lp.fit(x, URBAN_TREND_BW)) });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, v) = joined?;
        metric.set_resid(&mut regions[i], v);
    }

    // Pass 2: rescale the dispersion.
    let design: Vec<(f64, f64)> = regions
        .iter()
        .filter(|r| is_urban(r))
        .map(|r| (urban_x(r), metric.resid(r).abs().ln()))
        .collect();
    let lp = Arc::new(LocPoly::new(design));

    let mut tasks: JoinSet<(usize, f64)> = JoinSet::new();
    for (i, r) in regions.iter().enumerate() {
        if !is_urban(r) {
            continue;
        }
        let lp = Arc::clone(&lp);
        let (x, resid) = (urban_x(r), metric.resid(r));
        tasks.spawn(async move { (i, resid / lp.fit(x, URBAN_DISPERSION_BW).exp()) });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, v) = joined?;
        metric.set_resid(&mut regions[i], v);
    }

    Ok(())
}

/// Fits one rural evaluation, widening the bandwidth until solvable.
fn fit_escalating(
    lp: &LocPoly3,
    x: [f64; 3],
    name: &str,
) -> Result<f64, NormalizeError> {
    let mut bw = RURAL_START_BW;
    for _ in 0..=MAX_BW_DOUBLINGS {
        if let Ok(yh) = lp.fit(x, bw) {
            return Ok(yh);
        }
        bw *= 2.0;
    }
    Err(NormalizeError::NoSolvableDesign {
        name: name.to_string(),
        doublings: MAX_BW_DOUBLINGS,
    })
}

/// Two-pass 3-D normalization over ungrouped regions.
///
/// # Errors
///
/// Returns [`NormalizeError::NoSolvableDesign`] when a region's design stays
/// singular past the escalation cap, or [`NormalizeError::Task`] on join
/// failure.
pub async fn process_rural(regions: &mut [Region], metric: Metric) -> Result<(), NormalizeError> {
    // Pass 1: remove the mean trend.
    let mut x = Vec::new();
    let mut y = Vec::new();
    for r in regions.iter().filter(|r| is_rural(r)) {
        x.push(rural_row(r));
        y.push(metric.raw(r));
    }
    if y.is_empty() {
        return Ok(());
    }
    let lp = Arc::new(LocPoly3::new(x, y));

    let mut tasks: JoinSet<Result<(usize, f64), NormalizeError>> = JoinSet::new();
    for (i, r) in regions.iter().enumerate() {
        if !is_rural(r) {
            continue;
        }
        let lp = Arc::clone(&lp);
        let mut eval = rural_row(r);
        eval[0] = 0.0;
        let raw = metric.raw(r);
        let name = r.name.clone();
        tasks.spawn(async move {
            let yh = fit_escalating(&lp, eval, &name)?;
            Ok((i, raw - yh))
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, v) = joined??;
        metric.set_resid(&mut regions[i], v);
    }

    // Pass 2: rescale the dispersion, with a floor on the divisor.
    let mut x = Vec::new();
    let mut y = Vec::new();
    for r in regions.iter().filter(|r| is_rural(r)) {
        x.push(rural_row(r));
        y.push(metric.resid(r).abs().ln());
    }
    let lp = Arc::new(LocPoly3::new(x, y));

    let mut tasks: JoinSet<Result<(usize, f64), NormalizeError>> = JoinSet::new();
    for (i, r) in regions.iter().enumerate() {
        if !is_rural(r) {
            continue;
        }
        let lp = Arc::clone(&lp);
        let mut eval = rural_row(r);
        eval[0] = 0.0;
        let resid = metric.resid(r);
        let name = r.name.clone();
        tasks.spawn(async move {
            let yh = fit_escalating(&lp, eval, &name)?;
            Ok((i, resid / yh.exp().max(DISPERSION_FLOOR)))
        });
    }
    while let Some(joined) = tasks.join_next().await {
        let (i, v) = joined??;
        metric.set_resid(&mut regions[i], v);
    }

    Ok(())
}
