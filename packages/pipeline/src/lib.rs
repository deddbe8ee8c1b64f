#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stage orchestration for the segregation metrics pipeline.
//!
//! Runs the stages in dependency order over one owned region store: spatial
//! index, grouping totals, pseudo-grouping totals, neighborhood search plus
//! index computation, then the local-regression normalizer. Regions with no
//! valid neighborhood or a zero reference denominator are logged, counted,
//! and dropped from the output; everything else is fatal.

use seg_map_metrics::{
    MetricsError, RegionMetrics, compute_grouping_totals, compute_pseudo_grouping_totals,
    compute_region_metrics,
};
use seg_map_models::{CensusYear, Region, SummaryLevel};
use seg_map_neighborhood::{Neighborhood, NeighborhoodSearch};
use seg_map_normalize::{NormalizeError, normalize_all};
use seg_map_spatial::{RegionIndex, SubdivisionBounds};
use thiserror::Error;

/// Run configuration with the original tool's defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which census geography the input records describe.
    pub summary_level: SummaryLevel,
    /// Census year of the input data.
    pub year: CensusYear,
    /// Target neighborhood population. Required at the tract and block-group
    /// levels; must stay 0 at the county-subdivision level.
    pub target_pop: u32,
    /// Maximum neighborhood radius in miles.
    pub max_radius_miles: f64,
    /// Exponential distance-weight decay rate.
    pub escale: f64,
    /// Multiplier on `target_pop` for pseudo-grouping neighborhoods.
    pub pseudo_target_factor: u32,
}

impl Config {
    /// A configuration with default tuning parameters.
    #[must_use]
    pub const fn new(summary_level: SummaryLevel, year: CensusYear) -> Self {
        Self {
            summary_level,
            year,
            target_pop: 0,
            max_radius_miles: 30.0,
            escale: 2.0,
            pseudo_target_factor: 10,
        }
    }

    /// Validates the level/target combination before any processing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the invalid combination.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.summary_level {
            SummaryLevel::CountySubdivision if self.target_pop != 0 => {
                return Err(ConfigError::TargetPopForbidden);
            }
            SummaryLevel::Tract | SummaryLevel::BlockGroup if self.target_pop == 0 => {
                return Err(ConfigError::TargetPopRequired {
                    level: self.summary_level,
                });
            }
            _ => {}
        }
        if self.max_radius_miles.is_nan() || self.max_radius_miles <= 0.0 {
            return Err(ConfigError::NonPositiveRadius(self.max_radius_miles));
        }
        Ok(())
    }
}

/// Invalid run configuration, reported before any processing begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Tract and block-group runs need a neighborhood population target.
    #[error("target population is required at the {level} summary level")]
    TargetPopRequired {
        /// The summary level missing a target.
        level: SummaryLevel,
    },

    /// County-subdivision runs use whole subdivisions, never a target.
    #[error("target population must not be set at the cousub summary level")]
    TargetPopForbidden,

    /// The neighborhood radius cap has to be positive.
    #[error("maximum radius must be positive, got {0}")]
    NonPositiveRadius(f64),
}

/// Fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The normalizer could not converge.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Per-run accounting of what was processed and what was dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Regions received from the input adapter.
    pub input: usize,
    /// Regions that made it to the output stream.
    pub output: usize,
    /// Regions dropped because no neighbor lies inside the maximum radius.
    pub skipped_sparse: usize,
    /// Regions dropped for a zero reference denominator or an unpopulated
    /// neighborhood.
    pub skipped_degenerate: usize,
}

/// Runs the full pipeline over an owned region store.
///
/// Returns the surviving regions in input order with every derived field
/// populated, plus the skip accounting. `bounds` supplies subdivision shapes
/// for pseudo-grouping construction at the county-subdivision level and is
/// ignored otherwise.
///
/// # Errors
///
/// * [`PipelineError::Config`] before any processing for an invalid
///   configuration.
/// * [`PipelineError::Normalize`] when a local regression design never
///   becomes solvable.
pub async fn run(
    mut regions: Vec<Region>,
    bounds: Option<&SubdivisionBounds>,
    config: &Config,
) -> Result<(Vec<Region>, RunStats), PipelineError> {
    config.validate()?;

    let mut stats = RunStats {
        input: regions.len(),
        ..RunStats::default()
    };

    let index = RegionIndex::build(&regions);
    compute_grouping_totals(&mut regions);
    compute_pseudo_grouping_totals(
        &mut regions,
        &index,
        bounds,
        config.summary_level,
        config.target_pop,
        config.pseudo_target_factor,
        config.max_radius_miles,
    );

    let computed = compute_all_metrics(&regions, &index, config, &mut stats);

    let mut keep = vec![false; regions.len()];
    for (i, m) in &computed {
        m.apply(&mut regions[*i]);
        keep[*i] = true;
    }

    let mut output: Vec<Region> = regions
        .into_iter()
        .enumerate()
        .filter_map(|(i, r)| keep[i].then_some(r))
        .collect();

    normalize_all(&mut output, config.summary_level).await?;

    stats.output = output.len();
    log::info!(
        "Pipeline kept {} of {} regions ({} sparse, {} degenerate)",
        stats.output,
        stats.input,
        stats.skipped_sparse,
        stats.skipped_degenerate
    );

    Ok((output, stats))
}

/// Neighborhood search plus index computation for every region.
///
/// Reads the store through a shared borrow and returns the computed values,
/// so the caller can apply them without aliasing the search's borrow.
fn compute_all_metrics(
    regions: &[Region],
    index: &RegionIndex,
    config: &Config,
    stats: &mut RunStats,
) -> Vec<(usize, RegionMetrics)> {
    let search = NeighborhoodSearch::new(regions, index, config.max_radius_miles);
    let mut computed = Vec::with_capacity(regions.len());

    for (i, region) in regions.iter().enumerate() {
        let nbd = if config.summary_level == SummaryLevel::CountySubdivision {
            Some(Neighborhood::self_only(i))
        } else {
            search.find(i, config.target_pop)
        };

        let Some(nbd) = nbd else {
            stats.skipped_sparse += 1;
            log::warn!(
                "Skipping region '{}': no neighbor within {} miles",
                region.name,
                config.max_radius_miles
            );
            continue;
        };

        match compute_region_metrics(regions, i, &nbd, config.escale) {
            Ok(m) => computed.push((i, m)),
            Err(e @ (MetricsError::EmptyNeighborhood { .. } | MetricsError::ZeroReference { .. })) => {
                stats.skipped_degenerate += 1;
                log::warn!("Skipping {e}");
            }
        }
    }

    computed
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    /// Five regions on a line with all pairwise distances distinct.
    fn line_scenario() -> Vec<Region> {
        let lons = [0.0, 0.1, 0.21, 0.33, 0.46];
        let pops = [1000, 2000, 1500, 3000, 500];
        let black = [100, 400, 300, 900, 50];
        let white = [800, 1400, 1000, 1800, 400];

        (0..5)
            .map(|i| {
                let mut r = Region::with_counts(
                    &format!("line{i}"),
                    lons[i],
                    42.0,
                    pops[i],
                    black[i],
                    white[i],
                );
                r.grouping = Some("100".to_string());
                r
            })
            .collect()
    }

    fn tract_config(target_pop: u32) -> Config {
        let mut config = Config::new(SummaryLevel::Tract, CensusYear::Y2010);
        config.target_pop = target_pop;
        config
    }

    #[test]
    fn config_requires_target_at_tract_level() {
        let config = Config::new(SummaryLevel::Tract, CensusYear::Y2010);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TargetPopRequired { .. })
        ));
    }

    #[test]
    fn config_forbids_target_at_cousub_level() {
        let mut config = Config::new(SummaryLevel::CountySubdivision, CensusYear::Y2000);
        config.target_pop = 5000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TargetPopForbidden)
        ));

        config.target_pop = 0;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn five_region_scenario_matches_hand_computation() {
        let (output, stats) = run(line_scenario(), None, &tract_config(3000))
            .await
            .unwrap();

        assert_eq!(stats.input, 5);
        assert_eq!(stats.output, 5);
        assert_eq!(stats.skipped_sparse, 0);

        // Neighborhood shapes: target matching keeps {0,1}, {1,0}, {2,1},
        // {3} alone, and {4,3}.
        let neighbors: Vec<usize> = output.iter().map(|r| r.neighbors).collect();
        assert_eq!(neighbors, vec![2, 2, 2, 1, 2]);
        let nbd_pops: Vec<u64> = output.iter().map(|r| r.neighborhood_pop).collect();
        assert_eq!(nbd_pops, vec![3000, 3000, 3500, 3000, 3500]);
        assert!((output[3].neighborhood_radius).abs() < TOL);

        // Grouping totals broadcast to every member.
        for r in &output {
            assert_eq!(r.grouping_total_pop, 8000);
            assert_eq!(r.grouping_black_only_pop, 1750);
            assert_eq!(r.grouping_white_only_pop, 5400);
        }

        // Weighted proportions and entropies, hand-computed with weights
        // 1 and exp(-2).
        let expect_p_black = [
            0.121_976_917_755_426_11,
            0.193_987_513_399_813_82,
            0.200_384_220_952_003_67,
            0.300_133_244_503_664_24,
            0.190_401_366_032_866_25,
        ];
        let expect_local_entropy = [
            0.640_273_431_942_682_2,
            0.801_999_306_489_707_2,
            0.861_046_043_313_724_1,
            0.897_918_656_375_995_5,
            0.641_502_928_675_231,
        ];
        let expect_regional_entropy = [
            0.681_805_548_761_620_5,
            0.793_961_612_578_761_4,
            0.852_725_563_743_733_8,
            0.897_918_656_375_995_5,
            0.789_003_883_318_933_6,
        ];
        let expect_black_isolation = [
            0.821_172_513_846_109_2,
            0.724_330_065_568_61,
            0.773_172_513_846_109_3,
            0.663_84,
            0.882_345_691_187_180_3,
        ];
        for (i, r) in output.iter().enumerate() {
            assert!((r.p_black - expect_p_black[i]).abs() < TOL, "p_black[{i}]");
            assert!(
                (r.local_entropy - expect_local_entropy[i]).abs() < TOL,
                "local_entropy[{i}]"
            );
            assert!(
                (r.regional_entropy - expect_regional_entropy[i]).abs() < TOL,
                "regional_entropy[{i}]"
            );
            assert!(
                (r.black_isolation - expect_black_isolation[i]).abs() < TOL,
                "black_isolation[{i}]"
            );
        }

        // A self-only neighborhood has identical local and regional entropy.
        assert!((output[3].local_entropy - output[3].regional_entropy).abs() < TOL);

        // Normalization populated finite residuals for every metric.
        for r in &output {
            for v in [
                r.bo_dissimilarity_resid,
                r.wo_dissimilarity_resid,
                r.black_isolation_resid,
                r.white_isolation_resid,
            ] {
                assert!(v.is_finite());
            }
        }
    }

    #[tokio::test]
    async fn isolated_region_is_excluded_from_output() {
        let mut regions = line_scenario();
        // Push the last region ~40 miles north; its nearest neighbor is now
        // outside the 30 mile cap.
        regions[4].lat = 42.58;

        let (output, stats) = run(regions, None, &tract_config(3000)).await.unwrap();

        assert_eq!(stats.skipped_sparse, 1);
        assert_eq!(output.len(), 4);
        assert!(output.iter().all(|r| r.name != "line4"));
    }

    #[tokio::test]
    async fn output_preserves_input_order() {
        let (output, _) = run(line_scenario(), None, &tract_config(3000))
            .await
            .unwrap();
        let names: Vec<&str> = output.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["line0", "line1", "line2", "line3", "line4"]);
    }

    #[tokio::test]
    async fn zero_reference_region_is_reported_and_dropped() {
        // A tiny all-Black geography: the non-Black grouping population is
        // zero, so isolation denominators vanish.
        let mut regions = vec![
            Region::with_counts("z0", 0.0, 42.0, 100, 100, 0),
            Region::with_counts("z1", 0.05, 42.0, 100, 100, 0),
        ];
        for r in &mut regions {
            r.grouping = Some("900".to_string());
        }

        let (output, stats) = run(regions, None, &tract_config(150)).await.unwrap();
        assert_eq!(output.len(), 0);
        assert_eq!(stats.skipped_degenerate, 2);
    }

    #[tokio::test]
    async fn cousub_level_uses_self_neighborhoods() {
        let mut regions = line_scenario();
        for (i, r) in regions.iter_mut().enumerate() {
            r.cousub = format!("c{i}");
        }
        let config = Config::new(SummaryLevel::CountySubdivision, CensusYear::Y2010);

        let (output, _) = run(regions, None, &config).await.unwrap();
        assert_eq!(output.len(), 5);
        for r in &output {
            assert_eq!(r.neighbors, 1);
            assert!((r.neighborhood_radius).abs() < TOL);
        }
    }
}
