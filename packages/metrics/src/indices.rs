//! Per-region segregation indices.
//!
//! Everything here is a pure function of the region store plus one
//! neighborhood; results come back in a [`RegionMetrics`] value that the
//! caller applies to the focal region, keeping reads and writes on the
//! shared store cleanly separated.

use seg_map_models::{METERS_PER_MILE, Region};
use seg_map_neighborhood::Neighborhood;

use crate::MetricsError;

/// Floor applied to aggregate proportions before taking logarithms.
const ENTROPY_FLOOR: f64 = 1e-4;

/// Clamps a ratio into [0, 1].
#[must_use]
pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Three-category Shannon entropy (Black / White / other), natural log.
///
/// Callers must pass proportions strictly inside (0, 1); pseudocounts and
/// the aggregate floor guarantee that upstream.
#[must_use]
pub fn entropy3(p_black: f64, p_white: f64) -> f64 {
    let p_other = 1.0 - p_black - p_white;
    -p_black * p_black.ln() - p_white * p_white.ln() - p_other * p_other.ln()
}

/// Computed indices for one region, ready to be written back to the store.
#[derive(Debug, Clone)]
pub struct RegionMetrics {
    /// Cumulative population of the populated neighborhood members.
    pub neighborhood_pop: u64,
    /// Neighborhood radius in miles.
    pub neighborhood_radius: f64,
    /// Count of populated members used.
    pub neighbors: usize,
    /// Smoothed Black proportion.
    pub p_black: f64,
    /// Smoothed White proportion.
    pub p_white: f64,
    /// Entropy of the focal region's own counts.
    pub local_entropy: f64,
    /// Entropy of the weighted neighborhood aggregate.
    pub regional_entropy: f64,
    /// Black isolation in [0, 1].
    pub black_isolation: f64,
    /// White isolation in [0, 1].
    pub white_isolation: f64,
    /// Black-vs-other dissimilarity in [0, 1].
    pub bo_dissimilarity: f64,
    /// White-vs-other dissimilarity in [0, 1].
    pub wo_dissimilarity: f64,
}

impl RegionMetrics {
    /// Writes the computed indices onto the focal region.
    pub fn apply(&self, r: &mut Region) {
        r.neighborhood_pop = self.neighborhood_pop;
        r.neighborhood_radius = self.neighborhood_radius;
        r.neighbors = self.neighbors;
        r.p_black = self.p_black;
        r.p_white = self.p_white;
        r.local_entropy = self.local_entropy;
        r.regional_entropy = self.regional_entropy;
        r.black_isolation = self.black_isolation;
        r.white_isolation = self.white_isolation;
        r.bo_dissimilarity = self.bo_dissimilarity;
        r.wo_dissimilarity = self.wo_dissimilarity;
    }
}

/// Weighted aggregates accumulated over the neighborhood members.
struct WeightedCounts {
    n_total: f64,
    n_black: f64,
    n_white: f64,
}

/// Computes all indices for `focal` from its neighborhood.
///
/// Weights decay exponentially with distance: `exp(-escale * d / radius)`,
/// or 1 for a self-only neighborhood. Pseudocounts (`pop+2`, `black+1`,
/// `white+1`) keep every proportion strictly inside (0, 1).
///
/// # Errors
///
/// * [`MetricsError::EmptyNeighborhood`] when no member has population.
/// * [`MetricsError::ZeroReference`] when a reference-area denominator is
///   zero and an isolation or dissimilarity ratio would be undefined.
pub fn compute_region_metrics(
    regions: &[Region],
    focal: usize,
    nbd: &Neighborhood,
    escale: f64,
) -> Result<RegionMetrics, MetricsError> {
    let radius_m = nbd.radius_m();

    let mut neighborhood_pop: u64 = 0;
    let mut neighbors = 0_usize;
    let mut local_entropy = 0.0;
    let mut counts = WeightedCounts {
        n_total: 0.0,
        n_black: 0.0,
        n_white: 0.0,
    };
    let mut p_black = 0.0;
    let mut p_white = 0.0;
    let mut dt = 0.0;

    for (j, &idx) in nbd.members.iter().enumerate() {
        let z = &regions[idx];
        if z.total_pop == 0 {
            continue;
        }
        neighbors += 1;
        neighborhood_pop += u64::from(z.total_pop);

        let w = if radius_m == 0.0 {
            1.0
        } else {
            (-escale * nbd.distances_m[j] / radius_m).exp()
        };

        let popt = 2.0 + f64::from(z.total_pop);
        let bopt = 1.0 + f64::from(z.black_only_pop);
        let wopt = 1.0 + f64::from(z.white_only_pop);

        counts.n_total += w * popt;
        counts.n_black += w * bopt;
        counts.n_white += w * wopt;

        let pb = bopt / popt;
        let pw = wopt / popt;

        // The local entropy reflects the focal region alone.
        if j == 0 {
            local_entropy = entropy3(pb, pw);
        }

        p_black += w * popt * pb;
        p_white += w * popt * pw;
        dt += w * popt;
    }

    if neighbors == 0 || dt <= 0.0 {
        return Err(MetricsError::EmptyNeighborhood {
            name: regions[focal].name.clone(),
        });
    }
    p_black /= dt;
    p_white /= dt;

    let r = &regions[focal];
    let (black_isolation, bo_dissimilarity, white_isolation, wo_dissimilarity) =
        isolation_dissimilarity(r, &counts)?;

    let regional_entropy = {
        let pb = (counts.n_black / counts.n_total).max(ENTROPY_FLOOR);
        let pw = (counts.n_white / counts.n_total).max(ENTROPY_FLOOR);
        let po = (1.0 - pb - pw).max(ENTROPY_FLOOR);
        -pb * pb.ln() - pw * pw.ln() - po * po.ln()
    };

    Ok(RegionMetrics {
        neighborhood_pop,
        neighborhood_radius: radius_m / METERS_PER_MILE,
        neighbors,
        p_black,
        p_white,
        local_entropy,
        regional_entropy,
        black_isolation,
        white_isolation,
        bo_dissimilarity,
        wo_dissimilarity,
    })
}

/// A reference denominator that must be strictly positive.
fn positive(
    value: f64,
    r: &Region,
    denominator: &'static str,
) -> Result<f64, MetricsError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(MetricsError::ZeroReference {
            name: r.name.clone(),
            denominator,
        })
    }
}

/// Isolation and dissimilarity against the reference area.
///
/// Grouped regions compare the weighted neighborhood aggregates against
/// their statistical area's totals. Ungrouped regions compare against their
/// pseudo-grouping totals, with the numerator conventions the original
/// implementation used (raw focal counts for the Black-side measures and
/// the White isolation, weighted aggregates for the White dissimilarity).
#[allow(clippy::similar_names)]
fn isolation_dissimilarity(
    r: &Region,
    counts: &WeightedCounts,
) -> Result<(f64, f64, f64, f64), MetricsError> {
    let (black_iso, bo_dis, white_iso, wo_dis);

    if r.is_grouped() {
        #[allow(clippy::cast_precision_loss)]
        let (g_total, g_black, g_white) = (
            r.grouping_total_pop as f64,
            r.grouping_black_only_pop as f64,
            r.grouping_white_only_pop as f64,
        );
        let other_b = positive(g_total - g_black, r, "non-Black grouping")?;
        let other_w = positive(g_total - g_white, r, "non-White grouping")?;
        let ref_black = positive(g_black, r, "Black grouping")?;
        let ref_white = positive(g_white, r, "White grouping")?;

        black_iso = clip01(1.0 - (counts.n_total - counts.n_black) / other_b);
        bo_dis = (clip01(counts.n_black / ref_black)
            - clip01((counts.n_total - counts.n_black) / other_b))
        .abs();

        white_iso = clip01(1.0 - (counts.n_total - counts.n_white) / other_w);
        wo_dis = (clip01(counts.n_white / ref_white)
            - clip01((counts.n_total - counts.n_white) / other_w))
        .abs();
    } else {
        #[allow(clippy::cast_precision_loss)]
        let (p_total, p_black, p_white) = (
            r.pseudo_total_pop as f64,
            r.pseudo_black_only_pop as f64,
            r.pseudo_white_only_pop as f64,
        );
        let other_b = positive(p_total - p_black, r, "non-Black pseudo-grouping")?;
        let other_w = positive(p_total - p_white, r, "non-White pseudo-grouping")?;
        let ref_black = positive(p_black, r, "Black pseudo-grouping")?;
        let ref_white = positive(p_white, r, "White pseudo-grouping")?;

        let own_total = f64::from(r.total_pop);
        let own_black = f64::from(r.black_only_pop);
        let own_white = f64::from(r.white_only_pop);

        black_iso = clip01(1.0 - (own_total - own_black) / other_b);
        bo_dis = (clip01(own_black / ref_black) - clip01((own_total - own_black) / other_b)).abs();

        white_iso = clip01(1.0 - (own_total - own_white) / other_w);
        wo_dis = (clip01(counts.n_white / ref_white)
            - clip01((counts.n_total - counts.n_white) / other_w))
        .abs();
    }

    Ok((black_iso, bo_dis, white_iso, wo_dis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seg_map_neighborhood::Neighborhood;

    const TOL: f64 = 1e-9;

    fn two_region_store() -> (Vec<Region>, Neighborhood) {
        let mut r0 = Region::with_counts("focal", 0.0, 42.0, 100, 20, 70);
        let mut r1 = Region::with_counts("nbr", 0.05, 42.0, 100, 30, 60);
        for r in [&mut r0, &mut r1] {
            r.grouping = Some("100".to_string());
            r.grouping_total_pop = 200;
            r.grouping_black_only_pop = 50;
            r.grouping_white_only_pop = 130;
        }
        let nbd = Neighborhood {
            members: vec![0, 1],
            distances_m: vec![0.0, 4000.0],
        };
        (vec![r0, r1], nbd)
    }

    #[test]
    fn clip_bounds_ratios() {
        assert!((clip01(-0.5)).abs() < TOL);
        assert!((clip01(1.5) - 1.0).abs() < TOL);
        assert!((clip01(0.25) - 0.25).abs() < TOL);
    }

    #[test]
    fn uniform_three_way_split_has_log3_entropy() {
        let e = entropy3(1.0 / 3.0, 1.0 / 3.0);
        assert!((e - 1.098_612_288_668_109_8).abs() < TOL);
    }

    #[test]
    fn weighted_indices_match_hand_computation() {
        // Weights: focal 1, neighbor exp(-2) (escale 2, at the full radius).
        let (regions, nbd) = two_region_store();
        let m = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap();

        assert_eq!(m.neighbors, 2);
        assert_eq!(m.neighborhood_pop, 200);
        assert!((m.p_black - 0.217_568_913_923_737_03).abs() < TOL);
        assert!((m.p_white - 0.684_391_870_389_988_5).abs() < TOL);
        assert!((m.local_entropy - 0.805_256_211_401_273_8).abs() < TOL);
        assert!((m.regional_entropy - 0.819_068_044_932_841_9).abs() < TOL);
        assert!((m.black_isolation - 0.395_941_299_268_003_26).abs() < TOL);
        assert!((m.bo_dissimilarity - 0.100_150_825_125_296_83).abs() < TOL);
        assert!((m.white_isolation - 0.477_875_048_389_983_96).abs() < TOL);
        assert!((m.wo_dissimilarity - 0.087_532_373_601_009_96).abs() < TOL);
    }

    #[test]
    fn self_only_neighborhood_uses_unit_weight() {
        let (regions, _) = two_region_store();
        let nbd = Neighborhood::self_only(0);
        let m = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap();

        assert_eq!(m.neighbors, 1);
        assert!((m.neighborhood_radius).abs() < TOL);
        // With one member the smoothed proportions are its own pseudocount
        // proportions, and both entropies describe the same counts.
        assert!((m.p_black - 21.0 / 102.0).abs() < TOL);
        assert!((m.p_white - 71.0 / 102.0).abs() < TOL);
        assert!((m.local_entropy - 0.805_256_211_401_273_8).abs() < TOL);
    }

    #[test]
    fn all_indices_stay_in_unit_interval() {
        let (regions, nbd) = two_region_store();
        let m = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap();
        for v in [
            m.p_black,
            m.p_white,
            m.black_isolation,
            m.white_isolation,
            m.bo_dissimilarity,
            m.wo_dissimilarity,
        ] {
            assert!((0.0..=1.0).contains(&v), "out of range: {v}");
        }
    }

    #[test]
    fn zero_reference_population_is_reported() {
        let (mut regions, nbd) = two_region_store();
        regions[0].grouping_black_only_pop = 0;

        let err = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap_err();
        assert!(matches!(err, MetricsError::ZeroReference { .. }));
        assert!(err.to_string().contains("focal"));
    }

    #[test]
    fn empty_neighborhood_is_reported() {
        let (mut regions, nbd) = two_region_store();
        regions[0].total_pop = 0;
        regions[1].total_pop = 0;

        let err = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap_err();
        assert!(matches!(err, MetricsError::EmptyNeighborhood { .. }));
    }

    #[test]
    fn ungrouped_region_compares_against_pseudo_totals() {
        let (mut regions, nbd) = two_region_store();
        regions[0].grouping = None;
        regions[0].pseudo_total_pop = 400;
        regions[0].pseudo_black_only_pop = 80;
        regions[0].pseudo_white_only_pop = 280;

        let m = compute_region_metrics(&regions, 0, &nbd, 2.0).unwrap();
        // Black isolation from raw focal counts: 1 - 80/320 = 0.75.
        assert!((m.black_isolation - 0.75).abs() < TOL);
    }
}
