//! Reference-area population totals.
//!
//! Grouped regions use their statistical area's summed counts as the
//! isolation/dissimilarity denominator. Ungrouped regions get a substitute
//! built from spatial neighbors: bounding-box or quadrant selection at the
//! county-subdivision level, an enlarged population-target neighborhood at
//! the tract and block-group levels.

use std::collections::BTreeMap;

use seg_map_models::{Region, SummaryLevel};
use seg_map_neighborhood::{NeighborhoodSearch, select_by_bounds, select_by_quadrant};
use seg_map_spatial::{RegionIndex, SubdivisionBounds};

/// Sums total/Black/White population per statistical area and broadcasts the
/// sums back onto every member region.
///
/// Ungrouped regions are untouched; they are handled by
/// [`compute_pseudo_grouping_totals`].
pub fn compute_grouping_totals(regions: &mut [Region]) {
    let mut totals: BTreeMap<&str, [u64; 3]> = BTreeMap::new();

    for r in regions.iter() {
        if let Some(code) = &r.grouping {
            let t = totals.entry(code).or_default();
            t[0] += u64::from(r.total_pop);
            t[1] += u64::from(r.black_only_pop);
            t[2] += u64::from(r.white_only_pop);
        }
    }
    let grouped = totals.len();

    // Broadcasting mutates, so the borrow on the codes has to end first.
    let totals: BTreeMap<String, [u64; 3]> = totals
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    for r in regions.iter_mut() {
        if let Some(code) = &r.grouping
            && let Some(t) = totals.get(code.as_str())
        {
            r.grouping_total_pop = t[0];
            r.grouping_black_only_pop = t[1];
            r.grouping_white_only_pop = t[2];
        }
    }

    log::info!("Computed population totals for {grouped} statistical areas");
}

/// Builds substitute reference-area totals for every ungrouped region.
///
/// At the county-subdivision level neighbors come from padded bounding-box
/// intersection when shape bounds are available, otherwise one nearest
/// neighbor per compass quadrant. At finer levels the substitute is the
/// cumulative count of a neighborhood matched to
/// `pseudo_target_factor * target_pop`.
///
/// Returns how many regions received pseudo totals.
pub fn compute_pseudo_grouping_totals(
    regions: &mut [Region],
    index: &RegionIndex,
    bounds: Option<&SubdivisionBounds>,
    level: SummaryLevel,
    target_pop: u32,
    pseudo_target_factor: u32,
    max_radius_miles: f64,
) -> usize {
    // Member selection only reads the store; updates are applied afterwards
    // so the search can hold its shared borrow.
    let mut updates: Vec<(usize, [u64; 3])> = Vec::new();
    {
        let search = NeighborhoodSearch::new(regions, index, max_radius_miles);
        let pseudo_target = target_pop.saturating_mul(pseudo_target_factor);

        for (i, r) in regions.iter().enumerate() {
            if r.is_grouped() {
                continue;
            }

            let members: Vec<usize> = match level {
                SummaryLevel::CountySubdivision => match bounds {
                    Some(b) => select_by_bounds(regions, index, b, i),
                    None => select_by_quadrant(regions, index, i)
                        .into_iter()
                        .flatten()
                        .collect(),
                },
                SummaryLevel::Tract | SummaryLevel::BlockGroup => search
                    .find(i, pseudo_target)
                    .map(|nbd| nbd.members)
                    .unwrap_or_default(),
            };

            let mut t = [
                u64::from(r.total_pop),
                u64::from(r.black_only_pop),
                u64::from(r.white_only_pop),
            ];
            for &j in &members {
                if j == i {
                    continue;
                }
                t[0] += u64::from(regions[j].total_pop);
                t[1] += u64::from(regions[j].black_only_pop);
                t[2] += u64::from(regions[j].white_only_pop);
            }
            updates.push((i, t));
        }
    }

    let count = updates.len();
    for (i, t) in updates {
        let r = &mut regions[i];
        r.pseudo_total_pop = t[0];
        r.pseudo_black_only_pop = t[1];
        r.pseudo_white_only_pop = t[2];
    }

    log::info!("Computed pseudo-grouping totals for {count} ungrouped regions");
    count
}
