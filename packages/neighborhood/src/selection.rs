//! Neighbor selection for pseudo-grouping reference areas.
//!
//! Ungrouped county subdivisions get a substitute reference area built from
//! spatial neighbors: preferably the subdivisions whose padded bounding boxes
//! intersect the focal subdivision's box, otherwise one nearest neighbor per
//! compass quadrant.

use std::f64::consts::PI;

use seg_map_models::Region;
use seg_map_spatial::{RegionIndex, SubdivisionBounds};

/// How many nearest points are screened for bounding-box intersection.
const BOUNDS_CANDIDATES: usize = 20;

/// Largest k tried when filling compass quadrants.
const QUADRANT_CANDIDATES: usize = 10;

/// Compass quadrant (0..=3) of `q` relative to `r`.
///
/// Buckets are counterclockwise from due west: 0 is south-west, 1 south-east,
/// 2 north-east, 3 north-west. The seam at exactly due west folds into
/// bucket 3.
#[must_use]
pub fn quadrant(r: [f64; 2], q: [f64; 2]) -> usize {
    let angle = (q[1] - r[1]).atan2(q[0] - r[0]);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ((2.0 * (1.0 + angle / PI)).floor() as usize).min(3)
    }
}

/// One nearest neighbor per compass quadrant around the focal region.
///
/// Grows the query until all four quadrants are filled or the candidate
/// budget runs out; sparse geographies legitimately leave quadrants empty.
#[must_use]
pub fn select_by_quadrant(
    regions: &[Region],
    index: &RegionIndex,
    focal: usize,
) -> [Option<usize>; 4] {
    let location = regions[focal].location();
    let mut nbrs = [None; 4];

    for k in 4..=QUADRANT_CANDIDATES {
        for j in index.k_nearest(location, k) {
            if j == focal {
                continue;
            }
            let q = quadrant(location, regions[j].location());
            if nbrs[q].is_none() {
                nbrs[q] = Some(j);
            }
        }
        if nbrs.iter().all(Option::is_some) {
            break;
        }
    }

    nbrs
}

/// Neighboring subdivisions whose shapes sit against the focal subdivision.
///
/// Screens the nearest points and keeps those whose bounding box intersects
/// the focal subdivision's padded box. The focal region itself is excluded;
/// callers add its counts exactly once.
#[must_use]
pub fn select_by_bounds(
    regions: &[Region],
    index: &RegionIndex,
    bounds: &SubdivisionBounds,
    focal: usize,
) -> Vec<usize> {
    let focal_cousub = &regions[focal].cousub;

    index
        .k_nearest(regions[focal].location(), BOUNDS_CANDIDATES)
        .into_iter()
        .filter(|&j| j != focal && bounds.padded_intersects(focal_cousub, &regions[j].cousub))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_partition_the_compass() {
        let origin = [0.0, 0.0];
        assert_eq!(quadrant(origin, [-1.0, -1.0]), 0);
        assert_eq!(quadrant(origin, [1.0, -1.0]), 1);
        assert_eq!(quadrant(origin, [1.0, 1.0]), 2);
        assert_eq!(quadrant(origin, [-1.0, 1.0]), 3);
        // The due-west seam folds into the top bucket instead of overflowing.
        assert_eq!(quadrant(origin, [-1.0, 0.0]), 3);
    }

    #[test]
    fn one_neighbor_selected_per_quadrant() {
        let mut regions = vec![Region::with_counts("center", 0.0, 0.0, 100, 10, 80)];
        for (i, (lon, lat)) in [(-0.1, -0.1), (0.1, -0.1), (0.1, 0.1), (-0.1, 0.1)]
            .iter()
            .enumerate()
        {
            regions.push(Region::with_counts(&format!("n{i}"), *lon, *lat, 100, 10, 80));
        }
        // A farther region in the north-east must not displace the nearer one.
        regions.push(Region::with_counts("far", 0.3, 0.3, 100, 10, 80));

        let index = RegionIndex::build(&regions);
        let nbrs = select_by_quadrant(&regions, &index, 0);

        assert_eq!(nbrs, [Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn bounds_selection_keeps_touching_subdivisions_only() {
        let mut regions = vec![
            Region::with_counts("a", 0.5, 0.5, 100, 10, 80),
            Region::with_counts("b", 1.5, 0.5, 200, 20, 160),
            Region::with_counts("c", 5.5, 0.5, 300, 30, 240),
        ];
        for (i, r) in regions.iter_mut().enumerate() {
            r.cousub = format!("s{i}");
        }

        let mut bounds = SubdivisionBounds::new();
        bounds.insert("s0", [0.0, 0.0], [1.0, 1.0]);
        bounds.insert("s1", [1.0, 0.0], [2.0, 1.0]);
        bounds.insert("s2", [5.0, 0.0], [6.0, 1.0]);

        let index = RegionIndex::build(&regions);
        assert_eq!(select_by_bounds(&regions, &index, &bounds, 0), vec![1]);
    }
}
