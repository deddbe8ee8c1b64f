#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index over region representative points.
//!
//! Built once after all regions are loaded and read-only afterwards. The
//! R-tree stores indices into the region store rather than references, so the
//! store stays the single owner of every [`Region`].

use std::collections::BTreeMap;

use geo::{Coord, Distance, Haversine, Intersects, Point, Rect};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use seg_map_models::Region;

/// Padding in degrees applied to a subdivision box before intersection tests.
const BOUNDS_PAD_DEG: f64 = 0.001;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// R-tree of `(lon, lat) -> region index` entries.
///
/// Nearest-neighbor order is planar in degrees; callers that need true
/// distances re-sort by [`haversine_m`].
pub struct RegionIndex {
    tree: RTree<IndexedPoint>,
}

impl RegionIndex {
    /// Bulk-loads the index from the region store.
    #[must_use]
    pub fn build(regions: &[Region]) -> Self {
        let entries: Vec<IndexedPoint> = regions
            .iter()
            .enumerate()
            .map(|(i, r)| GeomWithData::new(r.location(), i))
            .collect();
        log::info!("Built spatial index over {} regions", entries.len());

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices of up to `k` regions nearest to `point`.
    ///
    /// A region whose own point is queried appears in its own result set.
    #[must_use]
    pub fn k_nearest(&self, point: [f64; 2], k: usize) -> Vec<usize> {
        self.tree
            .nearest_neighbor_iter(&point)
            .take(k)
            .map(|e| e.data)
            .collect()
    }

    /// Number of indexed regions.
    #[must_use]
    pub fn size(&self) -> usize {
        self.tree.size()
    }
}

/// Great-circle distance in meters between two `(lon, lat)` points.
#[must_use]
pub fn haversine_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    Haversine.distance(Point::new(a[0], a[1]), Point::new(b[0], b[1]))
}

/// Bounding boxes of county-subdivision shapes, keyed by subdivision code.
///
/// Loaded by the external shapefile adapter; used to build pseudo-grouping
/// reference areas for ungrouped subdivisions.
#[derive(Default)]
pub struct SubdivisionBounds {
    boxes: BTreeMap<String, Rect<f64>>,
}

impl SubdivisionBounds {
    /// An empty bounds map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the bounding box of one subdivision shape.
    pub fn insert(&mut self, cousub: &str, min: [f64; 2], max: [f64; 2]) {
        let rect = Rect::new(
            Coord {
                x: min[0],
                y: min[1],
            },
            Coord {
                x: max[0],
                y: max[1],
            },
        );
        self.boxes.insert(cousub.to_string(), rect);
    }

    /// Whether the padded box of subdivision `a` intersects the box of `b`.
    ///
    /// Subdivisions with no registered shape never intersect anything.
    #[must_use]
    pub fn padded_intersects(&self, a: &str, b: &str) -> bool {
        match (self.boxes.get(a), self.boxes.get(b)) {
            (Some(ra), Some(rb)) => pad(ra).intersects(rb),
            _ => false,
        }
    }

    /// Number of registered shapes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether no shapes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

fn pad(r: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: r.min().x - BOUNDS_PAD_DEG,
            y: r.min().y - BOUNDS_PAD_DEG,
        },
        Coord {
            x: r.max().x + BOUNDS_PAD_DEG,
            y: r.max().y + BOUNDS_PAD_DEG,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_regions() -> Vec<Region> {
        (0..5)
            .map(|i| {
                Region::with_counts(&format!("r{i}"), f64::from(i) * 0.1, 42.0, 1000, 100, 800)
            })
            .collect()
    }

    #[test]
    fn k_nearest_returns_closest_points() {
        let regions = line_regions();
        let index = RegionIndex::build(&regions);

        let mut got = index.k_nearest([0.0, 42.0], 2);
        got.sort_unstable();
        assert_eq!(got, vec![0, 1]);

        let mut got = index.k_nearest([0.4, 42.0], 3);
        got.sort_unstable();
        assert_eq!(got, vec![2, 3, 4]);
    }

    #[test]
    fn k_nearest_includes_the_query_region_itself() {
        let regions = line_regions();
        let index = RegionIndex::build(&regions);
        let got = index.k_nearest(regions[2].location(), 1);
        assert_eq!(got, vec![2]);
    }

    #[test]
    fn k_larger_than_store_returns_everything() {
        let regions = line_regions();
        let index = RegionIndex::build(&regions);
        assert_eq!(index.k_nearest([0.0, 42.0], 64).len(), 5);
    }

    #[test]
    fn haversine_matches_known_degree_of_latitude() {
        // One degree of latitude is about 111.2 km everywhere.
        let d = haversine_m([-83.7, 42.0], [-83.7, 43.0]);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn padded_boxes_intersect_across_small_gaps() {
        let mut bounds = SubdivisionBounds::new();
        bounds.insert("a", [0.0, 0.0], [1.0, 1.0]);
        bounds.insert("b", [1.0005, 0.0], [2.0, 1.0]);
        bounds.insert("c", [1.5, 0.0], [2.0, 1.0]);

        // Gap of 0.0005 degrees is within the 0.001 pad.
        assert!(bounds.padded_intersects("a", "b"));
        assert!(!bounds.padded_intersects("a", "c"));
        // Unknown shapes never intersect.
        assert!(!bounds.padded_intersects("a", "zzz"));
    }
}
