//! Population-target neighborhood search.
//!
//! A pure function of (focal region, target population) over the shared
//! read-only spatial index. The focal region is always its own first
//! neighborhood member at distance 0.

use seg_map_models::{METERS_PER_MILE, Region};
use seg_map_spatial::{RegionIndex, haversine_m};

/// First k tried when growing the candidate set.
const GROWTH_START: usize = 8;

/// Largest k tried; whatever is found at this size is accepted.
const GROWTH_LIMIT: usize = 256;

/// A distance-ordered neighbor set matched to a population target.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    /// Region-store indices, nearest first; `members[0]` is the focal region.
    pub members: Vec<usize>,
    /// Haversine meters from the focal point, parallel to `members`.
    pub distances_m: Vec<f64>,
}

impl Neighborhood {
    /// The degenerate neighborhood holding only the focal region.
    #[must_use]
    pub fn self_only(focal: usize) -> Self {
        Self {
            members: vec![focal],
            distances_m: vec![0.0],
        }
    }

    /// Distance in meters to the farthest member, 0 for a self-only set.
    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.distances_m.last().copied().unwrap_or(0.0)
    }

    /// Cumulative population over all members.
    #[must_use]
    pub fn total_pop(&self, regions: &[Region]) -> u64 {
        self.members
            .iter()
            .map(|&j| u64::from(regions[j].total_pop))
            .sum()
    }
}

/// Neighborhood search over a fixed region store and spatial index.
pub struct NeighborhoodSearch<'a> {
    regions: &'a [Region],
    index: &'a RegionIndex,
    max_radius_m: f64,
}

impl<'a> NeighborhoodSearch<'a> {
    /// Binds the search to a store, index, and maximum radius in miles.
    #[must_use]
    pub fn new(regions: &'a [Region], index: &'a RegionIndex, max_radius_miles: f64) -> Self {
        Self {
            regions,
            index,
            max_radius_m: max_radius_miles * METERS_PER_MILE,
        }
    }

    /// Finds the neighborhood of `focal` matched to `target_pop`.
    ///
    /// Returns `None` when even the nearest candidate lies at or beyond the
    /// maximum radius. That is a data-sparsity condition, not an error; the
    /// caller skips the region and keeps going.
    #[must_use]
    pub fn find(&self, focal: usize, target_pop: u32) -> Option<Neighborhood> {
        let candidates = self.initial_candidates(focal, target_pop);
        let (members, distances) = self.sort_by_distance(focal, candidates);
        let (members, distances) = self.trim_radius(members, distances)?;
        Some(self.match_target(focal, members, distances, target_pop))
    }

    /// Grows k until focal plus candidates exceed the target population.
    ///
    /// The index returns the focal region among its own nearest neighbors;
    /// it is filtered out here and re-added at distance 0 after the radius
    /// trim, so the trim sees only true neighbors.
    fn initial_candidates(&self, focal: usize, target_pop: u32) -> Vec<usize> {
        let location = self.regions[focal].location();

        let mut k = GROWTH_START;
        loop {
            let mut candidates = self.index.k_nearest(location, k);
            candidates.retain(|&j| j != focal);

            let pop = u64::from(self.regions[focal].total_pop)
                + candidates
                    .iter()
                    .map(|&j| u64::from(self.regions[j].total_pop))
                    .sum::<u64>();

            if pop > u64::from(target_pop) || k >= GROWTH_LIMIT {
                return candidates;
            }
            k *= 2;
        }
    }

    /// Sorts candidates ascending by great-circle distance from the focal point.
    fn sort_by_distance(&self, focal: usize, candidates: Vec<usize>) -> (Vec<usize>, Vec<f64>) {
        let location = self.regions[focal].location();

        let mut pairs: Vec<(f64, usize)> = candidates
            .into_iter()
            .map(|j| (haversine_m(location, self.regions[j].location()), j))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        pairs.into_iter().map(|(d, j)| (j, d)).unzip()
    }

    /// Drops candidates at or beyond the maximum radius.
    ///
    /// Returns `None` when no candidate is inside the radius at all.
    fn trim_radius(
        &self,
        mut members: Vec<usize>,
        mut distances: Vec<f64>,
    ) -> Option<(Vec<usize>, Vec<f64>)> {
        let cut = distances.partition_point(|&d| d < self.max_radius_m);
        if cut == 0 {
            return None;
        }
        members.truncate(cut);
        distances.truncate(cut);
        Some((members, distances))
    }

    /// Truncates to the prefix with cumulative population closest to target.
    ///
    /// Walks outward accumulating population until the sum first exceeds the
    /// target, then drops the last member iff that strictly reduces absolute
    /// deviation from the target (ties keep the inclusive set).
    fn match_target(
        &self,
        focal: usize,
        candidates: Vec<usize>,
        candidate_distances: Vec<f64>,
        target_pop: u32,
    ) -> Neighborhood {
        let mut members = Vec::with_capacity(candidates.len() + 1);
        let mut distances = Vec::with_capacity(candidate_distances.len() + 1);
        members.push(focal);
        distances.push(0.0);
        members.extend(candidates);
        distances.extend(candidate_distances);

        let target = i64::from(target_pop);
        let mut k = 0;
        let mut rpop: i64 = 0;
        for (i, &j) in members.iter().enumerate() {
            k = i;
            rpop += i64::from(self.regions[j].total_pop);
            if rpop > target {
                break;
            }
        }

        if k > 0 {
            let last = i64::from(self.regions[members[k]].total_pop);
            if rpop - target > target - (rpop - last) {
                k -= 1;
            }
        }

        members.truncate(k + 1);
        distances.truncate(k + 1);

        Neighborhood {
            members,
            distances_m: distances,
        }
    }
}
