#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core record types for the segregation metrics pipeline.
//!
//! A [`Region`] is one small census geography (tract, block group, or county
//! subdivision) with population counts and a representative point. The input
//! adapter populates identity, geometry, and base counts; every later pipeline
//! stage fills in its own derived fields in place.

use serde::{Deserialize, Serialize};

/// Meters per statute mile, used for all radius conversions.
pub const METERS_PER_MILE: f64 = 1609.34;

/// The census summary level a run operates on.
///
/// String forms match the original command-line spellings
/// (`tract`, `blockgroup`, `cousub`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum SummaryLevel {
    /// Census tract.
    #[strum(serialize = "tract")]
    #[serde(rename = "tract")]
    Tract,
    /// Census block group.
    #[strum(serialize = "blockgroup")]
    #[serde(rename = "blockgroup")]
    BlockGroup,
    /// County subdivision (town/township level).
    #[strum(serialize = "cousub")]
    #[serde(rename = "cousub")]
    CountySubdivision,
}

/// Census year of the input data.
///
/// The year determines which sentinel CBSA code the source files use to mean
/// "not part of any statistical area".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum CensusYear {
    /// 2000 decennial census (ungrouped sentinel `9999`).
    #[strum(serialize = "2000")]
    #[serde(rename = "2000")]
    Y2000,
    /// 2010 decennial census (ungrouped sentinel `99999`).
    #[strum(serialize = "2010")]
    #[serde(rename = "2010")]
    Y2010,
}

impl CensusYear {
    /// The CBSA code this year's source files use to mean "ungrouped".
    #[must_use]
    pub const fn ungrouped_sentinel(self) -> &'static str {
        match self {
            Self::Y2000 => "9999",
            Self::Y2010 => "99999",
        }
    }
}

/// Maps a raw CBSA code from the source files to a grouping.
///
/// The sentinel code for `year` becomes `None` (ungrouped); everything else
/// is a real statistical-area code.
#[must_use]
pub fn grouping_from_code(code: &str, year: CensusYear) -> Option<String> {
    if code.is_empty() || code == year.ungrouped_sentinel() {
        None
    } else {
        Some(code.to_string())
    }
}

/// One census geography with population counts and a representative point.
///
/// Identity, geometry, and base counts are immutable after load. Every other
/// field starts zero-valued and is populated by exactly one pipeline stage,
/// which is what makes the per-region concurrent fan-out in the normalizer
/// safe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    // Identity. Only the codes relevant to the summary level are populated.
    /// State name.
    pub state: String,
    /// Two-digit state FIPS code.
    pub state_id: String,
    /// County FIPS code.
    pub county: String,
    /// County subdivision FIPS code (cousub level only).
    #[serde(default)]
    pub cousub: String,
    /// Census tract code (tract and block-group levels).
    #[serde(default)]
    pub tract: String,
    /// Block group code (block-group level only).
    #[serde(default)]
    pub block_group: String,
    /// Human-readable name.
    pub name: String,
    /// Statistical-area (CBSA) code, or `None` for ungrouped regions.
    #[serde(default)]
    pub grouping: Option<String>,

    // Geometry: a single representative point.
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,

    // Base counts, immutable after load.
    /// Total population.
    pub total_pop: u32,
    /// One-race non-Hispanic Black population.
    pub black_only_pop: u32,
    /// One-race non-Hispanic White population.
    pub white_only_pop: u32,

    // Grouping totals, written by the aggregate-statistics stage.
    /// Total population of the region's statistical area.
    #[serde(default)]
    pub grouping_total_pop: u64,
    /// Black-only population of the region's statistical area.
    #[serde(default)]
    pub grouping_black_only_pop: u64,
    /// White-only population of the region's statistical area.
    #[serde(default)]
    pub grouping_white_only_pop: u64,

    // Pseudo-grouping totals, substituted for ungrouped regions.
    /// Total population of the substitute reference area.
    #[serde(default)]
    pub pseudo_total_pop: u64,
    /// Black-only population of the substitute reference area.
    #[serde(default)]
    pub pseudo_black_only_pop: u64,
    /// White-only population of the substitute reference area.
    #[serde(default)]
    pub pseudo_white_only_pop: u64,

    // Neighborhood summary, written by the metrics stage.
    /// Cumulative population of the matched neighborhood.
    #[serde(default)]
    pub neighborhood_pop: u64,
    /// Neighborhood radius in miles (0 when only the region itself).
    #[serde(default)]
    pub neighborhood_radius: f64,
    /// Count of nonzero-population neighborhood members used.
    #[serde(default)]
    pub neighbors: usize,

    // Smoothed proportions.
    /// Distance-weighted Black proportion over the neighborhood.
    #[serde(default)]
    pub p_black: f64,
    /// Distance-weighted White proportion over the neighborhood.
    #[serde(default)]
    pub p_white: f64,

    // Entropy.
    /// Three-category Shannon entropy of the region's own counts.
    #[serde(default)]
    pub local_entropy: f64,
    /// Three-category Shannon entropy of the weighted neighborhood aggregate.
    #[serde(default)]
    pub regional_entropy: f64,

    // Isolation, raw and detrended.
    /// Black isolation index in [0, 1].
    #[serde(default)]
    pub black_isolation: f64,
    /// White isolation index in [0, 1].
    #[serde(default)]
    pub white_isolation: f64,
    /// Black isolation after trend removal and dispersion rescaling.
    #[serde(default)]
    pub black_isolation_resid: f64,
    /// White isolation after trend removal and dispersion rescaling.
    #[serde(default)]
    pub white_isolation_resid: f64,

    // Dissimilarity, raw and detrended.
    /// Black-vs-other dissimilarity index in [0, 1].
    #[serde(default)]
    pub bo_dissimilarity: f64,
    /// White-vs-other dissimilarity index in [0, 1].
    #[serde(default)]
    pub wo_dissimilarity: f64,
    /// Black-vs-other dissimilarity after normalization.
    #[serde(default)]
    pub bo_dissimilarity_resid: f64,
    /// White-vs-other dissimilarity after normalization.
    #[serde(default)]
    pub wo_dissimilarity_resid: f64,
}

impl Region {
    /// A region with geometry and base counts set and everything else
    /// zero-valued, the state the input adapter delivers records in.
    #[must_use]
    pub fn with_counts(
        name: &str,
        lon: f64,
        lat: f64,
        total_pop: u32,
        black_only_pop: u32,
        white_only_pop: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            lon,
            lat,
            total_pop,
            black_only_pop,
            white_only_pop,
            ..Self::default()
        }
    }

    /// The region's representative point as `(lon, lat)` degrees.
    #[must_use]
    pub const fn location(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Whether the region belongs to an administrative statistical area.
    #[must_use]
    pub const fn is_grouped(&self) -> bool {
        self.grouping.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn summary_level_round_trips_cli_spellings() {
        assert_eq!(
            SummaryLevel::from_str("cousub").unwrap(),
            SummaryLevel::CountySubdivision
        );
        assert_eq!(SummaryLevel::Tract.to_string(), "tract");
        assert_eq!(SummaryLevel::BlockGroup.to_string(), "blockgroup");
    }

    #[test]
    fn sentinel_codes_map_to_ungrouped() {
        assert_eq!(grouping_from_code("9999", CensusYear::Y2000), None);
        assert_eq!(grouping_from_code("99999", CensusYear::Y2010), None);
        assert_eq!(
            grouping_from_code("9999", CensusYear::Y2010),
            Some("9999".to_string())
        );
        assert_eq!(
            grouping_from_code("35620", CensusYear::Y2010),
            Some("35620".to_string())
        );
        assert_eq!(grouping_from_code("", CensusYear::Y2010), None);
    }
}
