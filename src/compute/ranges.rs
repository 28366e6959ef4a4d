//! Decomposition of a circle into a canonical set of hash key ranges.
//!
//! A circle of radius `r` is covered by the 3x3 block of geohash cells around its
//! center, provided the cells are at least `r` tall and wide. The decomposer picks
//! the finest bit precision that satisfies this, turns each of the nine cell
//! prefixes into a half-open key range and merges touching ranges.
//!
//! ```text
//!  +----+----+----+
//!  | NW | N  | NE |
//!  +----+----+----+      prefix "dr5r" (20 bits)
//!  | W  | C  | E  |  ->  [dr5r000000, dr5s000000)
//!  +----+----+----+
//!  | SW | S  | SE |
//!  +----+----+----+
//! ```

use crate::compute::distance::{
    HALF_CIRCUMFERENCE, meters_to_latitude_degrees, meters_to_longitude_degrees, wrap_longitude,
};
use crate::compute::geohash::{BITS_PER_CHAR, GeoHasher, HashKey, symbol_value, value_symbol};
use crate::compute::validation::validate_geographic_point;
use crate::error::Result;
use geoquery_types::GeoPoint;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Exclusive end bound past every key; sorts after all base-32 symbols.
pub const KEY_SPACE_END: &str = "~";

/// Half-open interval `[start, end)` of hash keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalRange {
    start: String,
    end: String,
}

impl CanonicalRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Whether `key` lies in `[start, end)`.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.start.as_str() <= key && key < self.end.as_str()
    }

    /// Whether the range extends to the end of the key space.
    pub fn is_unbounded(&self) -> bool {
        self.end == KEY_SPACE_END
    }
}

impl std::fmt::Display for CanonicalRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Sorted, pairwise non-overlapping and non-adjacent ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: SmallVec<[CanonicalRange; 9]>,
}

impl RangeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort `ranges` by start and coalesce every pair where one range's end
    /// reaches the next one's start.
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = CanonicalRange>,
    {
        let mut sorted: SmallVec<[CanonicalRange; 9]> = ranges.into_iter().collect();
        sorted.sort();

        let mut merged: SmallVec<[CanonicalRange; 9]> = SmallVec::new();
        for range in sorted {
            match merged.last_mut() {
                Some(last) if last.end >= range.start => {
                    if range.end > last.end {
                        last.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }

        Self { ranges: merged }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalRange> {
        self.ranges.iter()
    }

    pub fn as_slice(&self) -> &[CanonicalRange] {
        &self.ranges
    }

    /// Whether some range contains `key`.
    pub fn covers(&self, key: &str) -> bool {
        self.ranges.iter().any(|range| range.contains(key))
    }

    /// Whether `range` is one of the members (exact start and end).
    pub fn contains_range(&self, range: &CanonicalRange) -> bool {
        self.ranges.binary_search(range).is_ok()
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a CanonicalRange;
    type IntoIter = std::slice::Iter<'a, CanonicalRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Computes canonical range sets for circular queries.
///
/// # Examples
///
/// ```rust
/// use geoquery::compute::ranges::RangeDecomposer;
/// use geoquery::compute::geohash::GeoHasher;
/// use geoquery::GeoPoint;
///
/// let decomposer = RangeDecomposer::new(GeoHasher::default(), 20_000_000.0);
/// let center = GeoPoint::new(40.7128, -74.0060);
/// let ranges = decomposer.decompose(&center, 1_000.0)?;
///
/// let key = decomposer.hasher().encode_point(&center)?;
/// assert!(ranges.covers(key.as_str()));
/// assert!(ranges.len() <= 9);
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RangeDecomposer {
    hasher: GeoHasher,
    full_coverage_radius: f64,
}

impl RangeDecomposer {
    /// `full_coverage_radius` is the radius (meters) from which on a query selects
    /// the whole key space.
    pub fn new(hasher: GeoHasher, full_coverage_radius: f64) -> Self {
        Self {
            hasher,
            full_coverage_radius,
        }
    }

    pub fn hasher(&self) -> &GeoHasher {
        &self.hasher
    }

    pub fn full_coverage_radius(&self) -> f64 {
        self.full_coverage_radius
    }

    /// The single range spanning every key.
    pub fn full_range(&self) -> CanonicalRange {
        CanonicalRange::new("0".repeat(self.hasher.key_length()), KEY_SPACE_END)
    }

    /// Finest bit precision whose cells are at least `radius` meters tall and wide
    /// over the latitude span of the circle. Zero means no precision is coarse
    /// enough and the whole key space has to be queried.
    pub fn bits_for_radius(&self, center: &GeoPoint, radius: f64) -> u32 {
        let max_bits = self.hasher.max_bits() as f64;

        let lat_delta = meters_to_latitude_degrees(radius);
        let north = (center.latitude() + lat_delta).min(90.0);
        let south = (center.latitude() - lat_delta).max(-90.0);

        let lat_bits = latitude_bits_for_resolution(radius).min(max_bits).floor() * 2.0;
        let lon_bits_north = longitude_bits_for_resolution(radius, north).floor() * 2.0 - 1.0;
        let lon_bits_south = longitude_bits_for_resolution(radius, south).floor() * 2.0 - 1.0;

        let bits = lat_bits
            .min(lon_bits_north)
            .min(lon_bits_south)
            .min(max_bits);
        if bits < 1.0 { 0 } else { bits as u32 }
    }

    /// Canonical set of ranges covering the circle around `center`.
    ///
    /// A radius of zero or less (or NaN) selects nothing; a radius at or above
    /// the full-coverage radius selects the whole key space.
    pub fn decompose(&self, center: &GeoPoint, radius: f64) -> Result<RangeSet> {
        validate_geographic_point(center)?;

        if radius.is_nan() || radius <= 0.0 {
            return Ok(RangeSet::empty());
        }
        if radius >= self.full_coverage_radius {
            return Ok(RangeSet::from_ranges([self.full_range()]));
        }

        let bits = self.bits_for_radius(center, radius);
        if bits == 0 {
            return Ok(RangeSet::from_ranges([self.full_range()]));
        }

        let cell = self.hasher.cell_bounds(center, bits)?;
        let height = cell.height();
        let width = cell.width();
        let center_lat = (cell.min().y + cell.max().y) / 2.0;
        let center_lon = (cell.min().x + cell.max().x) / 2.0;

        let latitudes = [
            center_lat,
            (center_lat + height).min(90.0),
            (center_lat - height).max(-90.0),
        ];
        let longitudes = [
            center_lon,
            wrap_longitude(center_lon + width),
            wrap_longitude(center_lon - width),
        ];

        let mut ranges: SmallVec<[CanonicalRange; 9]> = SmallVec::new();
        for lat in latitudes {
            for lon in longitudes {
                ranges.push(self.range_for_prefix(&GeoPoint::new(lat, lon), bits)?);
            }
        }

        Ok(RangeSet::from_ranges(ranges))
    }

    /// Range of all keys sharing the first `bits` bits of `point`'s key.
    pub fn range_for_prefix(&self, point: &GeoPoint, bits: u32) -> Result<CanonicalRange> {
        let start = self.hasher.encode(point, bits)?;
        Ok(self.prefix_range(start, bits))
    }

    /// Range for a zero-padded prefix key. The end is the prefix's lexicographic
    /// successor, zero-padded, or `~` when incrementing carries past the first
    /// symbol.
    pub(crate) fn prefix_range(&self, start: HashKey, bits: u32) -> CanonicalRange {
        let bits = bits.min(self.hasher.max_bits());
        if bits == 0 {
            return self.full_range();
        }

        let mut values: SmallVec<[u8; 22]> = start.as_str().bytes().filter_map(symbol_value).collect();
        let prefix_len = bits.div_ceil(BITS_PER_CHAR) as usize;
        let unused_bits = prefix_len as u32 * BITS_PER_CHAR - bits;

        let mut index = prefix_len - 1;
        let mut increment = 1u8 << unused_bits;
        loop {
            let value = values[index] + increment;
            if value < 32 {
                values[index] = value;
                break;
            }
            values[index] = value - 32;
            if index == 0 {
                return CanonicalRange::new(start.into_string(), KEY_SPACE_END);
            }
            index -= 1;
            increment = 1;
        }

        let end: String = values.iter().map(|v| value_symbol(*v)).collect();
        CanonicalRange::new(start.into_string(), end)
    }
}

fn latitude_bits_for_resolution(resolution: f64) -> f64 {
    (HALF_CIRCUMFERENCE / resolution).log2()
}

fn longitude_bits_for_resolution(resolution: f64, latitude: f64) -> f64 {
    let degrees = meters_to_longitude_degrees(resolution, latitude);
    if degrees > 0.0 {
        (360.0 / degrees).log2().max(1.0)
    } else {
        1.0
    }
}
