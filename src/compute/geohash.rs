//! Coordinate codec: latitude/longitude to fixed-length sortable hash keys.
//!
//! Keys are standard geohashes: quantized longitude and latitude bits interleaved
//! (longitude first, most significant bit first) and packed five bits per symbol
//! into the alphabet `0123456789bcdefghjkmnpqrstuvwxyz`. The alphabet is in ASCII
//! order, so comparing two keys as strings compares their bit strings.
//!
//! Keys always have the hasher's fixed length. When fewer precision bits are
//! requested the remaining bits are zero, which makes a reduced-precision key the
//! lowest key of its cell.
//!
//! Nearby points usually share a long prefix, but this is only a locality proxy:
//! points on either side of the antimeridian, the equator or the prime meridian can
//! be geometrically close and still have no prefix in common.

use crate::compute::validation::validate_geographic_point;
use crate::error::{GeoQueryError, Result};
use geo::{Coord, Rect};
use geoquery_types::GeoPoint;
use serde::{Deserialize, Serialize};

/// The base-32 geohash alphabet, in ascending ASCII order.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Bits carried by one key symbol.
pub const BITS_PER_CHAR: u32 = 5;

/// Default key length, roughly 1 meter cells.
pub const DEFAULT_KEY_LENGTH: usize = 10;

/// Longest supported key.
pub const MAX_KEY_LENGTH: usize = 22;

const INVALID: u8 = u8::MAX;

const DECODE_TABLE: [u8; 128] = {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < BASE32.len() {
        table[BASE32[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Value (0..32) of a base-32 symbol, or `None` for symbols outside the alphabet.
#[inline]
pub fn symbol_value(symbol: u8) -> Option<u8> {
    match DECODE_TABLE.get(symbol as usize) {
        Some(&value) if value != INVALID => Some(value),
        _ => None,
    }
}

/// Symbol for a value in `0..32`.
#[inline]
pub fn value_symbol(value: u8) -> char {
    BASE32[(value & 0x1f) as usize] as char
}

/// A fixed-length geohash key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashKey(String);

impl HashKey {
    /// Parse a key, checking the alphabet and the length.
    pub fn parse(key: &str, key_length: usize) -> Result<Self> {
        if key.len() != key_length {
            return Err(GeoQueryError::InvalidKey(format!(
                "expected {} symbols, got {} in '{}'",
                key_length,
                key.len(),
                key
            )));
        }
        if let Some(bad) = key.bytes().find(|b| symbol_value(*b).is_none()) {
            return Err(GeoQueryError::InvalidKey(format!(
                "symbol '{}' is not in the base-32 alphabet",
                bad as char
            )));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of leading symbols shared with `other`.
    pub fn common_prefix_len(&self, other: &HashKey) -> usize {
        self.0
            .bytes()
            .zip(other.0.bytes())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl AsRef<str> for HashKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HashKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encoder for keys of one fixed length.
///
/// # Examples
///
/// ```rust
/// use geoquery::compute::geohash::GeoHasher;
/// use geoquery::GeoPoint;
///
/// let hasher = GeoHasher::default();
/// let key = hasher.encode_point(&GeoPoint::new(57.64911, 10.40744))?;
/// assert_eq!(key.as_str(), "u4pruydqqv");
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoHasher {
    key_length: usize,
}

impl GeoHasher {
    /// Create a hasher producing keys of `key_length` symbols (1-22).
    pub fn new(key_length: usize) -> Result<Self> {
        if !(1..=MAX_KEY_LENGTH).contains(&key_length) {
            return Err(GeoQueryError::Config(format!(
                "Key length must be between 1 and {}, got {}",
                MAX_KEY_LENGTH, key_length
            )));
        }
        Ok(Self { key_length })
    }

    pub fn key_length(&self) -> usize {
        self.key_length
    }

    /// Total number of bits carried by a key.
    pub fn max_bits(&self) -> u32 {
        self.key_length as u32 * BITS_PER_CHAR
    }

    /// Encode `point` using its first `precision_bits` interleaved bits.
    ///
    /// Bits past `precision_bits` are zero; a precision above `max_bits` is
    /// truncated to the key length.
    pub fn encode(&self, point: &GeoPoint, precision_bits: u32) -> Result<HashKey> {
        validate_geographic_point(point)?;

        let total_bits = self.max_bits();
        let precision_bits = precision_bits.min(total_bits);

        let (mut lat_min, mut lat_max) = (-90.0_f64, 90.0_f64);
        let (mut lon_min, mut lon_max) = (-180.0_f64, 180.0_f64);
        let mut key = String::with_capacity(self.key_length);
        let mut value: u8 = 0;

        for bit_index in 0..total_bits {
            let bit = if bit_index >= precision_bits {
                0
            } else if bit_index % 2 == 0 {
                let mid = (lon_min + lon_max) / 2.0;
                if point.longitude() >= mid {
                    lon_min = mid;
                    1
                } else {
                    lon_max = mid;
                    0
                }
            } else {
                let mid = (lat_min + lat_max) / 2.0;
                if point.latitude() >= mid {
                    lat_min = mid;
                    1
                } else {
                    lat_max = mid;
                    0
                }
            };

            value = (value << 1) | bit;
            if bit_index % BITS_PER_CHAR == BITS_PER_CHAR - 1 {
                key.push(value_symbol(value));
                value = 0;
            }
        }

        Ok(HashKey(key))
    }

    /// Bounds of the cell containing `point` at `precision_bits`.
    ///
    /// With zero bits this is the whole world.
    pub fn cell_bounds(&self, point: &GeoPoint, precision_bits: u32) -> Result<Rect<f64>> {
        validate_geographic_point(point)?;

        let (mut lat_min, mut lat_max) = (-90.0_f64, 90.0_f64);
        let (mut lon_min, mut lon_max) = (-180.0_f64, 180.0_f64);
        for bit_index in 0..precision_bits.min(self.max_bits()) {
            if bit_index % 2 == 0 {
                let mid = (lon_min + lon_max) / 2.0;
                if point.longitude() >= mid {
                    lon_min = mid;
                } else {
                    lon_max = mid;
                }
            } else {
                let mid = (lat_min + lat_max) / 2.0;
                if point.latitude() >= mid {
                    lat_min = mid;
                } else {
                    lat_max = mid;
                }
            }
        }

        Ok(Rect::new(
            Coord {
                x: lon_min,
                y: lat_min,
            },
            Coord {
                x: lon_max,
                y: lat_max,
            },
        ))
    }

    /// Encode `point` at full key precision.
    ///
    /// Stored keys and range prefixes come from the same bit encoder so that
    /// every prefix is an exact bit prefix of the keys in its cell, including
    /// points on cell edges. Away from cell edges the keys agree with
    /// `geohash::encode`.
    pub fn encode_point(&self, point: &GeoPoint) -> Result<HashKey> {
        self.encode(point, self.max_bits())
    }

    /// Whether `key` is a well-formed key for this hasher.
    pub fn is_valid_key(&self, key: &str) -> bool {
        HashKey::parse(key, self.key_length).is_ok()
    }

    /// Bounding rectangle (x = longitude, y = latitude) of the cell a key denotes.
    pub fn decode_bbox(&self, key: &HashKey) -> Result<Rect<f64>> {
        geohash::decode_bbox(key.as_str()).map_err(|e| GeoQueryError::InvalidKey(e.to_string()))
    }

    /// Center of the cell a key denotes.
    pub fn decode(&self, key: &HashKey) -> Result<GeoPoint> {
        let (coord, _lon_err, _lat_err) =
            geohash::decode(key.as_str()).map_err(|e| GeoQueryError::InvalidKey(e.to_string()))?;
        Ok(GeoPoint::new(coord.y, coord.x))
    }
}

impl Default for GeoHasher {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

/// Encode `point` with the default key length.
pub fn encode(point: &GeoPoint, precision_bits: u32) -> Result<HashKey> {
    GeoHasher::default().encode(point, precision_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_contains(rect: &Rect<f64>, point: &GeoPoint) -> bool {
        rect.min().x <= point.longitude()
            && point.longitude() <= rect.max().x
            && rect.min().y <= point.latitude()
            && point.latitude() <= rect.max().y
    }

    #[test]
    fn test_known_geohash() {
        let hasher = GeoHasher::default();
        let key = hasher.encode_point(&GeoPoint::new(57.64911, 10.40744)).unwrap();
        assert_eq!(key.as_str(), "u4pruydqqv");
    }

    #[test]
    fn test_matches_geohash_crate() {
        let hasher = GeoHasher::new(12).unwrap();
        let points = [
            GeoPoint::new(40.7128, -74.0060),
            GeoPoint::new(-33.8688, 151.2093),
            GeoPoint::new(35.6895, 139.6917),
            GeoPoint::new(-54.8019, -68.3030),
        ];
        for point in points {
            let ours = hasher.encode_point(&point).unwrap();
            let reference = geohash::encode(
                geohash::Coord {
                    x: point.longitude(),
                    y: point.latitude(),
                },
                12,
            )
            .unwrap();
            assert_eq!(ours.as_str(), reference, "mismatch for {point}");
        }
    }

    #[test]
    fn test_edge_points_keep_prefix() {
        let hasher = GeoHasher::default();
        let edges = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(45.0, 90.0),
            GeoPoint::new(-90.0, -180.0),
            GeoPoint::new(90.0, 180.0),
        ];
        for point in edges {
            let key = hasher.encode_point(&point).unwrap();
            let prefix = hasher.encode(&point, 20).unwrap();
            assert_eq!(&key.as_str()[..4], &prefix.as_str()[..4], "{point}");
            assert!(prefix.as_str()[4..].bytes().all(|b| b == b'0'));
        }
    }

    #[test]
    fn test_cell_contains_point() {
        let hasher = GeoHasher::default();
        let points = [
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(90.0, 180.0),
            GeoPoint::new(-90.0, -180.0),
            GeoPoint::new(51.5074, -0.1278),
            GeoPoint::new(-0.000001, 179.99999),
            GeoPoint::new(12.345678, -98.765432),
        ];
        for point in points {
            let key = hasher.encode_point(&point).unwrap();
            let cell = hasher.decode_bbox(&key).unwrap();
            assert!(cell_contains(&cell, &point), "{point} not in cell of {key}");
        }
    }

    #[test]
    fn test_reduced_precision_pads_with_zero_bits() {
        let hasher = GeoHasher::default();
        let point = GeoPoint::new(57.64911, 10.40744);

        let coarse = hasher.encode(&point, 10).unwrap();
        assert_eq!(coarse.as_str(), "u400000000");

        // 7 bits: "u" plus the top two bits of "4" (00100 -> 00000)
        let partial = hasher.encode(&point, 7).unwrap();
        assert_eq!(partial.as_str(), "u000000000");

        let none = hasher.encode(&point, 0).unwrap();
        assert_eq!(none.as_str(), "0000000000");

        let over = hasher.encode(&point, 500).unwrap();
        assert_eq!(over, hasher.encode_point(&point).unwrap());
    }

    #[test]
    fn test_locality_prefix() {
        let hasher = GeoHasher::default();
        let origin = hasher.encode_point(&GeoPoint::new(0.0, 0.0)).unwrap();
        let near = hasher.encode_point(&GeoPoint::new(0.0, 0.00001)).unwrap();
        let far = hasher.encode_point(&GeoPoint::new(0.0, 179.99999)).unwrap();

        assert!(origin.common_prefix_len(&near) >= 6);
        assert_eq!(origin.common_prefix_len(&far), 0);
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        let hasher = GeoHasher::default();
        for point in [
            GeoPoint::new(90.5, 0.0),
            GeoPoint::new(0.0, 181.0),
            GeoPoint::new(f64::NAN, 0.0),
        ] {
            assert!(matches!(
                hasher.encode_point(&point),
                Err(GeoQueryError::InvalidCoordinate(_))
            ));
        }
    }

    #[test]
    fn test_key_length_bounds() {
        assert!(GeoHasher::new(0).is_err());
        assert!(GeoHasher::new(23).is_err());
        assert_eq!(GeoHasher::new(22).unwrap().max_bits(), 110);
    }

    #[test]
    fn test_parse_key() {
        assert!(HashKey::parse("u4pruydqqv", 10).is_ok());
        assert!(HashKey::parse("u4pruydqq", 10).is_err());
        // 'a' is not part of the alphabet
        assert!(HashKey::parse("u4pruydqqa", 10).is_err());
        assert!(GeoHasher::default().is_valid_key("s000000000"));
    }

    #[test]
    fn test_decode_center() {
        let hasher = GeoHasher::default();
        let point = GeoPoint::new(-23.5505, -46.6333);
        let key = hasher.encode_point(&point).unwrap();
        let center = hasher.decode(&key).unwrap();
        assert!(point.haversine_distance(&center) < 2.0);
    }

    #[test]
    fn test_symbol_table() {
        for (i, symbol) in BASE32.iter().enumerate() {
            assert_eq!(symbol_value(*symbol), Some(i as u8));
            assert_eq!(value_symbol(i as u8), *symbol as char);
        }
        assert_eq!(symbol_value(b'a'), None);
        assert_eq!(symbol_value(b'~'), None);
        assert_eq!(symbol_value(200), None);
    }
}
