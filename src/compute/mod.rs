//! Compute layer for key encoding and range planning.
//!
//! This module holds the pure, storage-independent parts of the engine:
//! - Geohash key encoding
//! - Circle to key range decomposition
//! - Great-circle distance and coordinate validation
//!
//! Nothing here performs I/O or holds query state.

pub mod distance;
pub mod geohash;
pub mod ranges;
pub mod validation;

pub use distance::distance;
pub use self::geohash::{GeoHasher, HashKey};
pub use ranges::{CanonicalRange, KEY_SPACE_END, RangeDecomposer, RangeSet};
