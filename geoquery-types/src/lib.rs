//! # geoquery-types
//!
//! Core geographic types shared by the geoquery engine and its store bindings.
//!
//! - **Point types**: `GeoPoint`, a validated latitude/longitude pair
//!
//! All types are serializable with Serde and convert to and from the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use geoquery_types::point::GeoPoint;
//!
//! let nyc = GeoPoint::new(40.7128, -74.0060);
//! let point: geo::Point = nyc.into();
//! assert_eq!(point.x(), -74.0060);
//! ```

pub mod point;

pub use point::GeoPoint;
