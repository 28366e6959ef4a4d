//! Validation for geographic coordinates and query parameters.

use crate::error::{GeoQueryError, Result};
use geoquery_types::GeoPoint;

/// Validates a point has a valid latitude and longitude.
///
/// Latitude: [-90.0, 90.0], Longitude: [-180.0, 180.0]
///
/// # Examples
///
/// ```
/// use geoquery::compute::validation::validate_geographic_point;
/// use geoquery::GeoPoint;
///
/// let nyc = GeoPoint::new(40.7128, -74.0060);
/// assert!(validate_geographic_point(&nyc).is_ok());
///
/// let invalid = GeoPoint::new(95.0, -74.0);
/// assert!(validate_geographic_point(&invalid).is_err());
/// ```
pub fn validate_geographic_point(point: &GeoPoint) -> Result<()> {
    let (lat, lon) = (point.latitude(), point.longitude());

    if !lat.is_finite() {
        return Err(GeoQueryError::InvalidCoordinate(format!(
            "Latitude must be finite, got: {}",
            lat
        )));
    }

    if !lon.is_finite() {
        return Err(GeoQueryError::InvalidCoordinate(format!(
            "Longitude must be finite, got: {}",
            lon
        )));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoQueryError::InvalidCoordinate(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            lat
        )));
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeoQueryError::InvalidCoordinate(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            lon
        )));
    }

    Ok(())
}

/// Validates a query radius in meters.
///
/// Zero, negative and oversized radii are legal (they select the empty or the
/// full key space); only NaN is rejected.
pub fn validate_radius(radius_meters: f64) -> Result<()> {
    if radius_meters.is_nan() {
        return Err(GeoQueryError::InvalidCoordinate(
            "Radius must be a number, got NaN".to_string(),
        ));
    }
    Ok(())
}
