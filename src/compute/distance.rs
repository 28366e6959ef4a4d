//! Great-circle distance and degree/meter conversions.
//!
//! Everything here uses a spherical Earth with the same mean radius as
//! `geo::Haversine`, so that the range decomposer and the exact membership check
//! agree on what "within the radius" means.

use geoquery_types::GeoPoint;
use std::f64::consts::PI;

/// Mean Earth radius in meters (IUGG), the radius used by `geo::Haversine`.
pub const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

/// Length of one degree of latitude (and of longitude at the equator) in meters.
pub const METERS_PER_DEGREE: f64 = MEAN_EARTH_RADIUS * PI / 180.0;

/// Half of a great circle, the largest distance between two points on the sphere.
pub const HALF_CIRCUMFERENCE: f64 = MEAN_EARTH_RADIUS * PI;

const EPSILON: f64 = 1e-12;

/// Haversine distance between two points in meters.
#[inline]
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    a.haversine_distance(b)
}

/// Degrees of latitude spanned by `meters` along a meridian.
#[inline]
pub fn meters_to_latitude_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Degrees of longitude spanned by `meters` along the parallel at `latitude`.
///
/// Saturates at 360 degrees, which is what callers get at or near the poles.
pub fn meters_to_longitude_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_degree = latitude.to_radians().cos() * METERS_PER_DEGREE;
    if meters_per_degree < EPSILON {
        if meters > 0.0 { 360.0 } else { 0.0 }
    } else {
        (meters / meters_per_degree).min(360.0)
    }
}

/// Bring a longitude back into range.
///
/// Values already inside `[-180, 180]` are returned unchanged; anything else is
/// wrapped modulo 360 into `[-180, 180)`.
///
/// ```
/// use geoquery::compute::distance::wrap_longitude;
///
/// assert_eq!(wrap_longitude(180.0), 180.0);
/// assert_eq!(wrap_longitude(190.0), -170.0);
/// assert_eq!(wrap_longitude(-190.0), 170.0);
/// ```
pub fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// The point reached by travelling `meters` from `origin` along `bearing`
/// (degrees clockwise from north) on a great circle.
pub fn destination(origin: &GeoPoint, bearing: f64, meters: f64) -> GeoPoint {
    let angular = meters / MEAN_EARTH_RADIUS;
    let bearing = bearing.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lon1 = origin.longitude().to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoPoint::new(
        lat2.to_degrees().clamp(-90.0, 90.0),
        wrap_longitude(lon2.to_degrees()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_matches_known_city_pair() {
        let nyc = GeoPoint::new(40.7128, -74.0060);
        let la = GeoPoint::new(34.0522, -118.2437);
        let meters = distance(&nyc, &la);
        assert!(meters > 3_900_000.0 && meters < 4_000_000.0);
    }

    #[test]
    fn test_latitude_degrees() {
        let degrees = meters_to_latitude_degrees(METERS_PER_DEGREE * 2.0);
        assert!((degrees - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_longitude_degrees_grow_towards_poles() {
        let equator = meters_to_longitude_degrees(10_000.0, 0.0);
        let north = meters_to_longitude_degrees(10_000.0, 60.0);
        assert!((north / equator - 2.0).abs() < 1e-6);

        assert_eq!(meters_to_longitude_degrees(10_000.0, 90.0), 360.0);
        assert_eq!(meters_to_longitude_degrees(0.0, 90.0), 0.0);
        assert_eq!(meters_to_longitude_degrees(1e12, 0.0), 360.0);
    }

    #[test]
    fn test_wrap_longitude() {
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert_eq!(wrap_longitude(540.0), -180.0);
        assert!((wrap_longitude(359.0) - -1.0).abs() < 1e-9);
        assert!((wrap_longitude(-361.0) - -1.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_round_trips_distance() {
        let origin = GeoPoint::new(48.8566, 2.3522);
        for bearing in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let target = destination(&origin, bearing, 5_000.0);
            let meters = distance(&origin, &target);
            assert!((meters - 5_000.0).abs() < 1.0, "bearing {bearing}: {meters}");
        }
    }

    #[test]
    fn test_destination_crosses_antimeridian() {
        let origin = GeoPoint::new(0.0, 179.99);
        let target = destination(&origin, 90.0, 5_000.0);
        assert!(target.longitude() < -179.9);
    }
}
