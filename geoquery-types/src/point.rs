use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Valid latitude range in degrees.
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Valid longitude range in degrees.
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A geographic location given as latitude and longitude in degrees.
///
/// Unlike `geo::Point`, which stores `(x, y)` and therefore `(longitude, latitude)`,
/// `GeoPoint` is constructed latitude first, matching the `[lat, lon]` pair stored
/// in location records.
///
/// Construction does not validate; use [`GeoPoint::checked`] or
/// [`GeoPoint::is_valid`] when the input is untrusted.
///
/// # Examples
///
/// ```
/// use geoquery_types::point::GeoPoint;
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// assert!(london.is_valid());
///
/// assert!(GeoPoint::checked(91.0, 0.0).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point from latitude and longitude in degrees.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point only if both coordinates are finite and in range.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        coordinates_valid(latitude, longitude).then_some(Self::new(latitude, longitude))
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Whether both coordinates are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        coordinates_valid(self.latitude, self.longitude)
    }

    /// Great-circle distance in meters using the haversine formula.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoquery_types::point::GeoPoint;
    ///
    /// let nyc = GeoPoint::new(40.7128, -74.0060);
    /// let la = GeoPoint::new(34.0522, -118.2437);
    /// let meters = nyc.haversine_distance(&la);
    /// assert!(meters > 3_900_000.0 && meters < 4_000_000.0);
    /// ```
    #[inline]
    pub fn haversine_distance(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(Point::from(*self), Point::from(*other))
    }

    /// The `[latitude, longitude]` pair as stored in location records.
    pub fn to_pair(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Whether a latitude/longitude pair is finite and inside the valid ranges.
pub fn coordinates_valid(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && LATITUDE_RANGE.contains(&latitude)
        && LONGITUDE_RANGE.contains(&longitude)
}

impl From<GeoPoint> for Point<f64> {
    fn from(point: GeoPoint) -> Self {
        Point::new(point.longitude, point.latitude)
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(point: Point<f64>) -> Self {
        GeoPoint::new(point.y(), point.x())
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}
