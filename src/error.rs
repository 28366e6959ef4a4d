//! Error types for geohash encoding, range subscriptions and listener management.

use thiserror::Error;

/// Errors produced by the geoquery engine.
///
/// Record- and range-scoped failures (`MalformedRecord`, `SubscriptionFailure`) never
/// abort a query; they are reported to the observer or delivered to listeners as
/// error events. Only invalid inputs and listener misuse are returned to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoQueryError {
    /// Latitude or longitude outside the valid range, or not finite.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// A stored document does not satisfy the location record contract.
    #[error("Malformed record '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },

    /// The initial fetch or live stream of one key range failed.
    #[error("Subscription failure for range [{start}, {end}): {reason}")]
    SubscriptionFailure {
        start: String,
        end: String,
        reason: String,
    },

    /// The listener is already registered on this query.
    #[error("Added the same listener twice to a geo query")]
    DuplicateListener,

    /// The listener was never registered or was already removed.
    #[error("Trying to remove a listener that was removed or never added")]
    UnknownListener,

    /// A hash key contains symbols outside the base-32 alphabet or has the wrong length.
    #[error("Invalid hash key: {0}")]
    InvalidKey(String),

    /// Configuration values out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store rejected a read or write.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The event dispatcher could not be started or has shut down.
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl From<serde_json::Error> for GeoQueryError {
    fn from(err: serde_json::Error) -> Self {
        GeoQueryError::Serialization(err.to_string())
    }
}

/// Result type for geoquery operations.
pub type Result<T> = std::result::Result<T, GeoQueryError>;
