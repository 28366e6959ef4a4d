//! Index configuration
//!
//! Serializable settings shared by the codec, the range decomposer and the record
//! parser, loadable from JSON or (with the `toml` feature) TOML.

use crate::compute::distance::HALF_CIRCUMFERENCE;
use crate::compute::geohash::{DEFAULT_KEY_LENGTH, MAX_KEY_LENGTH};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Geo index configuration
///
/// # Example
///
/// ```rust
/// use geoquery::Config;
///
/// let config = Config::default();
/// assert_eq!(config.key_length, 10);
///
/// let json = r#"{
///     "key_length": 12,
///     "hash_field": "geohash"
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.key_length, 12);
/// assert_eq!(config.location_field, "l");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Symbols per hash key (1-22, default: 10)
    #[serde(default = "Config::default_key_length")]
    pub key_length: usize,

    /// Document field holding the hash key; also the field range queries order by
    #[serde(default = "Config::default_hash_field")]
    pub hash_field: String,

    /// Document field holding `[latitude, longitude]`
    #[serde(default = "Config::default_location_field")]
    pub location_field: String,

    /// Radius (meters) from which on a query covers the whole key space
    #[serde(default = "Config::default_full_coverage_radius")]
    pub full_coverage_radius_meters: f64,
}

impl Config {
    const fn default_key_length() -> usize {
        DEFAULT_KEY_LENGTH
    }

    fn default_hash_field() -> String {
        "g".to_string()
    }

    fn default_location_field() -> String {
        "l".to_string()
    }

    const fn default_full_coverage_radius() -> f64 {
        HALF_CIRCUMFERENCE
    }

    pub fn with_key_length(mut self, key_length: usize) -> Self {
        self.key_length = key_length;
        self
    }

    pub fn with_hash_field(mut self, field: impl Into<String>) -> Self {
        self.hash_field = field.into();
        self
    }

    pub fn with_location_field(mut self, field: impl Into<String>) -> Self {
        self.location_field = field.into();
        self
    }

    pub fn with_full_coverage_radius(mut self, meters: f64) -> Self {
        self.full_coverage_radius_meters = meters;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_KEY_LENGTH).contains(&self.key_length) {
            return Err(format!(
                "Key length must be between 1 and {}",
                MAX_KEY_LENGTH
            ));
        }

        if self.hash_field.is_empty() || self.location_field.is_empty() {
            return Err("Field names must not be empty".to_string());
        }

        if self.hash_field == self.location_field {
            return Err("Hash field and location field must differ".to_string());
        }

        if self.full_coverage_radius_meters.is_nan() || self.full_coverage_radius_meters <= 0.0 {
            return Err("Full coverage radius must be positive".to_string());
        }

        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from a JSON file, or a TOML file when the `toml`
    /// feature is enabled and the extension is `.toml`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::GeoQueryError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        #[cfg(feature = "toml")]
        if path.extension().is_some_and(|ext| ext == "toml") {
            return Self::from_toml(&contents)
                .map_err(|e| crate::GeoQueryError::Config(e.to_string()));
        }

        Self::from_json(&contents).map_err(|e| crate::GeoQueryError::Config(e.to_string()))
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_length: Self::default_key_length(),
            hash_field: Self::default_hash_field(),
            location_field: Self::default_location_field(),
            full_coverage_radius_meters: Self::default_full_coverage_radius(),
        }
    }
}
