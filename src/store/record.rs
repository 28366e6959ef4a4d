//! Location record wire format.
//!
//! A located document carries two fields: the hash key as a string (default field
//! `g`) and the coordinates as a two-element `[latitude, longitude]` array (default
//! field `l`). Other fields are left alone.

use super::Document;
use crate::compute::geohash::{GeoHasher, HashKey};
use crate::compute::validation::validate_geographic_point;
use crate::config::Config;
use crate::error::{GeoQueryError, Result};
use geoquery_types::GeoPoint;
use serde_json::Value;

/// A parsed location record.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub hash: HashKey,
    pub point: GeoPoint,
}

/// Field names and key length used to read and write location records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFormat {
    hash_field: String,
    location_field: String,
    hasher: GeoHasher,
}

impl RecordFormat {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate().map_err(GeoQueryError::Config)?;
        Ok(Self {
            hash_field: config.hash_field.clone(),
            location_field: config.location_field.clone(),
            hasher: GeoHasher::new(config.key_length)?,
        })
    }

    pub fn hash_field(&self) -> &str {
        &self.hash_field
    }

    pub fn location_field(&self) -> &str {
        &self.location_field
    }

    pub fn hasher(&self) -> &GeoHasher {
        &self.hasher
    }

    /// The fields to merge into a document to store `point`.
    pub fn to_fields(&self, point: &GeoPoint) -> Result<Document> {
        let hash = self.hasher.encode_point(point)?;
        let mut fields = Document::new();
        fields.insert(self.hash_field.clone(), Value::String(hash.into_string()));
        fields.insert(
            self.location_field.clone(),
            Value::Array(vec![point.latitude().into(), point.longitude().into()]),
        );
        Ok(fields)
    }

    /// The raw hash string of a document, if it has one.
    pub fn hash_of<'a>(&self, document: &'a Document) -> Option<&'a str> {
        document.get(&self.hash_field).and_then(Value::as_str)
    }

    /// Parse the location of the document stored under `key`.
    pub fn parse(&self, key: &str, document: &Document) -> Result<LocationRecord> {
        let malformed = |reason: String| GeoQueryError::MalformedRecord {
            key: key.to_string(),
            reason,
        };

        let hash = match document.get(&self.hash_field) {
            Some(Value::String(hash)) => HashKey::parse(hash, self.hasher.key_length())
                .map_err(|e| malformed(e.to_string()))?,
            Some(other) => {
                return Err(malformed(format!(
                    "field '{}' must be a string, got {}",
                    self.hash_field, other
                )));
            }
            None => return Err(malformed(format!("missing field '{}'", self.hash_field))),
        };

        let location = match document.get(&self.location_field) {
            Some(Value::Array(values)) => values,
            Some(other) => {
                return Err(malformed(format!(
                    "field '{}' must be an array, got {}",
                    self.location_field, other
                )));
            }
            None => {
                return Err(malformed(format!(
                    "missing field '{}'",
                    self.location_field
                )));
            }
        };

        let [lat, lon] = location.as_slice() else {
            return Err(malformed(format!(
                "field '{}' must hold exactly 2 values, got {}",
                self.location_field,
                location.len()
            )));
        };
        let (Some(lat), Some(lon)) = (lat.as_f64(), lon.as_f64()) else {
            return Err(malformed(format!(
                "field '{}' must hold numbers",
                self.location_field
            )));
        };

        let point = GeoPoint::new(lat, lon);
        validate_geographic_point(&point).map_err(|e| malformed(e.to_string()))?;

        Ok(LocationRecord { hash, point })
    }
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            hash_field: "g".to_string(),
            location_field: "l".to_string(),
            hasher: GeoHasher::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_fields_round_trip() {
        let format = RecordFormat::default();
        let point = GeoPoint::new(57.64911, 10.40744);
        let fields = format.to_fields(&point).unwrap();

        assert_eq!(fields["g"], json!("u4pruydqqv"));
        assert_eq!(fields["l"], json!([57.64911, 10.40744]));

        let record = format.parse("k", &fields).unwrap();
        assert_eq!(record.point, point);
        assert_eq!(record.hash.as_str(), "u4pruydqqv");
        assert_eq!(format.hash_of(&fields), Some("u4pruydqqv"));
    }

    #[test]
    fn test_custom_field_names() {
        let config = Config::default()
            .with_hash_field("geohash")
            .with_location_field("coords")
            .with_key_length(6);
        let format = RecordFormat::new(&config).unwrap();

        let fields = format.to_fields(&GeoPoint::new(1.0, 2.0)).unwrap();
        assert!(fields.contains_key("geohash"));
        assert!(fields.contains_key("coords"));
        assert_eq!(format.hash_of(&fields).map(str::len), Some(6));
    }

    #[test]
    fn test_malformed_records() {
        let format = RecordFormat::default();
        let cases = [
            json!({"l": [1.0, 2.0]}),
            json!({"g": "s000000000"}),
            json!({"g": 42, "l": [1.0, 2.0]}),
            json!({"g": "s0000", "l": [1.0, 2.0]}),
            json!({"g": "s000000000", "l": [1.0]}),
            json!({"g": "s000000000", "l": [1.0, 2.0, 3.0]}),
            json!({"g": "s000000000", "l": ["1", 2.0]}),
            json!({"g": "s000000000", "l": {"lat": 1.0}}),
            json!({"g": "s000000000", "l": [91.0, 2.0]}),
        ];
        for case in cases {
            let err = format.parse("bad", &doc(case.clone())).unwrap_err();
            assert!(
                matches!(err, GeoQueryError::MalformedRecord { ref key, .. } if key == "bad"),
                "{case} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_integer_coordinates_accepted() {
        let format = RecordFormat::default();
        let record = format
            .parse("int", &doc(json!({"g": "s000000000", "l": [0, 0]})))
            .unwrap();
        assert_eq!(record.point, GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::default().with_key_length(30);
        assert!(matches!(
            RecordFormat::new(&config),
            Err(GeoQueryError::Config(_))
        ));
    }
}
