//! Geo index: location persistence and live query factory.
//!
//! A `GeoIndex` stores point locations in an [`OrderedStore`] as hash-keyed
//! records and creates [`GeoQuery`] instances that watch a circle over the same
//! store.

use crate::builder::GeoIndexBuilder;
use crate::compute::geohash::GeoHasher;
use crate::compute::ranges::{RangeDecomposer, RangeSet};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{GeoQueryError, Result};
use crate::observe::QueryObserver;
use crate::query::{GeoQuery, QueryContext};
use crate::store::record::{LocationRecord, RecordFormat};
use crate::store::{Document, MemoryStore, OrderedStore};
use geoquery_types::GeoPoint;
use std::sync::Arc;

/// Location index over an ordered store.
///
/// `GeoIndex` is cheap to clone; clones share the store, dispatcher and
/// observer.
///
/// # Examples
///
/// ```rust
/// use geoquery::{GeoIndex, GeoPoint};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let index = GeoIndex::memory()?;
///
/// let nyc = GeoPoint::new(40.7128, -74.0060);
/// index.set_location("nyc", &nyc)?;
/// assert_eq!(index.get_location("nyc")?, Some(nyc));
///
/// index.remove_location("nyc")?;
/// assert_eq!(index.get_location("nyc")?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GeoIndex {
    context: QueryContext,
    config: Config,
}

impl GeoIndex {
    /// Creates an index over a fresh in-memory store with default settings.
    pub fn memory() -> Result<Self> {
        Self::builder().store(MemoryStore::new()).build()
    }

    /// Creates an index over `store` with default settings.
    pub fn new<S: OrderedStore + 'static>(store: S) -> Result<Self> {
        Self::builder().store(store).build()
    }

    /// Creates a builder for advanced configuration.
    pub fn builder() -> GeoIndexBuilder {
        GeoIndexBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Arc<dyn OrderedStore>,
        config: Config,
        dispatcher: Arc<dyn Dispatcher>,
        observer: Arc<dyn QueryObserver>,
    ) -> Result<Self> {
        let format = RecordFormat::new(&config)?;
        let decomposer = RangeDecomposer::new(*format.hasher(), config.full_coverage_radius_meters);
        Ok(Self {
            context: QueryContext {
                store,
                dispatcher,
                observer,
                decomposer,
                format,
            },
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OrderedStore> {
        &self.context.store
    }

    pub fn hasher(&self) -> &GeoHasher {
        self.context.format.hasher()
    }

    /// Store `point` as the location of `key`, merging the hash and coordinate
    /// fields into the document.
    pub fn set_location(&self, key: &str, point: &GeoPoint) -> Result<()> {
        if key.is_empty() {
            return Err(GeoQueryError::InvalidKey("document key must not be empty".to_string()));
        }
        let fields = self.context.format.to_fields(point)?;
        self.context.store.set(key, fields)
    }

    /// Remove the location fields of `key`. Other fields are kept.
    pub fn remove_location(&self, key: &str) -> Result<()> {
        let format = &self.context.format;
        self.context
            .store
            .delete_fields(key, &[format.hash_field(), format.location_field()])
    }

    /// The stored location of `key`.
    ///
    /// `None` when the document does not exist or has no location fields;
    /// `MalformedRecord` when the fields are present but invalid.
    pub fn get_location(&self, key: &str) -> Result<Option<GeoPoint>> {
        let Some(document) = self.context.store.get(key)? else {
            return Ok(None);
        };

        let format = &self.context.format;
        if !document.contains_key(format.hash_field())
            && !document.contains_key(format.location_field())
        {
            return Ok(None);
        }

        Ok(Some(format.parse(key, &document)?.point))
    }

    /// Parse the location record of a document stored under `key`.
    pub fn location_of(&self, key: &str, document: &Document) -> Result<LocationRecord> {
        self.context.format.parse(key, document)
    }

    /// Key ranges a query at (`center`, `radius`) would subscribe to.
    pub fn ranges_for(&self, center: &GeoPoint, radius: f64) -> Result<RangeSet> {
        self.context.decomposer.decompose(center, radius)
    }

    /// Create a live query for keys within `radius` meters of `center`. The query
    /// starts when its first listener is added.
    pub fn query_at_location(&self, center: GeoPoint, radius: f64) -> Result<GeoQuery> {
        GeoQuery::new(self.context.clone(), center, radius)
    }
}

impl std::fmt::Debug for GeoIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoIndex")
            .field("config", &self.config)
            .finish()
    }
}
