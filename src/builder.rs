//! Index builder for flexible configuration
//!
//! This module provides a builder pattern for assembling a geo index from a
//! store, a configuration, a dispatcher and an observer.

use crate::config::Config;
use crate::dispatch::{Dispatcher, ImmediateDispatcher};
use crate::error::{GeoQueryError, Result};
use crate::index::GeoIndex;
use crate::observe::{LogObserver, QueryObserver};
use crate::store::{MemoryStore, OrderedStore};
use std::sync::Arc;

/// Builder for geo indexes.
///
/// Anything not set explicitly defaults to an in-memory store, the default
/// [`Config`], an [`ImmediateDispatcher`] and a [`LogObserver`].
///
/// ```rust
/// use geoquery::{Config, GeoIndexBuilder, MemoryStore, ThreadDispatcher};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let index = GeoIndexBuilder::new()
///     .store(MemoryStore::new())
///     .config(Config::default().with_key_length(12))
///     .dispatcher(ThreadDispatcher::new()?)
///     .build()?;
/// assert_eq!(index.config().key_length, 12);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GeoIndexBuilder {
    store: Option<Arc<dyn OrderedStore>>,
    config: Config,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl GeoIndexBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backing store.
    pub fn store<S: OrderedStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a backing store that is shared with other owners.
    pub fn shared_store(mut self, store: Arc<dyn OrderedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the index configuration (key length, field names, coverage threshold).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the number of symbols per hash key.
    pub fn key_length(mut self, key_length: usize) -> Self {
        self.config = self.config.clone().with_key_length(key_length);
        self
    }

    /// Set the dispatcher listener callbacks run on.
    pub fn dispatcher<D: Dispatcher + 'static>(mut self, dispatcher: D) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Set a dispatcher shared with other indexes.
    pub fn shared_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the diagnostics observer.
    pub fn observer<O: QueryObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Build the index. Fails if the configuration is invalid.
    pub fn build(self) -> Result<GeoIndex> {
        self.config.validate().map_err(GeoQueryError::Config)?;

        GeoIndex::from_parts(
            self.store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            self.config,
            self.dispatcher
                .unwrap_or_else(|| Arc::new(ImmediateDispatcher)),
            self.observer.unwrap_or_else(|| Arc::new(LogObserver)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let index = GeoIndexBuilder::new().build().unwrap();
        assert_eq!(index.config(), &Config::default());
    }

    #[test]
    fn test_builder_with_config() {
        let config = Config::default()
            .with_hash_field("geohash")
            .with_location_field("coords");
        let index = GeoIndexBuilder::new().config(config).key_length(8).build().unwrap();
        assert_eq!(index.config().hash_field, "geohash");
        assert_eq!(index.config().key_length, 8);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = GeoIndexBuilder::new().key_length(0).build();
        assert!(matches!(result, Err(GeoQueryError::Config(_))));
    }

    #[test]
    fn test_builder_shares_store() {
        let store = MemoryStore::new();
        let index = GeoIndexBuilder::new()
            .store(store.clone())
            .build()
            .unwrap();
        index
            .set_location("k", &geoquery_types::GeoPoint::new(1.0, 1.0))
            .unwrap();
        assert_eq!(store.len(), 1);
    }
}
