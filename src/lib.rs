//! Live radius queries over ordered key-value stores.
//!
//! Locations are stored as fixed-length geohash keys, a circle is decomposed into
//! a handful of key ranges, and a query turns the change streams of those ranges
//! into Entered / Exited / Moved / Changed events.
//!
//! ```rust
//! use geoquery::{GeoIndex, GeoPoint, QueryEvent, EventFn};
//! use std::sync::{Arc, Mutex};
//!
//! let index = GeoIndex::memory()?;
//! let query = index.query_at_location(GeoPoint::new(0.0, 0.0), 1_000.0)?;
//!
//! let events = Arc::new(Mutex::new(Vec::new()));
//! let sink = events.clone();
//! query.add_listener(Arc::new(EventFn::new(move |event: &QueryEvent| {
//!     sink.lock().unwrap().push(event.clone());
//! })))?;
//!
//! index.set_location("bus-12", &GeoPoint::new(0.0005, 0.0005))?;
//! index.set_location("bus-12", &GeoPoint::new(10.0, 10.0))?;
//!
//! let events = events.lock().unwrap();
//! assert!(matches!(events[1], QueryEvent::Entered { .. }));
//! assert!(matches!(events[2], QueryEvent::Exited { .. }));
//! # Ok::<(), geoquery::GeoQueryError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod observe;
pub mod query;
pub mod store;

pub use builder::GeoIndexBuilder;
pub use config::Config;
pub use error::{GeoQueryError, Result};
pub use index::GeoIndex;

pub use geoquery_types::GeoPoint;

pub use compute::geohash::{GeoHasher, HashKey};
pub use compute::ranges::{CanonicalRange, RangeDecomposer, RangeSet};

pub use dispatch::{Dispatcher, ImmediateDispatcher, Task, ThreadDispatcher};
#[cfg(feature = "tokio")]
pub use dispatch::TokioDispatcher;

pub use observe::{LogObserver, QueryObserver};

pub use query::{EventFn, GeoQuery, GeoQueryEventListener, QueryEvent, RangeStatus, SharedListener};

pub use store::{
    ChangeKind, Document, DocumentChange, MemoryStore, OrderedStore, RangeEvent, RangeSink,
    RangeSubscription,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoIndex, GeoIndexBuilder, GeoQueryError, Result};

    pub use crate::{GeoPoint, GeoQuery, QueryEvent};

    pub use crate::{EventFn, GeoQueryEventListener, SharedListener};

    pub use crate::{Config, Dispatcher, ImmediateDispatcher, ThreadDispatcher};

    pub use crate::{MemoryStore, OrderedStore};

    #[cfg(feature = "tokio")]
    pub use crate::TokioDispatcher;
}
