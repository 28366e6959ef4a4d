//! Ordered store abstraction
//!
//! The query engine only needs two things from the backing store: lexicographic
//! range subscriptions over one document field and point reads/writes of
//! documents. Anything offering those (a document database, a replicated
//! key-value service, the in-memory [`MemoryStore`]) can back a geo index.

mod memory;
pub mod record;

pub use memory::MemoryStore;
pub use record::{LocationRecord, RecordFormat};

use crate::compute::ranges::CanonicalRange;
use crate::error::Result;
use std::sync::Arc;

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// How a document changed relative to one subscribed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The document's order field entered the range (or the initial snapshot saw it).
    Added,
    /// The document stayed in the range and changed.
    Modified,
    /// The document left the range or was deleted.
    Removed,
}

/// One document change reported by a range subscription.
///
/// For `Removed` the document is its latest known state: the post-write document
/// if it still exists, the last stored version if it was deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub key: String,
    pub document: Document,
}

impl DocumentChange {
    pub fn new(kind: ChangeKind, key: impl Into<String>, document: Document) -> Self {
        Self {
            kind,
            key: key.into(),
            document,
        }
    }
}

/// Events streamed by a range subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeEvent {
    /// A batch of changes, in store order.
    Changes(Vec<DocumentChange>),
    /// Every document in the range at subscription time has been delivered.
    SnapshotComplete,
    /// The initial fetch or the live stream failed; no further events follow.
    Failed(String),
}

/// Callback receiving the events of one range subscription. May be invoked from
/// any thread.
pub type RangeSink = Arc<dyn Fn(RangeEvent) + Send + Sync>;

/// Handle for an open range subscription. Cancelled on [`cancel`](Self::cancel)
/// or when dropped.
pub struct RangeSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl RangeSubscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Stop the subscription. Events already in flight may still arrive.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for RangeSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for RangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Trait for ordered document stores backing a geo index
pub trait OrderedStore: Send + Sync {
    /// Stream every document whose `order_field` is a string inside `range`:
    /// first the current contents as `Added` changes followed by
    /// `SnapshotComplete`, then live changes. Failures are reported through the
    /// sink as `Failed`, not returned.
    fn subscribe(
        &self,
        order_field: &str,
        range: &CanonicalRange,
        sink: RangeSink,
    ) -> RangeSubscription;

    /// Read a document
    fn get(&self, key: &str) -> Result<Option<Document>>;

    /// Merge `fields` into the document, creating it if needed
    fn set(&self, key: &str, fields: Document) -> Result<()>;

    /// Remove fields from a document; a no-op for missing documents
    fn delete_fields(&self, key: &str, fields: &[&str]) -> Result<()>;

    /// Delete a whole document
    fn delete(&self, key: &str) -> Result<()>;
}

impl<S: OrderedStore + ?Sized> OrderedStore for Arc<S> {
    fn subscribe(
        &self,
        order_field: &str,
        range: &CanonicalRange,
        sink: RangeSink,
    ) -> RangeSubscription {
        (**self).subscribe(order_field, range, sink)
    }

    fn get(&self, key: &str) -> Result<Option<Document>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, fields: Document) -> Result<()> {
        (**self).set(key, fields)
    }

    fn delete_fields(&self, key: &str, fields: &[&str]) -> Result<()> {
        (**self).delete_fields(key, fields)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}
