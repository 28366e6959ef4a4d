//! In-memory ordered store with live range subscriptions.

use super::{
    ChangeKind, Document, DocumentChange, OrderedStore, RangeEvent, RangeSink, RangeSubscription,
};
use crate::compute::ranges::CanonicalRange;
use crate::error::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored documents
    pub document_count: usize,
    /// Number of live range subscriptions
    pub subscription_count: usize,
    /// Number of `subscribe` calls since creation
    pub subscribe_calls: u64,
    /// Number of write operations performed
    pub operations_count: u64,
}

struct Subscription {
    order_field: String,
    range: CanonicalRange,
    sink: RangeSink,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    fn covers(&self, document: Option<&Document>) -> bool {
        document
            .and_then(|doc| doc.get(&self.order_field))
            .and_then(|value| value.as_str())
            .is_some_and(|key| self.range.contains(key))
    }
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, Document>,
    subscriptions: FxHashMap<Uuid, Subscription>,
    fail_all: bool,
    failing: Vec<CanonicalRange>,
    stats: StoreStats,
}

struct Delivery {
    sink: RangeSink,
    cancelled: Arc<AtomicBool>,
    event: RangeEvent,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<Delivery>,
    draining: bool,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    outbox: Mutex<Outbox>,
}

impl Shared {
    /// Deliver queued events in order. Only one caller drains at a time; a sink
    /// that writes to the store from inside a callback just queues more events.
    fn drain(&self) {
        {
            let mut outbox = self.outbox.lock();
            if outbox.draining {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let delivery = {
                let mut outbox = self.outbox.lock();
                match outbox.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            if !delivery.cancelled.load(Ordering::Acquire) {
                (delivery.sink)(delivery.event);
            }
        }
    }

    /// Replace the document under `key` with `update(current)` and queue the
    /// resulting range events. `None` means absent; absent to absent is a no-op.
    fn write<F>(&self, key: &str, update: F)
    where
        F: FnOnce(Option<Document>) -> Option<Document>,
    {
        {
            let mut inner = self.inner.lock();
            let current = inner.documents.get(key).cloned();
            let existed = current.is_some();
            let new = update(current);
            if !existed && new.is_none() {
                return;
            }
            let old = match &new {
                Some(document) => inner.documents.insert(key.to_string(), document.clone()),
                None => inner.documents.remove(key),
            };
            inner.stats.operations_count += 1;

            let mut entering = Vec::new();
            let mut leaving = Vec::new();
            for subscription in inner.subscriptions.values() {
                let was_in = subscription.covers(old.as_ref());
                let is_in = subscription.covers(new.as_ref());
                let change = match (was_in, is_in) {
                    (false, true) => (ChangeKind::Added, new.clone()),
                    (true, true) if old != new => (ChangeKind::Modified, new.clone()),
                    (true, false) => (ChangeKind::Removed, new.clone().or_else(|| old.clone())),
                    _ => continue,
                };
                let (kind, Some(document)) = change else {
                    continue;
                };
                let delivery = Delivery {
                    sink: subscription.sink.clone(),
                    cancelled: subscription.cancelled.clone(),
                    event: RangeEvent::Changes(vec![DocumentChange::new(kind, key, document)]),
                };
                if kind == ChangeKind::Removed {
                    leaving.push(delivery);
                } else {
                    entering.push(delivery);
                }
            }

            // Arrivals first, so a document moving between two subscribed ranges
            // is updated before it is reported gone from the old one.
            let mut outbox = self.outbox.lock();
            outbox.pending.extend(entering);
            outbox.pending.extend(leaving);
        }
        self.drain();
    }
}

/// In-memory ordered store backed by a `BTreeMap`.
///
/// Range subscriptions follow document-database semantics: every write is
/// reported to each subscription as `Added`, `Modified` or `Removed` depending on
/// whether the document's order field was and is inside the subscribed range. The
/// initial snapshot is delivered before `subscribe` returns unless another thread
/// is delivering events at the same time.
///
/// # Examples
///
/// ```rust
/// use geoquery::store::{MemoryStore, OrderedStore, RangeEvent};
/// use geoquery::compute::ranges::CanonicalRange;
/// use serde_json::json;
/// use std::sync::{Arc, Mutex};
///
/// let store = MemoryStore::new();
/// let mut fields = serde_json::Map::new();
/// fields.insert("g".into(), json!("9q8yyk8ytp"));
/// store.set("sf", fields)?;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink_seen = seen.clone();
/// let _subscription = store.subscribe(
///     "g",
///     &CanonicalRange::new("9q8y000000", "9q8z000000"),
///     Arc::new(move |event: RangeEvent| sink_seen.lock().unwrap().push(event)),
/// );
///
/// let events = seen.lock().unwrap();
/// assert!(matches!(events[0], RangeEvent::Changes(_)));
/// assert_eq!(events[1], RangeEvent::SnapshotComplete);
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent subscription fail its initial fetch.
    pub fn fail_ranges(&self, fail: bool) {
        self.shared.inner.lock().fail_all = fail;
    }

    /// Make subsequent subscriptions to exactly `range` fail their initial fetch.
    pub fn fail_range(&self, range: CanonicalRange) {
        self.shared.inner.lock().failing.push(range);
    }

    /// Break the live stream of every open subscription to `range`.
    pub fn break_range(&self, range: &CanonicalRange) {
        {
            let mut inner = self.shared.inner.lock();
            let broken: Vec<Uuid> = inner
                .subscriptions
                .iter()
                .filter(|(_, subscription)| &subscription.range == range)
                .map(|(id, _)| *id)
                .collect();

            let mut deliveries = Vec::with_capacity(broken.len());
            for id in broken {
                if let Some(subscription) = inner.subscriptions.remove(&id) {
                    deliveries.push(Delivery {
                        sink: subscription.sink,
                        cancelled: subscription.cancelled,
                        event: RangeEvent::Failed(format!("stream for {} broken", range)),
                    });
                }
            }
            self.shared.outbox.lock().pending.extend(deliveries);
        }
        self.shared.drain();
    }

    /// Ranges of the live subscriptions, sorted.
    pub fn open_ranges(&self) -> Vec<CanonicalRange> {
        let inner = self.shared.inner.lock();
        let mut ranges: Vec<CanonicalRange> = inner
            .subscriptions
            .values()
            .map(|subscription| subscription.range.clone())
            .collect();
        ranges.sort();
        ranges
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().documents.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.shared.inner.lock();
        let mut stats = inner.stats.clone();
        stats.document_count = inner.documents.len();
        stats.subscription_count = inner.subscriptions.len();
        stats
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats())
            .finish()
    }
}

impl OrderedStore for MemoryStore {
    fn subscribe(
        &self,
        order_field: &str,
        range: &CanonicalRange,
        sink: RangeSink,
    ) -> RangeSubscription {
        let id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));

        {
            let mut inner = self.shared.inner.lock();
            inner.stats.subscribe_calls += 1;

            let mut deliveries = Vec::with_capacity(2);
            if inner.fail_all || inner.failing.contains(range) {
                log::debug!("failing subscription to {}", range);
                deliveries.push(Delivery {
                    sink: sink.clone(),
                    cancelled: cancelled.clone(),
                    event: RangeEvent::Failed(format!("permission denied for {}", range)),
                });
            } else {
                let mut snapshot: Vec<(&str, &String, &Document)> = inner
                    .documents
                    .iter()
                    .filter_map(|(key, document)| {
                        let order = document.get(order_field)?.as_str()?;
                        range.contains(order).then_some((order, key, document))
                    })
                    .collect();
                snapshot.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

                let changes: Vec<DocumentChange> = snapshot
                    .into_iter()
                    .map(|(_, key, document)| {
                        DocumentChange::new(ChangeKind::Added, key.clone(), document.clone())
                    })
                    .collect();
                if !changes.is_empty() {
                    deliveries.push(Delivery {
                        sink: sink.clone(),
                        cancelled: cancelled.clone(),
                        event: RangeEvent::Changes(changes),
                    });
                }
                deliveries.push(Delivery {
                    sink: sink.clone(),
                    cancelled: cancelled.clone(),
                    event: RangeEvent::SnapshotComplete,
                });

                inner.subscriptions.insert(
                    id,
                    Subscription {
                        order_field: order_field.to_string(),
                        range: range.clone(),
                        sink,
                        cancelled: cancelled.clone(),
                    },
                );
            }

            self.shared.outbox.lock().pending.extend(deliveries);
        }
        self.shared.drain();

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        RangeSubscription::new(move || {
            cancelled.store(true, Ordering::Release);
            if let Some(shared) = shared.upgrade() {
                shared.inner.lock().subscriptions.remove(&id);
            }
        })
    }

    fn get(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.shared.inner.lock().documents.get(key).cloned())
    }

    fn set(&self, key: &str, fields: Document) -> Result<()> {
        self.shared.write(key, |current| {
            let mut document = current.unwrap_or_default();
            document.extend(fields);
            Some(document)
        });
        Ok(())
    }

    fn delete_fields(&self, key: &str, fields: &[&str]) -> Result<()> {
        self.shared.write(key, |current| {
            let mut document = current?;
            for field in fields {
                document.remove(*field);
            }
            Some(document)
        });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.shared.write(key, |_| None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn located(hash: &str) -> Document {
        let mut fields = Document::new();
        fields.insert("g".to_string(), json!(hash));
        fields
    }

    fn recorder() -> (RangeSink, Arc<Mutex<Vec<RangeEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: RangeSink = Arc::new(move |event: RangeEvent| sink_events.lock().push(event));
        (sink, events)
    }

    fn kinds(events: &[RangeEvent]) -> Vec<(ChangeKind, String)> {
        events
            .iter()
            .filter_map(|event| match event {
                RangeEvent::Changes(changes) => Some(changes),
                _ => None,
            })
            .flatten()
            .map(|change| (change.kind, change.key.clone()))
            .collect()
    }

    fn range() -> CanonicalRange {
        CanonicalRange::new("b000000000", "c000000000")
    }

    #[test]
    fn test_snapshot_then_complete() {
        let store = MemoryStore::new();
        store.set("b", located("b100000000")).unwrap();
        store.set("a", located("b200000000")).unwrap();
        store.set("outside", located("c100000000")).unwrap();

        let (sink, events) = recorder();
        let _subscription = store.subscribe("g", &range(), sink);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(
            kinds(&events),
            vec![
                (ChangeKind::Added, "b".to_string()),
                (ChangeKind::Added, "a".to_string())
            ]
        );
        assert_eq!(events[1], RangeEvent::SnapshotComplete);
    }

    #[test]
    fn test_live_changes_relative_to_range() {
        let store = MemoryStore::new();
        let (sink, events) = recorder();
        let _subscription = store.subscribe("g", &range(), sink);

        store.set("k", located("b100000000")).unwrap();
        store.set("k", located("b200000000")).unwrap();
        // unchanged write is not reported
        store.set("k", located("b200000000")).unwrap();
        store.set("k", located("c100000000")).unwrap();
        store.set("k", located("b300000000")).unwrap();
        store.delete("k").unwrap();

        let key = || "k".to_string();
        assert_eq!(
            kinds(&events.lock()),
            vec![
                (ChangeKind::Added, key()),
                (ChangeKind::Modified, key()),
                (ChangeKind::Removed, key()),
                (ChangeKind::Added, key()),
                (ChangeKind::Removed, key()),
            ]
        );
    }

    #[test]
    fn test_removed_carries_latest_document() {
        let store = MemoryStore::new();
        let (sink, events) = recorder();
        let _subscription = store.subscribe("g", &range(), sink);

        store.set("k", located("b100000000")).unwrap();
        store.set("k", located("c100000000")).unwrap();

        let events = events.lock();
        let Some(RangeEvent::Changes(changes)) = events.last() else {
            panic!("expected a change batch");
        };
        assert_eq!(changes[0].kind, ChangeKind::Removed);
        assert_eq!(changes[0].document["g"], json!("c100000000"));
    }

    #[test]
    fn test_delete_fields_leaves_range() {
        let store = MemoryStore::new();
        let mut fields = located("b100000000");
        fields.insert("name".to_string(), json!("kept"));
        store.set("k", fields).unwrap();

        let (sink, events) = recorder();
        let _subscription = store.subscribe("g", &range(), sink);
        store.delete_fields("k", &["g"]).unwrap();

        let document = store.get("k").unwrap().unwrap();
        assert!(!document.contains_key("g"));
        assert_eq!(document["name"], json!("kept"));
        assert_eq!(
            kinds(&events.lock()).last(),
            Some(&(ChangeKind::Removed, "k".to_string()))
        );

        store.delete_fields("missing", &["g"]).unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let store = MemoryStore::new();
        let (sink, events) = recorder();
        let subscription = store.subscribe("g", &range(), sink);
        assert_eq!(store.stats().subscription_count, 1);

        subscription.cancel();
        assert_eq!(store.stats().subscription_count, 0);

        store.set("k", located("b100000000")).unwrap();
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_failing_ranges() {
        let store = MemoryStore::new();
        store.fail_range(range());

        let (sink, events) = recorder();
        let _failed = store.subscribe("g", &range(), sink);
        assert!(matches!(events.lock()[0], RangeEvent::Failed(_)));
        assert!(store.open_ranges().is_empty());

        let other = CanonicalRange::new("c000000000", "d000000000");
        let (sink, events) = recorder();
        let _ok = store.subscribe("g", &other, sink);
        assert_eq!(events.lock()[0], RangeEvent::SnapshotComplete);

        store.fail_ranges(true);
        let (sink, events) = recorder();
        let _failed = store.subscribe("g", &other, sink);
        assert!(matches!(events.lock()[0], RangeEvent::Failed(_)));
    }

    #[test]
    fn test_break_range() {
        let store = MemoryStore::new();
        let (sink, events) = recorder();
        let _subscription = store.subscribe("g", &range(), sink);

        store.break_range(&range());
        assert!(matches!(events.lock().last(), Some(RangeEvent::Failed(_))));
        assert!(store.open_ranges().is_empty());
    }

    #[test]
    fn test_reentrant_write_from_sink() {
        let store = MemoryStore::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let inner_store = store.clone();
        let sink_events = events.clone();
        let sink: RangeSink = Arc::new(move |event: RangeEvent| {
            if let RangeEvent::Changes(changes) = &event
                && changes[0].key == "first"
            {
                inner_store.set("second", located("b200000000")).unwrap();
            }
            sink_events.lock().push(event);
        });
        let _subscription = store.subscribe("g", &range(), sink);

        store.set("first", located("b100000000")).unwrap();
        assert_eq!(
            kinds(&events.lock()),
            vec![
                (ChangeKind::Added, "first".to_string()),
                (ChangeKind::Added, "second".to_string())
            ]
        );
    }

    #[test]
    fn test_stats() {
        let store = MemoryStore::new();
        store.set("a", located("b100000000")).unwrap();
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        let _subscription = store.subscribe("g", &range(), Arc::new(|_: RangeEvent| {}));

        let stats = store.stats();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.operations_count, 2);
        assert_eq!(stats.subscribe_calls, 1);
        assert_eq!(stats.subscription_count, 1);
        assert!(store.is_empty());
    }
}
