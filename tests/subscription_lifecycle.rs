//! Query behavior against a store whose range events are fired by hand.

mod common;

use common::{Recorder, init_logging, shared};
use geoquery::store::RecordFormat;
use geoquery::{
    CanonicalRange, ChangeKind, Document, DocumentChange, GeoIndex, GeoPoint, GeoQuery,
    OrderedStore, RangeEvent, RangeSink, RangeStatus, RangeSubscription, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const ORIGIN: GeoPoint = GeoPoint::new(0.0, 0.0);

#[derive(Clone)]
struct Opened {
    range: CanonicalRange,
    sink: RangeSink,
    cancelled: Arc<AtomicBool>,
}

impl Opened {
    fn send(&self, event: RangeEvent) {
        (self.sink)(event);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Records subscriptions and never delivers anything on its own.
#[derive(Default)]
struct DeferredStore {
    opened: Mutex<Vec<Opened>>,
}

impl DeferredStore {
    fn opened(&self) -> Vec<Opened> {
        self.opened.lock().clone()
    }
}

impl OrderedStore for DeferredStore {
    fn subscribe(
        &self,
        _order_field: &str,
        range: &CanonicalRange,
        sink: RangeSink,
    ) -> RangeSubscription {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.opened.lock().push(Opened {
            range: range.clone(),
            sink,
            cancelled: cancelled.clone(),
        });
        RangeSubscription::new(move || cancelled.store(true, Ordering::SeqCst))
    }

    fn get(&self, _key: &str) -> Result<Option<Document>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _fields: Document) -> Result<()> {
        Ok(())
    }

    fn delete_fields(&self, _key: &str, _fields: &[&str]) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

fn setup() -> (Arc<DeferredStore>, GeoQuery, Arc<Recorder>) {
    init_logging();
    let store = Arc::new(DeferredStore::default());
    let index = GeoIndex::builder()
        .shared_store(store.clone())
        .build()
        .unwrap();
    let query = index.query_at_location(ORIGIN, 1_000.0).unwrap();
    let recorder = Recorder::new();
    query.add_listener(shared(&recorder)).unwrap();
    (store, query, recorder)
}

fn added(key: &str, point: GeoPoint) -> (RangeEvent, String) {
    change(ChangeKind::Added, key, point)
}

fn change(kind: ChangeKind, key: &str, point: GeoPoint) -> (RangeEvent, String) {
    let format = RecordFormat::default();
    let document = format.to_fields(&point).unwrap();
    let hash = format.hash_of(&document).unwrap().to_string();
    let change = DocumentChange::new(kind, key, document);
    (RangeEvent::Changes(vec![change]), hash)
}

#[test]
fn test_ready_waits_for_every_range() {
    let (store, query, recorder) = setup();
    let opened = store.opened();
    assert_eq!(opened.len(), query.ranges().len());
    assert!(opened.len() > 1);

    let (last, rest) = opened.split_last().unwrap();
    for subscription in rest {
        subscription.send(RangeEvent::SnapshotComplete);
    }
    assert!(recorder.labels().is_empty());
    assert!(!query.is_ready());

    last.send(RangeEvent::SnapshotComplete);
    assert_eq!(recorder.labels(), vec!["ready"]);

    rest[0].send(RangeEvent::SnapshotComplete);
    assert_eq!(recorder.count("ready"), 1);
    assert!(query.is_ready());
}

#[test]
fn test_superseded_subscriptions_are_ignored() {
    let (store, query, recorder) = setup();
    let first = store.opened();
    for subscription in &first {
        subscription.send(RangeEvent::SnapshotComplete);
    }
    assert_eq!(recorder.count("ready"), 1);

    let elsewhere = GeoPoint::new(10.0, 10.0);
    query.set_center(elsewhere).unwrap();
    assert!(first.iter().all(Opened::is_cancelled));

    // A late event on an old stream must not reach the new circle.
    let (event, hash) = added("late", elsewhere);
    first[0].send(event);
    assert_eq!(recorder.count("entered:late"), 0);

    let second: Vec<Opened> = store.opened().split_off(first.len());
    assert_eq!(second.len(), query.ranges().len());
    let target = second
        .iter()
        .find(|subscription| subscription.range.contains(&hash))
        .unwrap();
    let (event, _) = added("late", elsewhere);
    target.send(event);
    assert_eq!(recorder.count("entered:late"), 1);

    first[1].send(RangeEvent::SnapshotComplete);
    assert_eq!(recorder.count("ready"), 1);
    for subscription in &second {
        subscription.send(RangeEvent::SnapshotComplete);
    }
    assert_eq!(recorder.count("ready"), 2);
}

#[test]
fn test_reopened_range_ignores_previous_stream() {
    let (store, query, recorder) = setup();
    let point = GeoPoint::new(0.0005, 0.0005);
    let (_, hash) = added("p", point);

    let first_stream = store
        .opened()
        .into_iter()
        .find(|subscription| subscription.range.contains(&hash))
        .unwrap();

    query.set_radius(10.0).unwrap();
    query.set_radius(1_000.0).unwrap();
    assert!(first_stream.is_cancelled());

    let reopened = store
        .opened()
        .into_iter()
        .rev()
        .find(|subscription| subscription.range == first_stream.range)
        .unwrap();
    assert!(!reopened.is_cancelled());

    let (event, _) = added("p", point);
    first_stream.send(event);
    assert!(recorder.labels().is_empty());

    let (event, _) = added("p", point);
    reopened.send(event);
    assert_eq!(recorder.labels(), vec!["entered:p"]);
}

#[test]
fn test_failure_is_reported_once() {
    let (store, query, recorder) = setup();
    let opened = store.opened();
    for subscription in &opened[1..] {
        subscription.send(RangeEvent::SnapshotComplete);
    }

    opened[0].send(RangeEvent::Failed("quota exceeded".to_string()));
    opened[0].send(RangeEvent::Failed("quota exceeded".to_string()));
    opened[0].send(RangeEvent::SnapshotComplete);

    assert_eq!(recorder.labels(), vec!["error"]);
    assert_eq!(
        query.range_status(&opened[0].range),
        Some(RangeStatus::Failed)
    );
    assert!(!query.is_ready());

    // Moving away closes the failed range; the new generation can become ready.
    query.set_center(GeoPoint::new(10.0, 10.0)).unwrap();
    assert_eq!(query.range_status(&opened[0].range), None);
    let fresh: Vec<Opened> = store.opened().split_off(opened.len());
    for subscription in &fresh {
        subscription.send(RangeEvent::SnapshotComplete);
    }
    assert_eq!(recorder.labels(), vec!["error", "ready"]);
}

#[test]
fn test_reset_cancels_every_stream() {
    let (store, query, recorder) = setup();
    let opened = store.opened();

    query.remove_listener(&shared(&recorder)).unwrap();
    assert!(opened.iter().all(Opened::is_cancelled));
    assert!(query.ranges().is_empty());

    let (event, _) = added("p", GeoPoint::new(0.0005, 0.0005));
    opened[0].send(event);
    assert_eq!(query.tracked_len(), 0);
    assert!(recorder.labels().is_empty());
}

#[test]
fn test_departure_before_arrival_rechecks_membership() {
    let (store, query, recorder) = setup();
    let opened = store.opened();
    let inside = GeoPoint::new(0.0005, 0.0005);
    let outside = GeoPoint::new(-0.00118, 0.01344);

    let (event, inside_hash) = added("k", inside);
    let old_range = opened
        .iter()
        .find(|subscription| subscription.range.contains(&inside_hash))
        .unwrap();
    old_range.send(event);
    assert_eq!(recorder.labels(), vec!["entered:k"]);

    // The old range reports the departure before the new range reports the
    // arrival; the key must leave the circle immediately.
    let (event, outside_hash) = change(ChangeKind::Removed, "k", outside);
    let new_range = opened
        .iter()
        .find(|subscription| subscription.range.contains(&outside_hash))
        .unwrap();
    assert_ne!(old_range.range, new_range.range);
    old_range.send(event);
    assert_eq!(recorder.labels(), vec!["entered:k", "exited:k"]);
    assert_eq!(query.tracked_len(), 1);

    let (event, _) = added("k", outside);
    new_range.send(event);
    assert_eq!(recorder.labels(), vec!["entered:k", "exited:k"]);
    assert_eq!(query.member_count(), 0);
}
