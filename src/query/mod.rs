//! Live radius queries.
//!
//! A [`GeoQuery`] watches a circle. While it has listeners it keeps one store
//! subscription open per key range of the circle's decomposition, feeds every
//! change through the location tracker and delivers the resulting events through
//! the index's dispatcher.
//!
//! All query state sits behind one lock. Store calls and listener callbacks
//! happen outside it: reconfiguration plans the subscription changes under the
//! lock, performs them afterwards and re-locks to attach the new handles, and
//! events are queued in an outbox that a single drainer hands to the dispatcher in
//! order. Listeners may therefore call back into the query.

pub mod events;
pub mod subscriptions;
pub mod tracker;

pub use events::{EventFn, GeoQueryEventListener, QueryEvent, SharedListener};
pub use subscriptions::RangeStatus;
pub use tracker::{Circle, TrackedEntry};

use crate::compute::ranges::{CanonicalRange, RangeDecomposer, RangeSet};
use crate::compute::validation::{validate_geographic_point, validate_radius};
use crate::dispatch::Dispatcher;
use crate::error::{GeoQueryError, Result};
use crate::observe::QueryObserver;
use crate::store::record::RecordFormat;
use crate::store::{ChangeKind, DocumentChange, OrderedStore, RangeEvent, RangeSink};
use events::ListenerRegistry;
use geoquery_types::GeoPoint;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use subscriptions::{SubscriptionManager, SubscriptionPlan};
use tracker::LocationTracker;

/// Everything a query needs from the index that created it.
#[derive(Clone)]
pub(crate) struct QueryContext {
    pub store: Arc<dyn OrderedStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub observer: Arc<dyn QueryObserver>,
    pub decomposer: RangeDecomposer,
    pub format: RecordFormat,
}

/// Diagnostics collected under the lock and reported after it is released.
enum Notice {
    Malformed(GeoQueryError),
    Failed(CanonicalRange, String),
    Stale(CanonicalRange, u64),
    RangesChanged {
        generation: u64,
        opened: usize,
        closed: usize,
    },
    Ready(u64),
}

struct Delivery {
    listeners: Vec<SharedListener>,
    event: QueryEvent,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<Delivery>,
    draining: bool,
}

struct QueryState {
    circle: Circle,
    listeners: ListenerRegistry,
    subscriptions: SubscriptionManager,
    tracker: LocationTracker,
    started: bool,
}

struct QueryShared {
    state: Mutex<QueryState>,
    outbox: Mutex<Outbox>,
    context: QueryContext,
}

/// A live query for all keys within `radius` meters of `center`.
///
/// Cloning yields another handle to the same query.
///
/// # Examples
///
/// ```rust
/// use geoquery::{EventFn, GeoIndex, GeoPoint, QueryEvent};
/// use std::sync::{Arc, Mutex};
///
/// let index = GeoIndex::memory()?;
/// index.set_location("firehouse", &GeoPoint::new(0.0005, 0.0005))?;
///
/// let query = index.query_at_location(GeoPoint::new(0.0, 0.0), 1_000.0)?;
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// query.add_listener(Arc::new(EventFn::new(move |event: &QueryEvent| {
///     sink.lock().unwrap().push(event.clone());
/// })))?;
///
/// let seen = seen.lock().unwrap();
/// assert_eq!(seen[0].key(), Some("firehouse"));
/// assert_eq!(seen.last(), Some(&QueryEvent::Ready));
/// # Ok::<(), geoquery::GeoQueryError>(())
/// ```
#[derive(Clone)]
pub struct GeoQuery {
    shared: Arc<QueryShared>,
}

impl GeoQuery {
    pub(crate) fn new(context: QueryContext, center: GeoPoint, radius: f64) -> Result<Self> {
        validate_geographic_point(&center)?;
        validate_radius(radius)?;

        Ok(Self {
            shared: Arc::new(QueryShared {
                state: Mutex::new(QueryState {
                    circle: Circle { center, radius },
                    listeners: ListenerRegistry::default(),
                    subscriptions: SubscriptionManager::default(),
                    tracker: LocationTracker::default(),
                    started: false,
                }),
                outbox: Mutex::new(Outbox::default()),
                context,
            }),
        })
    }

    pub fn center(&self) -> GeoPoint {
        self.shared.state.lock().circle.center
    }

    /// Radius in meters.
    pub fn radius(&self) -> f64 {
        self.shared.state.lock().circle.radius
    }

    /// Counter bumped by every reconfiguration, start and reset.
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().subscriptions.generation()
    }

    /// Whether the query is running and every open range delivered its initial
    /// snapshot.
    pub fn is_ready(&self) -> bool {
        let state = self.shared.state.lock();
        state.started && state.subscriptions.all_ready()
    }

    /// Number of keys currently tracked, inside the circle or not.
    pub fn tracked_len(&self) -> usize {
        self.shared.state.lock().tracker.len()
    }

    /// Number of keys currently inside the circle.
    pub fn member_count(&self) -> usize {
        self.shared.state.lock().tracker.member_count()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    /// The ranges the query currently subscribes to.
    pub fn ranges(&self) -> RangeSet {
        self.shared.state.lock().subscriptions.ranges().clone()
    }

    /// Status of one open range, `None` if it is not open.
    pub fn range_status(&self, range: &CanonicalRange) -> Option<RangeStatus> {
        self.shared.state.lock().subscriptions.status(range)
    }

    pub fn set_center(&self, center: GeoPoint) -> Result<()> {
        validate_geographic_point(&center)?;
        self.shared.reconfigure(|circle| circle.center = center)
    }

    /// Set the radius in meters.
    pub fn set_radius(&self, radius: f64) -> Result<()> {
        validate_radius(radius)?;
        self.shared.reconfigure(|circle| circle.radius = radius)
    }

    /// Change center and radius in a single generation.
    pub fn set_location(&self, center: GeoPoint, radius: f64) -> Result<()> {
        validate_geographic_point(&center)?;
        validate_radius(radius)?;
        self.shared.reconfigure(|circle| *circle = Circle { center, radius })
    }

    /// Register a listener. The first listener starts the query; later ones get
    /// `Entered` for every current member, then `Ready` if the query is ready.
    pub fn add_listener(&self, listener: SharedListener) -> Result<()> {
        self.shared.add_listener(listener)
    }

    /// Unregister a listener. Removing the last one stops and resets the query.
    pub fn remove_listener(&self, listener: &SharedListener) -> Result<()> {
        self.shared.remove_listener(listener)
    }

    /// Unregister every listener and reset the query.
    pub fn remove_all_listeners(&self) {
        self.shared.remove_all_listeners()
    }
}

impl std::fmt::Debug for GeoQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GeoQuery")
            .field("center", &state.circle.center)
            .field("radius", &state.circle.radius)
            .field("generation", &state.subscriptions.generation())
            .field("open_ranges", &state.subscriptions.open_count())
            .field("listeners", &state.listeners.len())
            .field("tracked", &state.tracker.len())
            .finish()
    }
}

impl QueryShared {
    fn reconfigure<F>(self: &Arc<Self>, update: F) -> Result<()>
    where
        F: FnOnce(&mut Circle),
    {
        let mut notices = Vec::new();
        let plan = {
            let mut state = self.state.lock();
            update(&mut state.circle);
            state.subscriptions.advance();
            if state.started {
                Some(self.plan_ranges(&mut state, &mut notices)?)
            } else {
                None
            }
        };

        self.report(notices);
        if let Some(plan) = plan {
            self.execute(plan);
        }
        self.drain();
        Ok(())
    }

    fn add_listener(self: &Arc<Self>, listener: SharedListener) -> Result<()> {
        let mut notices = Vec::new();
        let plan = {
            let mut state = self.state.lock();
            state.listeners.add(listener.clone())?;

            if state.started {
                let mut replay = state.tracker.members();
                if state.subscriptions.all_ready() {
                    replay.push(QueryEvent::Ready);
                }
                self.enqueue_to(vec![listener], replay);
                None
            } else {
                state.started = true;
                state.subscriptions.advance();
                match self.plan_ranges(&mut state, &mut notices) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        state.started = false;
                        let _ = state.listeners.remove(&listener);
                        return Err(e);
                    }
                }
            }
        };

        self.report(notices);
        if let Some(plan) = plan {
            self.execute(plan);
        }
        self.drain();
        Ok(())
    }

    fn remove_listener(&self, listener: &SharedListener) -> Result<()> {
        let cancelled = {
            let mut state = self.state.lock();
            state.listeners.remove(listener)?;
            if state.listeners.is_empty() {
                Self::reset(&mut state)
            } else {
                Vec::new()
            }
        };
        drop(cancelled);
        Ok(())
    }

    fn remove_all_listeners(&self) {
        let cancelled = {
            let mut state = self.state.lock();
            state.listeners.clear();
            Self::reset(&mut state)
        };
        drop(cancelled);
    }

    /// Close every range and forget all tracked keys. The returned handles are
    /// dropped (cancelled) by the caller after releasing the lock.
    fn reset(state: &mut QueryState) -> Vec<crate::store::RangeSubscription> {
        state.started = false;
        state.tracker.clear();
        state.subscriptions.advance();
        state.subscriptions.close_all()
    }

    /// Decompose the current circle, diff the open ranges and re-evaluate the
    /// tracked keys. Must be called with the lock held.
    fn plan_ranges(
        &self,
        state: &mut QueryState,
        notices: &mut Vec<Notice>,
    ) -> Result<SubscriptionPlan> {
        let circle = state.circle;
        let ranges = self
            .context
            .decomposer
            .decompose(&circle.center, circle.radius)?;
        let plan = state.subscriptions.apply(ranges);

        let mut events = Vec::new();
        state
            .tracker
            .recenter(&circle, state.subscriptions.ranges(), &mut events);

        let generation = state.subscriptions.generation();
        notices.push(Notice::RangesChanged {
            generation,
            opened: plan.open.len(),
            closed: plan.closed,
        });
        if state.subscriptions.take_ready() {
            events.push(QueryEvent::Ready);
            notices.push(Notice::Ready(generation));
        }

        self.enqueue_to(state.listeners.snapshot(), events);
        Ok(plan)
    }

    /// Cancel closed ranges and subscribe to the new ones.
    fn execute(self: &Arc<Self>, plan: SubscriptionPlan) {
        if plan.is_empty() {
            return;
        }
        let SubscriptionPlan {
            tag, open, close, ..
        } = plan;
        drop(close);

        for range in open {
            let sink = self.sink(range.clone(), tag);
            let handle =
                self.context
                    .store
                    .subscribe(self.context.format.hash_field(), &range, sink);
            let leftover = self.state.lock().subscriptions.attach(&range, tag, handle);
            if let Some(leftover) = leftover {
                leftover.cancel();
            }
        }
    }

    fn sink(self: &Arc<Self>, range: CanonicalRange, tag: u64) -> RangeSink {
        let query: Weak<QueryShared> = Arc::downgrade(self);
        Arc::new(move |event: RangeEvent| {
            if let Some(query) = query.upgrade() {
                query.on_range_event(&range, tag, event);
            }
        })
    }

    fn on_range_event(&self, range: &CanonicalRange, tag: u64, event: RangeEvent) {
        let mut notices = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.subscriptions.accepts(range, tag) {
                notices.push(Notice::Stale(range.clone(), tag));
            } else {
                let mut events = Vec::new();
                match event {
                    RangeEvent::Changes(changes) => {
                        for change in changes {
                            self.apply_change(&mut state, range, change, &mut events, &mut notices);
                        }
                    }
                    RangeEvent::SnapshotComplete => {
                        state.subscriptions.mark_ready(range);
                    }
                    RangeEvent::Failed(reason) => {
                        if state.subscriptions.mark_failed(range) {
                            events.push(QueryEvent::Error(GeoQueryError::SubscriptionFailure {
                                start: range.start().to_string(),
                                end: range.end().to_string(),
                                reason: reason.clone(),
                            }));
                            notices.push(Notice::Failed(range.clone(), reason));
                        }
                    }
                }

                if state.started && state.subscriptions.take_ready() {
                    events.push(QueryEvent::Ready);
                    notices.push(Notice::Ready(state.subscriptions.generation()));
                }
                self.enqueue_to(state.listeners.snapshot(), events);
            }
        }

        self.report(notices);
        self.drain();
    }

    fn apply_change(
        &self,
        state: &mut QueryState,
        range: &CanonicalRange,
        change: DocumentChange,
        events: &mut Vec<QueryEvent>,
        notices: &mut Vec<Notice>,
    ) {
        let DocumentChange {
            kind,
            key,
            document,
        } = change;

        match kind {
            ChangeKind::Added | ChangeKind::Modified => {
                match self.context.format.parse(&key, &document) {
                    Ok(record) => {
                        let circle = state.circle;
                        state
                            .tracker
                            .upsert(&key, record, document, &circle, events);
                    }
                    Err(e) => notices.push(Notice::Malformed(e)),
                }
            }
            ChangeKind::Removed => {
                // Moved into another live range. Re-check membership right away
                // unless that range already reported the new location.
                if let Some(hash) = self.context.format.hash_of(&document)
                    && !range.contains(hash)
                    && state.subscriptions.covered_elsewhere(hash, range)
                {
                    if let Ok(record) = self.context.format.parse(&key, &document)
                        && state
                            .tracker
                            .get(&key)
                            .is_some_and(|entry| entry.point != record.point)
                    {
                        let circle = state.circle;
                        state
                            .tracker
                            .upsert(&key, record, document, &circle, events);
                    }
                    return;
                }
                // Already updated through another range.
                if let Some(entry) = state.tracker.get(&key)
                    && !range.contains(entry.hash.as_str())
                {
                    return;
                }
                state.tracker.remove(&key, events);
            }
        }
    }

    /// Queue `events` for `listeners`. Called with the state lock held so that
    /// queue order matches computation order.
    fn enqueue_to(&self, listeners: Vec<SharedListener>, events: Vec<QueryEvent>) {
        if listeners.is_empty() || events.is_empty() {
            return;
        }
        let mut outbox = self.outbox.lock();
        outbox
            .pending
            .extend(events.into_iter().map(|event| Delivery {
                listeners: listeners.clone(),
                event,
            }));
    }

    /// Hand queued deliveries to the dispatcher. One drainer at a time.
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

            let Delivery { listeners, event } = delivery;
            self.context.dispatcher.dispatch(Box::new(move || {
                for listener in &listeners {
                    listener.on_event(&event);
                }
            }));
        }
    }

    fn report(&self, notices: Vec<Notice>) {
        let observer = &self.context.observer;
        for notice in notices {
            match notice {
                Notice::Malformed(error) => observer.malformed_record(&error),
                Notice::Failed(range, reason) => observer.subscription_failed(&range, &reason),
                Notice::Stale(range, tag) => observer.stale_event(&range, tag),
                Notice::RangesChanged {
                    generation,
                    opened,
                    closed,
                } => observer.ranges_changed(generation, opened, closed),
                Notice::Ready(generation) => observer.ready(generation),
            }
        }
    }
}
