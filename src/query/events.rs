//! Query events and the listener registry.

use crate::error::{GeoQueryError, Result};
use crate::store::Document;
use geoquery_types::GeoPoint;
use std::sync::Arc;

/// A spatial event delivered to query listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// The key's location is now inside the circle.
    Entered {
        key: String,
        point: GeoPoint,
        document: Document,
    },
    /// The key left the circle or was removed. Carries the last known document.
    Exited { key: String, document: Document },
    /// The key moved while staying inside the circle.
    Moved {
        key: String,
        point: GeoPoint,
        document: Document,
    },
    /// The document of a key inside the circle was rewritten.
    Changed {
        key: String,
        point: GeoPoint,
        document: Document,
    },
    /// Every range of the current generation delivered its initial snapshot.
    Ready,
    /// A range subscription failed.
    Error(GeoQueryError),
}

impl QueryEvent {
    /// The key the event is about, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            QueryEvent::Entered { key, .. }
            | QueryEvent::Exited { key, .. }
            | QueryEvent::Moved { key, .. }
            | QueryEvent::Changed { key, .. } => Some(key),
            QueryEvent::Ready | QueryEvent::Error(_) => None,
        }
    }
}

/// Callbacks for live query events.
///
/// Override the `on_*` methods of interest, or [`on_event`](Self::on_event) to
/// receive every event through a single entry point.
pub trait GeoQueryEventListener: Send + Sync {
    fn on_entered(&self, _key: &str, _point: &GeoPoint, _document: &Document) {}

    fn on_exited(&self, _key: &str, _document: &Document) {}

    fn on_moved(&self, _key: &str, _point: &GeoPoint, _document: &Document) {}

    fn on_changed(&self, _key: &str, _point: &GeoPoint, _document: &Document) {}

    fn on_ready(&self) {}

    fn on_error(&self, _error: &GeoQueryError) {}

    fn on_event(&self, event: &QueryEvent) {
        match event {
            QueryEvent::Entered {
                key,
                point,
                document,
            } => self.on_entered(key, point, document),
            QueryEvent::Exited { key, document } => self.on_exited(key, document),
            QueryEvent::Moved {
                key,
                point,
                document,
            } => self.on_moved(key, point, document),
            QueryEvent::Changed {
                key,
                point,
                document,
            } => self.on_changed(key, point, document),
            QueryEvent::Ready => self.on_ready(),
            QueryEvent::Error(error) => self.on_error(error),
        }
    }
}

/// Adapts a closure into a listener.
///
/// ```rust
/// use geoquery::{EventFn, QueryEvent};
///
/// let listener = EventFn::new(|event: &QueryEvent| {
///     if let Some(key) = event.key() {
///         println!("{key}: {event:?}");
///     }
/// });
/// # let _ = listener;
/// ```
pub struct EventFn<F>(F);

impl<F> EventFn<F>
where
    F: Fn(&QueryEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> GeoQueryEventListener for EventFn<F>
where
    F: Fn(&QueryEvent) + Send + Sync,
{
    fn on_event(&self, event: &QueryEvent) {
        (self.0)(event)
    }
}

pub type SharedListener = Arc<dyn GeoQueryEventListener>;

/// Registered listeners in registration order. Identity is the `Arc` allocation.
#[derive(Default, Clone)]
pub(crate) struct ListenerRegistry {
    listeners: Vec<SharedListener>,
}

impl ListenerRegistry {
    fn position(&self, listener: &SharedListener) -> Option<usize> {
        self.listeners
            .iter()
            .position(|registered| same_listener(registered, listener))
    }

    pub fn add(&mut self, listener: SharedListener) -> Result<()> {
        if self.position(&listener).is_some() {
            return Err(GeoQueryError::DuplicateListener);
        }
        self.listeners.push(listener);
        Ok(())
    }

    pub fn remove(&mut self, listener: &SharedListener) -> Result<()> {
        let index = self
            .position(listener)
            .ok_or(GeoQueryError::UnknownListener)?;
        self.listeners.remove(index);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SharedListener> {
        self.listeners.clone()
    }
}

fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
