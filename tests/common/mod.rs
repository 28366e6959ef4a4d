#![allow(dead_code)]

use geoquery::{GeoQueryEventListener, QueryEvent, SharedListener};
use parking_lot::Mutex;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Listener that records every event it receives.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<QueryEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Events as short labels such as `"entered:bus"` or `"ready"`.
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(label).collect()
    }

    pub fn count(&self, wanted: &str) -> usize {
        self.labels().iter().filter(|l| l.as_str() == wanted).count()
    }
}

impl GeoQueryEventListener for Recorder {
    fn on_event(&self, event: &QueryEvent) {
        self.events.lock().push(event.clone());
    }
}

pub fn shared(recorder: &Arc<Recorder>) -> SharedListener {
    recorder.clone()
}

pub fn label(event: &QueryEvent) -> String {
    match event {
        QueryEvent::Entered { key, .. } => format!("entered:{key}"),
        QueryEvent::Exited { key, .. } => format!("exited:{key}"),
        QueryEvent::Moved { key, .. } => format!("moved:{key}"),
        QueryEvent::Changed { key, .. } => format!("changed:{key}"),
        QueryEvent::Ready => "ready".to_string(),
        QueryEvent::Error(_) => "error".to_string(),
    }
}
