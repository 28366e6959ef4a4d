//! Per-key location tracking and membership transitions.

use super::events::QueryEvent;
use crate::compute::distance::distance;
use crate::compute::geohash::HashKey;
use crate::compute::ranges::RangeSet;
use crate::store::Document;
use crate::store::record::LocationRecord;
use geoquery_types::GeoPoint;
use rustc_hash::FxHashMap;

/// Last known state of one key seen through an open range.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    pub point: GeoPoint,
    pub hash: HashKey,
    pub in_query: bool,
    pub document: Document,
}

/// The circle membership is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: GeoPoint,
    pub radius: f64,
}

impl Circle {
    #[inline]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        distance(point, &self.center) <= self.radius
    }
}

#[derive(Debug, Default)]
pub(crate) struct LocationTracker {
    entries: FxHashMap<String, TrackedEntry>,
}

impl LocationTracker {
    pub fn get(&self, key: &str) -> Option<&TrackedEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record a new location for `key` and push the resulting transition.
    pub fn upsert(
        &mut self,
        key: &str,
        record: LocationRecord,
        document: Document,
        circle: &Circle,
        events: &mut Vec<QueryEvent>,
    ) {
        let previous = self.entries.get(key);
        let is_new = previous.is_none();
        let was_in = previous.is_some_and(|entry| entry.in_query);
        let moved = previous.is_some_and(|entry| entry.point != record.point);
        let is_in = circle.contains(&record.point);

        transition(key, &record.point, &document, is_new, was_in, moved, is_in, events);

        self.entries.insert(
            key.to_string(),
            TrackedEntry {
                point: record.point,
                hash: record.hash,
                in_query: is_in,
                document,
            },
        );
    }

    /// Forget `key`, pushing `Exited` if it was tracked.
    pub fn remove(&mut self, key: &str, events: &mut Vec<QueryEvent>) -> Option<TrackedEntry> {
        let entry = self.entries.remove(key)?;
        events.push(QueryEvent::Exited {
            key: key.to_string(),
            document: entry.document.clone(),
        });
        Some(entry)
    }

    /// Re-evaluate every entry against a new circle, then drop the entries whose
    /// hash no longer lies in `ranges`.
    pub fn recenter(&mut self, circle: &Circle, ranges: &RangeSet, events: &mut Vec<QueryEvent>) {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();

        let mut updates = Vec::with_capacity(keys.len());
        for key in keys {
            let entry = &self.entries[key];
            let is_in = circle.contains(&entry.point);
            transition(
                key,
                &entry.point,
                &entry.document,
                false,
                entry.in_query,
                false,
                is_in,
                events,
            );
            updates.push((key.clone(), is_in));
        }

        for (key, is_in) in updates {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.in_query = is_in;
            }
        }

        self.entries
            .retain(|_, entry| ranges.covers(entry.hash.as_str()));
    }

    /// `Entered` events for every member, in key order.
    pub fn members(&self) -> Vec<QueryEvent> {
        let mut members: Vec<(&String, &TrackedEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.in_query)
            .collect();
        members.sort_by(|a, b| a.0.cmp(b.0));

        members
            .into_iter()
            .map(|(key, entry)| QueryEvent::Entered {
                key: key.clone(),
                point: entry.point,
                document: entry.document.clone(),
            })
            .collect()
    }

    pub fn member_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.in_query).count()
    }
}

#[allow(clippy::too_many_arguments)]
fn transition(
    key: &str,
    point: &GeoPoint,
    document: &Document,
    is_new: bool,
    was_in: bool,
    moved: bool,
    is_in: bool,
    events: &mut Vec<QueryEvent>,
) {
    if (is_new || !was_in) && is_in {
        events.push(QueryEvent::Entered {
            key: key.to_string(),
            point: *point,
            document: document.clone(),
        });
    } else if !is_new && is_in {
        if moved {
            events.push(QueryEvent::Moved {
                key: key.to_string(),
                point: *point,
                document: document.clone(),
            });
        }
        events.push(QueryEvent::Changed {
            key: key.to_string(),
            point: *point,
            document: document.clone(),
        });
    } else if was_in && !is_in {
        events.push(QueryEvent::Exited {
            key: key.to_string(),
            document: document.clone(),
        });
    }
}
