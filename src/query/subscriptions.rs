//! Open range bookkeeping: diffing, tags and readiness.

use crate::compute::ranges::{CanonicalRange, RangeSet};
use crate::store::RangeSubscription;
use std::collections::BTreeMap;

/// Lifecycle of one open range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    /// Subscribed, initial snapshot not delivered yet.
    Pending,
    /// Initial snapshot delivered; live.
    Ready,
    /// The subscription failed; the range never becomes ready.
    Failed,
}

#[derive(Debug)]
struct OpenRange {
    tag: u64,
    status: RangeStatus,
    handle: Option<RangeSubscription>,
}

/// Store interaction decided under the query lock and carried out after it is
/// released.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionPlan {
    pub tag: u64,
    pub open: Vec<CanonicalRange>,
    pub close: Vec<RangeSubscription>,
    pub closed: usize,
}

impl SubscriptionPlan {
    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.closed == 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionManager {
    generation: u64,
    ranges: RangeSet,
    open: BTreeMap<CanonicalRange, OpenRange>,
    ready_fired: Option<u64>,
}

impl SubscriptionManager {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new generation.
    pub fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn ranges(&self) -> &RangeSet {
        &self.ranges
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Replace the open set with `ranges`. Ranges present in both keep their tag,
    /// status and subscription; new ones open `Pending` under the current
    /// generation.
    pub fn apply(&mut self, ranges: RangeSet) -> SubscriptionPlan {
        let tag = self.generation;
        let mut plan = SubscriptionPlan {
            tag,
            ..SubscriptionPlan::default()
        };

        let stale: Vec<CanonicalRange> = self
            .open
            .keys()
            .filter(|range| !ranges.contains_range(range))
            .cloned()
            .collect();
        for range in stale {
            if let Some(entry) = self.open.remove(&range) {
                plan.closed += 1;
                plan.close.extend(entry.handle);
            }
        }

        for range in ranges.iter() {
            if !self.open.contains_key(range) {
                self.open.insert(
                    range.clone(),
                    OpenRange {
                        tag,
                        status: RangeStatus::Pending,
                        handle: None,
                    },
                );
                plan.open.push(range.clone());
            }
        }

        self.ranges = ranges;
        plan
    }

    /// Close everything. Returns the handles to cancel.
    pub fn close_all(&mut self) -> Vec<RangeSubscription> {
        self.ranges = RangeSet::empty();
        std::mem::take(&mut self.open)
            .into_values()
            .filter_map(|entry| entry.handle)
            .collect()
    }

    /// Whether events tagged `tag` for `range` belong to the live entry.
    pub fn accepts(&self, range: &CanonicalRange, tag: u64) -> bool {
        self.open.get(range).is_some_and(|entry| entry.tag == tag)
    }

    pub fn status(&self, range: &CanonicalRange) -> Option<RangeStatus> {
        self.open.get(range).map(|entry| entry.status)
    }

    /// Store the subscription handle for a range opened under `tag`. Hands the
    /// handle back when that range has been closed in the meantime.
    pub fn attach(
        &mut self,
        range: &CanonicalRange,
        tag: u64,
        handle: RangeSubscription,
    ) -> Option<RangeSubscription> {
        match self.open.get_mut(range) {
            Some(entry) if entry.tag == tag => {
                entry.handle = Some(handle);
                None
            }
            _ => Some(handle),
        }
    }

    /// Pending to Ready. Returns whether the status changed.
    pub fn mark_ready(&mut self, range: &CanonicalRange) -> bool {
        match self.open.get_mut(range) {
            Some(entry) if entry.status == RangeStatus::Pending => {
                entry.status = RangeStatus::Ready;
                true
            }
            _ => false,
        }
    }

    /// Mark a range failed. Returns `true` only for the first failure.
    pub fn mark_failed(&mut self, range: &CanonicalRange) -> bool {
        match self.open.get_mut(range) {
            Some(entry) if entry.status != RangeStatus::Failed => {
                entry.status = RangeStatus::Failed;
                true
            }
            _ => false,
        }
    }

    /// Every open range has delivered its initial snapshot.
    pub fn all_ready(&self) -> bool {
        self.open
            .values()
            .all(|entry| entry.status == RangeStatus::Ready)
    }

    /// Returns `true` exactly once per generation, the first time all open ranges
    /// are ready.
    pub fn take_ready(&mut self) -> bool {
        if self.ready_fired == Some(self.generation) || !self.all_ready() {
            return false;
        }
        self.ready_fired = Some(self.generation);
        true
    }

    /// Whether `key` lies in an open range other than `except` that can still
    /// deliver it. Failed ranges never do.
    pub fn covered_elsewhere(&self, key: &str, except: &CanonicalRange) -> bool {
        self.open.iter().any(|(range, entry)| {
            range != except && entry.status != RangeStatus::Failed && range.contains(key)
        })
    }
}
