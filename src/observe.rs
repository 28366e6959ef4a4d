//! Diagnostics hooks for the query engine.

use crate::compute::ranges::CanonicalRange;
use crate::error::GeoQueryError;

/// Receives engine diagnostics that are not delivered to listeners.
///
/// Every method has an empty default, so implementors only override what they
/// care about.
pub trait QueryObserver: Send + Sync {
    /// A document in a subscribed range could not be parsed and was skipped.
    fn malformed_record(&self, _error: &GeoQueryError) {}

    /// A range subscription failed.
    fn subscription_failed(&self, _range: &CanonicalRange, _reason: &str) {}

    /// An event arrived for a range that is no longer open under the tag it was
    /// opened with, and was dropped.
    fn stale_event(&self, _range: &CanonicalRange, _tag: u64) {}

    /// A new generation replaced the open range set.
    fn ranges_changed(&self, _generation: u64, _opened: usize, _closed: usize) {}

    /// Every open range of `generation` finished its initial snapshot.
    fn ready(&self, _generation: u64) {}
}

/// Writes diagnostics through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl QueryObserver for LogObserver {
    fn malformed_record(&self, error: &GeoQueryError) {
        log::warn!("Skipping record: {}", error);
    }

    fn subscription_failed(&self, range: &CanonicalRange, reason: &str) {
        log::warn!("Subscription to {} failed: {}", range, reason);
    }

    fn stale_event(&self, range: &CanonicalRange, tag: u64) {
        log::trace!("Dropping stale event for {} (tag {})", range, tag);
    }

    fn ranges_changed(&self, generation: u64, opened: usize, closed: usize) {
        log::debug!(
            "Generation {}: opened {} ranges, closed {}",
            generation,
            opened,
            closed
        );
    }

    fn ready(&self, generation: u64) {
        log::debug!("Generation {} ready", generation);
    }
}
