//! Conversion call accounting.
//!
//! # Responsibility
//! - Count converter invocations per direction.
//! - Expose consistent per-direction snapshots and deltas.
//!
//! # Invariants
//! - Counts only grow, except through an explicit `reset()`.
//! - Increments are atomic; concurrent callers never lose updates.
//! - Neither the store nor the converters ever reset a counter.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static GLOBAL_COUNTER: Lazy<Arc<ConversionCounter>> =
    Lazy::new(|| Arc::new(ConversionCounter::new()));

/// Thread-safe invocation counter shared by converters and the harness.
#[derive(Debug, Default)]
pub struct ConversionCounter {
    to_datastore: AtomicU64,
    to_attribute: AtomicU64,
}

impl ConversionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide counter instance.
    pub fn global() -> Arc<ConversionCounter> {
        Arc::clone(&GLOBAL_COUNTER)
    }

    /// Records one attribute-to-datastore (encode) call.
    pub fn record_to_datastore(&self) {
        self.to_datastore.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one datastore-to-attribute (decode) call.
    pub fn record_to_attribute(&self) {
        self.to_attribute.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_datastore_calls(&self) -> u64 {
        self.to_datastore.load(Ordering::SeqCst)
    }

    pub fn to_attribute_calls(&self) -> u64 {
        self.to_attribute.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            to_datastore: self.to_datastore_calls(),
            to_attribute: self.to_attribute_calls(),
        }
    }

    /// Sets both counts back to zero. Only test setup should call this.
    pub fn reset(&self) {
        self.to_datastore.store(0, Ordering::SeqCst);
        self.to_attribute.store(0, Ordering::SeqCst);
    }
}

/// Counter values read at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub to_datastore: u64,
    pub to_attribute: u64,
}

impl CounterSnapshot {
    /// Returns the calls issued between `earlier` and `self`.
    ///
    /// Saturates at zero if a reset happened in between.
    pub fn delta_since(&self, earlier: &CounterSnapshot) -> CounterDelta {
        CounterDelta {
            to_datastore: self.to_datastore.saturating_sub(earlier.to_datastore),
            to_attribute: self.to_attribute.saturating_sub(earlier.to_attribute),
        }
    }
}

/// Calls observed across one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub to_datastore: u64,
    pub to_attribute: u64,
}

#[cfg(test)]
mod tests {
    use super::{ConversionCounter, CounterSnapshot};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counts_each_direction_independently() {
        let counter = ConversionCounter::new();
        counter.record_to_datastore();
        counter.record_to_datastore();
        counter.record_to_attribute();

        assert_eq!(counter.to_datastore_calls(), 2);
        assert_eq!(counter.to_attribute_calls(), 1);
    }

    #[test]
    fn reset_clears_both_directions() {
        let counter = ConversionCounter::new();
        counter.record_to_datastore();
        counter.record_to_attribute();
        counter.reset();

        assert_eq!(counter.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn delta_saturates_after_reset() {
        let before = CounterSnapshot {
            to_datastore: 5,
            to_attribute: 3,
        };
        let after = CounterSnapshot {
            to_datastore: 1,
            to_attribute: 4,
        };
        let delta = after.delta_since(&before);
        assert_eq!(delta.to_datastore, 0);
        assert_eq!(delta.to_attribute, 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counter = Arc::new(ConversionCounter::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        counter.record_to_datastore();
                        counter.record_to_attribute();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread should finish");
        }

        assert_eq!(counter.to_datastore_calls(), 8_000);
        assert_eq!(counter.to_attribute_calls(), 8_000);
    }

    #[test]
    fn global_counter_is_shared() {
        let first = ConversionCounter::global();
        let second = ConversionCounter::global();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
