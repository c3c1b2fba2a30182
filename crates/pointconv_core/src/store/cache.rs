//! Second-level cache shared by every session of one store factory.
//!
//! # Invariants
//! - Entries hold the datastore form of each field as last committed, so a
//!   hit yields exactly what a cold read of the row would decode.
//! - A disabled cache never returns a hit.

use crate::model::rect::{RectId, RectVariant};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Committed column values of one rect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CachedRect {
    pub upper_left: Option<String>,
    pub lower_right: Option<String>,
}

#[derive(Debug)]
pub(crate) struct LevelTwoCache {
    enabled: bool,
    entries: Mutex<HashMap<(RectVariant, RectId), CachedRect>>,
}

impl LevelTwoCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, variant: RectVariant, id: RectId) -> Option<CachedRect> {
        if !self.enabled {
            return None;
        }
        self.entries.lock().get(&(variant, id)).cloned()
    }

    pub fn put(&self, variant: RectVariant, id: RectId, entry: CachedRect) {
        if self.enabled {
            self.entries.lock().insert((variant, id), entry);
        }
    }

    pub fn remove(&self, variant: RectVariant, id: RectId) {
        self.entries.lock().remove(&(variant, id));
    }

    /// Drops every entry of `variant`; returns how many were dropped.
    pub fn evict_all(&self, variant: RectVariant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_variant, _), _| *entry_variant != variant);
        let evicted = before - entries.len();
        debug!(
            "event=cache_evict module=store variant={} evicted={evicted}",
            variant.as_str()
        );
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
