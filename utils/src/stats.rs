//! Counters shared by every consensus component.
//!
//! Counters are addressed by a `(component, detail)` pair of static strings,
//! e.g. `("vote_processor", "overflow")`, and created on first use. Reads and
//! increments of existing counters only take the read lock.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Key = (&'static str, &'static str);

/// A thread-safe table of monotonically increasing counters.
#[derive(Default)]
pub struct Stats {
    counters: RwLock<BTreeMap<Key, AtomicU64>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, component: &'static str, detail: &'static str) {
        self.add(component, detail, 1);
    }

    pub fn add(&self, component: &'static str, detail: &'static str, value: u64) {
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(&(component, detail)) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        self.counters
            .write()
            .entry((component, detail))
            .or_default()
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn count(&self, component: &'static str, detail: &'static str) -> u64 {
        self.counters
            .read()
            .get(&(component, detail))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum of every detail recorded under `component`.
    pub fn component_total(&self, component: &'static str) -> u64 {
        self.counters
            .read()
            .iter()
            .filter(|((c, _), _)| *c == component)
            .map(|(_, v)| v.load(Ordering::Relaxed))
            .sum()
    }

    /// Ordered copy of all counters.
    pub fn snapshot(&self) -> Vec<(&'static str, &'static str, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(&(c, d), v)| (c, d, v.load(Ordering::Relaxed)))
            .collect()
    }
}
