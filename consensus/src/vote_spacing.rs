//! Vote spacing: the local node signs at most one vote per root inside the
//! spacing interval.
//!
//! A second request for the same hash inside the interval must reuse the vote
//! already signed. A request for a *different* hash is refused until `delay`
//! has passed since the last vote on that root.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use orv_types::{BlockHash, Root};

#[derive(Clone, Copy, Debug)]
struct Entry {
    time: Instant,
    hash: BlockHash,
}

/// Where a candidate stands relative to the last vote on its root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Spacing {
    /// No vote on the root inside the interval.
    Free,
    /// Already voted for this hash inside the interval.
    Repeat,
    /// Voted for another hash inside the interval.
    Blocked,
}

pub struct VoteSpacing {
    delay: Duration,
    recent: HashMap<Root, Entry>,
}

impl VoteSpacing {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            recent: HashMap::new(),
        }
    }

    pub fn check(&self, root: &Root, hash: &BlockHash, now: Instant) -> Spacing {
        match self.recent.get(root) {
            Some(entry) if now.saturating_duration_since(entry.time) < self.delay => {
                if entry.hash == *hash {
                    Spacing::Repeat
                } else {
                    Spacing::Blocked
                }
            }
            _ => Spacing::Free,
        }
    }

    /// Whether a new vote for `hash` on `root` may be signed at `now`.
    pub fn votable(&self, root: &Root, hash: &BlockHash, now: Instant) -> bool {
        self.check(root, hash, now) == Spacing::Free
    }

    /// Record a vote for `hash` on `root` emitted at `now`.
    pub fn flag(&mut self, root: Root, hash: BlockHash, now: Instant) {
        self.trim(now);
        self.recent.insert(root, Entry { time: now, hash });
    }

    /// Forget entries older than the spacing interval.
    pub fn trim(&mut self, now: Instant) {
        let delay = self.delay;
        self.recent
            .retain(|_, entry| now.saturating_duration_since(entry.time) < delay);
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}
