//! Fair multi-source admission queue.
//!
//! Each origin (a source category plus an optional peer channel) owns its own
//! bounded FIFO. Items are taken round-robin across non-empty origins, with an
//! origin of priority `p` served `p` times in a row before the cursor moves on.
//! A full origin rejects new items; nothing already queued is evicted.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::time::{Duration, Instant};

use orv_types::ChannelId;

/// Identifies where a queued item came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin<S> {
    pub source: S,
    /// `None` for local sources, which are never considered dead.
    pub channel: Option<ChannelId>,
}

impl<S> Origin<S> {
    pub fn new(source: S, channel: ChannelId) -> Self {
        Self {
            source,
            channel: Some(channel),
        }
    }

    pub fn local(source: S) -> Self {
        Self {
            source,
            channel: None,
        }
    }
}

struct Entry<R> {
    requests: VecDeque<R>,
    priority: usize,
    max_size: usize,
}

type Query<S> = Box<dyn Fn(&Origin<S>) -> usize + Send + Sync>;
type AliveQuery = Box<dyn Fn(ChannelId) -> bool + Send + Sync>;

pub struct FairQueue<R, S> {
    queues: BTreeMap<Origin<S>, Entry<R>>,
    current: Option<Origin<S>>,
    counter: usize,
    total_size: usize,
    last_update: Instant,
    max_size_query: Query<S>,
    priority_query: Query<S>,
    alive_query: AliveQuery,
}

impl<R, S> FairQueue<R, S>
where
    S: Ord + Copy,
{
    pub fn new(
        max_size_query: impl Fn(&Origin<S>) -> usize + Send + Sync + 'static,
        priority_query: impl Fn(&Origin<S>) -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            queues: BTreeMap::new(),
            current: None,
            counter: 0,
            total_size: 0,
            last_update: Instant::now(),
            max_size_query: Box::new(max_size_query),
            priority_query: Box::new(priority_query),
            alive_query: Box::new(|_| true),
        }
    }

    /// Install the channel liveness check used by [`periodic_update`](Self::periodic_update).
    pub fn with_alive_query(mut self, alive: impl Fn(ChannelId) -> bool + Send + Sync + 'static) -> Self {
        self.alive_query = Box::new(alive);
        self
    }

    /// Enqueue `request` under `origin`. Returns `false` if the origin's queue
    /// is full and the request was dropped.
    pub fn push(&mut self, request: R, origin: Origin<S>) -> bool {
        let max_size_query = &self.max_size_query;
        let priority_query = &self.priority_query;
        let entry = self.queues.entry(origin).or_insert_with(|| Entry {
            requests: VecDeque::new(),
            max_size: max_size_query(&origin),
            priority: priority_query(&origin),
        });
        if entry.requests.len() >= entry.max_size {
            return false;
        }
        entry.requests.push_back(request);
        self.total_size += 1;
        true
    }

    /// Take the next request, or `None` if every queue is empty.
    pub fn next(&mut self) -> Option<(R, Origin<S>)> {
        if self.is_empty() {
            return None;
        }
        if self.should_seek() {
            self.seek_next();
        }
        let origin = self.current?;
        let request = self.queues.get_mut(&origin)?.requests.pop_front()?;
        self.counter += 1;
        self.total_size -= 1;
        Some((request, origin))
    }

    /// Take up to `max_count` requests, running the periodic cleanup first.
    pub fn next_batch(&mut self, max_count: usize) -> VecDeque<(R, Origin<S>)> {
        self.periodic_update(Duration::from_secs(30));
        let count = self.total_size.min(max_count);
        let mut result = VecDeque::with_capacity(count);
        while result.len() < count {
            match self.next() {
                Some(item) => result.push_back(item),
                None => break,
            }
        }
        result
    }

    /// Drop empty queues whose channel is dead and refresh the priority and
    /// capacity of the rest. Does nothing if less than `interval` has passed
    /// since the last update. Returns whether an update ran.
    pub fn periodic_update(&mut self, interval: Duration) -> bool {
        if self.last_update.elapsed() < interval {
            return false;
        }
        self.last_update = Instant::now();
        self.cleanup();
        self.update();
        true
    }

    pub fn len(&self) -> usize {
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Items queued under `origin`.
    pub fn size(&self, origin: &Origin<S>) -> usize {
        self.queues.get(origin).map_or(0, |e| e.requests.len())
    }

    pub fn max_size(&self, origin: &Origin<S>) -> usize {
        self.queues.get(origin).map_or(0, |e| e.max_size)
    }

    pub fn priority(&self, origin: &Origin<S>) -> usize {
        self.queues.get(origin).map_or(0, |e| e.priority)
    }

    /// Number of per-origin queues, including empty ones.
    pub fn queues_size(&self) -> usize {
        self.queues.len()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
        self.current = None;
        self.counter = 0;
        self.total_size = 0;
    }

    fn should_seek(&self) -> bool {
        match self.current.as_ref().and_then(|origin| self.queues.get(origin)) {
            None => true,
            Some(entry) => entry.requests.is_empty() || self.counter >= entry.priority,
        }
    }

    fn seek_next(&mut self) {
        self.counter = 0;
        let after = match self.current {
            Some(current) => self
                .queues
                .range((Bound::Excluded(current), Bound::Unbounded))
                .find(|(_, e)| !e.requests.is_empty())
                .map(|(origin, _)| *origin),
            None => None,
        };
        self.current = after.or_else(|| {
            self.queues
                .iter()
                .find(|(_, e)| !e.requests.is_empty())
                .map(|(origin, _)| *origin)
        });
    }

    fn cleanup(&mut self) {
        self.current = None;
        let alive = &self.alive_query;
        self.queues.retain(|origin, entry| {
            !entry.requests.is_empty() || origin.channel.map_or(true, |c| alive(c))
        });
    }

    fn update(&mut self) {
        for (origin, entry) in self.queues.iter_mut() {
            entry.max_size = (self.max_size_query)(origin);
            entry.priority = (self.priority_query)(origin);
        }
    }
}
