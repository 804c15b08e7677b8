//! Recently confirmed elections.
//!
//! A bounded FIFO of `(qualified root, winner)` pairs. Blocks in here do not
//! get a new election when late votes or republished copies arrive, and votes
//! for them are classified as replays. When full, the oldest entry is evicted.

use std::collections::{HashMap, VecDeque};

use orv_types::{BlockHash, QualifiedRoot};
use parking_lot::Mutex;

#[derive(Default)]
struct Inner {
    by_root: HashMap<QualifiedRoot, BlockHash>,
    by_hash: HashMap<BlockHash, QualifiedRoot>,
    order: VecDeque<(QualifiedRoot, BlockHash)>,
}

pub struct RecentlyConfirmed {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl RecentlyConfirmed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Insert a confirmed pair. Returns `false` if the root or hash is
    /// already present.
    pub fn put(&self, root: QualifiedRoot, hash: BlockHash) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.by_root.contains_key(&root) || inner.by_hash.contains_key(&hash) {
            return false;
        }
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some((old_root, old_hash)) => {
                    inner.by_root.remove(&old_root);
                    inner.by_hash.remove(&old_hash);
                }
                None => break,
            }
        }
        inner.by_root.insert(root, hash);
        inner.by_hash.insert(hash, root);
        inner.order.push_back((root, hash));
        true
    }

    pub fn root_exists(&self, root: &QualifiedRoot) -> bool {
        self.inner.lock().by_root.contains_key(root)
    }

    pub fn hash_exists(&self, hash: &BlockHash) -> bool {
        self.inner.lock().by_hash.contains_key(hash)
    }

    pub fn erase(&self, hash: &BlockHash) {
        let mut inner = self.inner.lock();
        if let Some(root) = inner.by_hash.remove(hash) {
            inner.by_root.remove(&root);
            inner.order.retain(|(_, h)| h != hash);
        }
    }

    /// The most recent entry.
    pub fn back(&self) -> Option<(QualifiedRoot, BlockHash)> {
        self.inner.lock().order.back().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_root.clear();
        inner.by_hash.clear();
        inner.order.clear();
    }
}
