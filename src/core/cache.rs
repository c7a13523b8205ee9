//! LRU cache of decoded nodes
//!
//! Upper tree levels are touched by every lookup, so keeping them decoded
//! avoids repeated reads and decompression. The cache is bounded both by
//! node count and by the summed encoded size of the nodes it holds, and one
//! cache can serve several containers: entries are keyed by the owner's
//! [`CacheId`] together with the node pointer.

use crate::codec::{Node, NodePtr};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Distinguishes containers sharing one cache
pub type CacheId = u32;

type CacheKey = (CacheId, NodePtr);

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Slots {
    lru: LruCache<CacheKey, (Arc<Node>, usize)>,
    bytes: usize,
}

impl Slots {
    fn release(&mut self, weight: usize) {
        self.bytes = self.bytes.saturating_sub(weight);
    }
}

/// Thread-safe node cache keyed by owner id and node pointer
pub struct NodeCache {
    slots: Mutex<Slots>,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeCache {
    /// Create a cache holding up to `max_nodes` nodes and `max_bytes` bytes
    /// of decoded node data; `None` when either bound is 0
    pub fn new(max_nodes: usize, max_bytes: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(max_nodes)?;
        if max_bytes == 0 {
            return None;
        }
        Some(NodeCache {
            slots: Mutex::new(Slots {
                lru: LruCache::new(capacity),
                bytes: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Same as [`NodeCache::new`], wrapped for sharing between readers
    pub fn shared(max_nodes: usize, max_bytes: usize) -> Option<Arc<Self>> {
        Self::new(max_nodes, max_bytes).map(Arc::new)
    }

    pub fn get(&self, id: CacheId, ptr: &NodePtr) -> Option<Arc<Node>> {
        let found = self
            .slots
            .lock()
            .lru
            .get(&(id, *ptr))
            .map(|(node, _)| Arc::clone(node));
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert a node, evicting least recently used entries until both bounds
    /// hold; a node larger than the byte bound is not kept
    pub fn put(&self, id: CacheId, ptr: NodePtr, node: Arc<Node>) {
        let weight = node.encoded_len();
        if weight > self.max_bytes {
            return;
        }

        let mut slots = self.slots.lock();
        if let Some((_, (_, old))) = slots.lru.push((id, ptr), (node, weight)) {
            slots.release(old);
        }
        slots.bytes += weight;

        while slots.bytes > self.max_bytes {
            match slots.lru.pop_lru() {
                Some((_, (_, old))) => slots.release(old),
                None => break,
            }
        }
    }

    /// Drop every entry owned by `id`
    pub fn evict(&self, id: CacheId) {
        let mut slots = self.slots.lock();
        let owned: Vec<CacheKey> = slots
            .lru
            .iter()
            .filter(|((owner, _), _)| *owner == id)
            .map(|(key, _)| *key)
            .collect();
        for key in owned {
            if let Some((_, old)) = slots.lru.pop(&key) {
                slots.release(old);
            }
        }
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.lru.clear();
        slots.bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().lru.is_empty()
    }

    /// Summed encoded size of the cached nodes
    pub fn bytes(&self) -> usize {
        self.slots.lock().bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
