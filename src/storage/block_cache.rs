use crate::core::{Block, ProofOfWork};
use std::collections::VecDeque;
use std::sync::Mutex;

struct CacheInner {
    queue: VecDeque<Block>,
    // hash every admissible block must extend; fed from commit results
    expected_prev: String,
}

/// Bounded FIFO of network-received blocks awaiting full validation.
///
/// Admission is cheap and local: chain continuity against the cursor, a
/// proof-of-work check, and duplicate suppression. Economic and signature
/// validation always happens later, in the chain validator.
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl BlockCache {
    pub fn new(capacity: usize, expected_prev: &str) -> BlockCache {
        BlockCache {
            inner: Mutex::new(CacheInner {
                queue: VecDeque::with_capacity(capacity),
                expected_prev: expected_prev.to_string(),
            }),
            capacity,
        }
    }

    /// Admit a block. Returns false when the block does not extend the
    /// cursor, fails proof-of-work, or is already queued. When the queue
    /// is full the oldest entry is evicted first.
    pub fn add_block(&self, block: &Block) -> bool {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on block cache - this should never happen");

        if block.get_pre_block_hash() != inner.expected_prev {
            log::debug!(
                "Rejecting block {}: expected previous hash {}, got {}",
                block.get_hash(),
                inner.expected_prev,
                block.get_pre_block_hash()
            );
            return false;
        }

        if !ProofOfWork::validate(block) {
            log::warn!("Rejecting block {}: proof-of-work invalid", block.get_hash());
            return false;
        }

        if inner
            .queue
            .iter()
            .any(|queued| queued.get_hash() == block.get_hash())
        {
            return false;
        }

        if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
        }
        inner.queue.push_back(block.clone());
        true
    }

    /// Dequeue the oldest admitted block.
    pub fn pop_block(&self) -> Option<Block> {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on block cache - this should never happen");
        inner.queue.pop_front()
    }

    /// Advance the cursor to the new tip. Queued blocks were admitted
    /// against the old cursor, so a real change invalidates them all.
    pub fn set_cursor(&self, expected_prev: &str) {
        let mut inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on block cache - this should never happen");
        if inner.expected_prev != expected_prev {
            inner.expected_prev = expected_prev.to_string();
            inner.queue.clear();
        }
    }

    pub fn len(&self) -> usize {
        let inner = self
            .inner
            .lock()
            .expect("Failed to acquire lock on block cache - this should never happen");
        inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
